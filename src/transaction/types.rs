use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Serialize)]
pub enum TransactionError {
	#[error("Transaction validation error: {0}")]
	ValidationError(String),

	#[error("Transaction rejected by the chain: {0}")]
	Rejected(String),

	#[error("Unexpected error: {0}")]
	UnexpectedError(String),

	#[error("Insufficient balance: {0}")]
	InsufficientBalance(String),
}

/// A single action inside a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
	FunctionCall {
		method_name: String,
		args: serde_json::Value,
		gas: u64,
		deposit: u128,
	},
	Transfer {
		deposit: u128,
	},
	AddKey {
		public_key: String,
		contract_id: Option<String>,
		method_names: Vec<String>,
		allowance: Option<u128>,
	},
	DeleteKey {
		public_key: String,
	},
}

impl Action {
	/// Native balance this action may consume: attached deposit plus, for function
	/// calls, the prepaid gas counted one yocto per gas unit.
	pub fn required_balance(&self) -> u128 {
		match self {
			Action::FunctionCall { gas, deposit, .. } => (*gas as u128).saturating_add(*deposit),
			Action::Transfer { deposit } => *deposit,
			Action::AddKey { .. } | Action::DeleteKey { .. } => 0,
		}
	}
}

/// A transaction decoded from an external request, waiting to be signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
	pub receiver_id: String,
	pub actions: Vec<Action>,
}

impl PendingTransaction {
	pub fn required_balance(&self) -> u128 {
		self.actions
			.iter()
			.fold(0u128, |acc, action| acc.saturating_add(action.required_balance()))
	}
}

/// Final outcome of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
	/// Hash of the signed transaction.
	pub transaction_hash: String,
	/// Gas burnt across all receipts.
	#[serde(default)]
	pub gas_burnt: u64,
	/// Logs emitted by the receipts.
	#[serde(default)]
	pub logs: Vec<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn required_balance_sums_gas_and_deposits() {
		let tx = PendingTransaction {
			receiver_id: "app.near".to_string(),
			actions: vec![
				Action::FunctionCall {
					method_name: "buy".to_string(),
					args: serde_json::json!({}),
					gas: 30_000_000_000_000,
					deposit: 1_000,
				},
				Action::Transfer { deposit: 5 },
				Action::DeleteKey {
					public_key: "ed25519:abc".to_string(),
				},
			],
		};
		assert_eq!(tx.required_balance(), 30_000_000_001_005);
	}
}
