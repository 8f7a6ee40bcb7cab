use crate::transaction::TransactionError;
use crate::utils::ConversionError;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Validated chain account name, e.g. `alice.near` or a 64-char implicit account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
	pub const MIN_LEN: usize = 2;
	pub const MAX_LEN: usize = 64;

	/// Validate an account name against the chain's naming rules.
	///
	/// Names are lowercase alphanumeric parts joined by single `-`, `_` or `.`
	/// separators, between 2 and 64 characters long.
	pub fn parse(raw: &str) -> Result<Self, AccountSyncError> {
		let invalid = || AccountSyncError::AccountNotFound(raw.to_string());

		if raw.len() < Self::MIN_LEN || raw.len() > Self::MAX_LEN {
			return Err(invalid());
		}

		let mut last_was_separator = true;
		for c in raw.chars() {
			match c {
				'a'..='z' | '0'..='9' => last_was_separator = false,
				'-' | '_' | '.' if !last_was_separator => last_was_separator = true,
				_ => return Err(invalid()),
			}
		}
		if last_was_separator {
			return Err(invalid());
		}

		Ok(Self(raw.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for AccountId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl TryFrom<String> for AccountId {
	type Error = AccountSyncError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(&value)
	}
}

impl From<AccountId> for String {
	fn from(id: AccountId) -> Self {
		id.0
	}
}

impl AsRef<str> for AccountId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

/// The independent sources a refresh cycle reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
	ChainState,
	TokenBalance,
	AccruedYield,
}

impl fmt::Display for DataSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			DataSource::ChainState => "chain state",
			DataSource::TokenBalance => "token balance",
			DataSource::AccruedYield => "accrued yield",
		};
		f.write_str(name)
	}
}

/// Error types for account synchronization
#[derive(Debug, thiserror::Error)]
pub enum AccountSyncError {
	#[error("Account not found: {0}")]
	AccountNotFound(String),

	#[error("Source unavailable ({origin}): {reason}")]
	SourceUnavailable { origin: DataSource, reason: String },

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Conversion error: {0}")]
	Conversion(#[from] ConversionError),

	#[error("Transaction failed: {0}")]
	TransactionFailed(#[from] TransactionError),

	#[error("Refresh aborted: {0}")]
	RefreshAborted(String),
}

impl AccountSyncError {
	pub fn source_unavailable(origin: DataSource, reason: impl fmt::Display) -> Self {
		Self::SourceUnavailable {
			origin,
			reason: reason.to_string(),
		}
	}
}
