use async_trait::async_trait;
use near_account_sync::rpc::{ChainAccountView, ChainReader, RpcError};
use near_account_sync::utils::{CoinType, FixedPointConverter, format_fiat};
use near_account_sync::wallet::sync::EngineConfig;
use near_account_sync::{AccountSyncEngine, AccountSyncError};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const NEAR: u128 = 1_000_000_000_000_000_000_000_000;

/// Chain whose responses can be switched off per source.
struct SwitchableChain {
	account: serde_json::Value,
	token_balance: Mutex<Option<&'static str>>,
	rewards: Mutex<Option<serde_json::Value>>,
}

#[async_trait]
impl ChainReader for SwitchableChain {
	async fn view_account(&self, _account_id: &str) -> Result<ChainAccountView, RpcError> {
		Ok(serde_json::from_value(self.account.clone())?)
	}

	async fn view_function(
		&self,
		_contract_id: &str,
		method_name: &str,
		_args: serde_json::Value,
	) -> Result<serde_json::Value, RpcError> {
		let value = match method_name {
			"ft_balance_of" => self.token_balance.lock().unwrap().map(|b| json!(b)),
			"get_user" => self.rewards.lock().unwrap().clone(),
			_ => None,
		};
		value.ok_or_else(|| RpcError::RpcError("unavailable".to_string()))
	}

	async fn latest_block_hash(&self) -> Result<String, RpcError> {
		Err(RpcError::NoData)
	}
}

fn chain(amount: &str, storage_usage: u64) -> Arc<SwitchableChain> {
	Arc::new(SwitchableChain {
		// shape of a real view_account result
		account: json!({
			"amount": amount,
			"locked": "0",
			"code_hash": "11111111111111111111111111111111",
			"storage_usage": storage_usage,
			"storage_paid_at": 0,
			"block_height": 102_345_678u64,
			"block_hash": "9XgHZ2Jvx5nPwL8vQpN4nU8m6XqF2k1cYb7aZ3sT5rWd"
		}),
		token_balance: Mutex::new(Some("0")),
		rewards: Mutex::new(None),
	})
}

#[tokio::test]
async fn large_storage_reserve_leaves_nothing_spendable() {
	let chain = chain("1000000000000000000000000", 500_000);
	let engine =
		AccountSyncEngine::new("alice.near", chain, None, EngineConfig::default()).unwrap();

	let snapshot = engine.force_full_refresh().await.unwrap();
	assert_eq!(snapshot.block_height, 102_345_678);
	assert_eq!(engine.reserved_amount(), Some(5_050_000_000_000_000_000_000_000));
	assert_eq!(engine.spendable_native_amount(), Some(0));
	assert_eq!(engine.total_spendable(), Some(0));
}

#[tokio::test]
async fn token_outage_zeroes_wrapped_and_keeps_yield() {
	let chain = chain("3000000000000000000000000", 0);
	*chain.token_balance.lock().unwrap() = Some("2000000000000000000000000");
	*chain.rewards.lock().unwrap() = Some(json!({
		"apy_value": 0,
		"last_accrual_ts": 0,
		"accrued": "42000000000000000000000"
	}));
	let engine = AccountSyncEngine::new("alice.near", chain.clone(), None, EngineConfig::default())
		.unwrap();

	let before = engine.force_full_refresh().await.unwrap();
	assert_eq!(before.wrapped_token_amount, 2 * NEAR);
	assert_eq!(before.accrued_yield, 42_000_000_000_000_000_000_000);

	*chain.token_balance.lock().unwrap() = None;
	*chain.rewards.lock().unwrap() = None;
	let after = engine.force_full_refresh().await.unwrap();

	assert_eq!(after.wrapped_token_amount, 0);
	assert_eq!(after.accrued_yield, before.accrued_yield);
	assert_eq!(after.native_amount, 3 * NEAR);
}

#[tokio::test]
async fn malformed_account_name_is_fatal() {
	let chain = chain("0", 0);
	let result = AccountSyncEngine::new("-bad..name-", chain, None, EngineConfig::default());
	assert!(matches!(result, Err(AccountSyncError::AccountNotFound(_))));
}

#[test]
fn near_amounts_convert_exactly() {
	let near = FixedPointConverter::for_coin(CoinType::Near);
	assert_eq!(
		near.to_human_str("2500000000000000000000000").unwrap(),
		Decimal::from_str("2.5").unwrap()
	);
	assert_eq!(
		near.to_human_str("2500000000000000000000").unwrap(),
		Decimal::from_str("0.0025").unwrap()
	);
	assert_eq!(
		near.to_base_units(Decimal::from_str("2.5").unwrap()).unwrap(),
		2_500_000_000_000_000_000_000_000
	);
}

#[test]
fn fiat_display_uses_bankers_rounding() {
	assert_eq!(format_fiat(Decimal::from_str("1.005").unwrap()), "1.00");
	assert_eq!(format_fiat(Decimal::from_str("1.015").unwrap()), "1.02");
}
