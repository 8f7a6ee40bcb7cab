use near_account_sync::backend::HereBackendClient;
use near_account_sync::rpc::NearRpcClient;
use near_account_sync::transaction::NATIVE_TOKEN_DECIMALS;
use near_account_sync::utils::{format_fiat, format_token_amount};
use near_account_sync::{AccountSyncEngine, AppConfig, BalanceAggregationSession};

use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let Some(account_id) = std::env::args().nth(1) else {
		error!("Usage: near-account-sync <account-id> [updates]");
		return;
	};
	let updates: usize = std::env::args()
		.nth(2)
		.and_then(|n| n.parse().ok())
		.unwrap_or(1);

	let config = match AppConfig::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			return;
		}
	};
	info!("Using RPC {} and backend {}", config.rpc_url, config.backend_url);

	let rpc_client = match NearRpcClient::new(
		config.rpc_url.clone(),
		config.request_timeout,
		config.retry_max_elapsed,
	) {
		Ok(client) => client,
		Err(e) => {
			error!("Failed to create RPC client: {}", e);
			return;
		}
	};
	let backend_client = match HereBackendClient::new(
		config.backend_url.clone(),
		config.request_timeout,
		config.retry_max_elapsed,
	) {
		Ok(client) => client,
		Err(e) => {
			error!("Failed to create backend client: {}", e);
			return;
		}
	};

	let engine = match AccountSyncEngine::new(
		&account_id,
		Arc::new(rpc_client),
		None,
		config.engine_config(),
	) {
		Ok(engine) => engine,
		Err(e) => {
			error!("Cannot sync {}: {}", account_id, e);
			return;
		}
	};

	let snapshot = match engine.force_full_refresh().await {
		Ok(snapshot) => snapshot,
		Err(e) => {
			error!("Refresh failed: {}", e);
			return;
		}
	};
	let policy = engine.reserve_policy();
	info!("Account {} at block {}", snapshot.account_id, snapshot.block_height);
	info!(
		"Native: {} NEAR, reserved: {} NEAR, spendable: {} NEAR",
		format_token_amount(snapshot.native_amount, NATIVE_TOKEN_DECIMALS),
		format_token_amount(snapshot.reserved_base_units(policy), NATIVE_TOKEN_DECIMALS),
		format_token_amount(snapshot.spendable_native_base_units(policy), NATIVE_TOKEN_DECIMALS),
	);
	info!(
		"Wrapped: {} NEAR, accrued: {} NEAR, APY: {}",
		format_token_amount(snapshot.wrapped_token_amount, NATIVE_TOKEN_DECIMALS),
		format_token_amount(snapshot.accrued_yield, NATIVE_TOKEN_DECIMALS),
		engine.apy().await,
	);

	let session = BalanceAggregationSession::start(
		engine.clone(),
		Arc::new(backend_client),
		config.session_config(),
	);

	// the first item is the empty list published before any update
	let mut token_updates = Box::pin(session.token_updates().skip(1).take(updates));
	while let Some(tokens) = token_updates.next().await {
		for token in &tokens {
			match token.fiat_amount() {
				Ok(fiat) => info!("{} {} (${})", token.amount, token.symbol, format_fiat(fiat)),
				Err(e) => warn!("{} {} (no fiat value: {})", token.amount, token.symbol, e),
			}
		}
		if let Some(rate) = session.exchange_rate() {
			info!("NEAR rate: ${}", format_fiat(rate.rate));
		}
	}

	info!("{}", engine.refresh_stats().summary());
	session.shutdown().await;
}
