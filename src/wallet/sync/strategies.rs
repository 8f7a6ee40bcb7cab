use crate::rpc::{ChainAccountView, ChainReader, view_function_as};
use crate::utils::FixedPointConverter;
use crate::wallet::AccountSyncError;
use crate::wallet::cache::AccountStateCache;
use crate::wallet::rewards::RewardsAccount;
use crate::wallet::state::AccountStateSnapshot;
use crate::wallet::sync::cycle_tracker::{CycleId, CycleTracker, RefreshKind};
use crate::wallet::types::{AccountId, DataSource};

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of the current time, injectable for tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
	Arc::new(Utc::now)
}

/// The data sources one account is refreshed from.
#[derive(Clone)]
pub struct SyncSources {
	pub reader: Arc<dyn ChainReader>,
	pub account_id: AccountId,
	/// Contract holding the wrapped token balance and the rewards records.
	pub rewards_contract: String,
	pub clock: Clock,
}

impl SyncSources {
	/// Chain state of the account.
	pub async fn fetch_chain_state(&self) -> Result<ChainAccountView, AccountSyncError> {
		self.reader
			.view_account(self.account_id.as_str())
			.await
			.map_err(|e| AccountSyncError::source_unavailable(DataSource::ChainState, e))
	}

	/// Wrapped token balance, via `ft_balance_of`.
	pub async fn fetch_token_balance(&self) -> Result<u128, AccountSyncError> {
		let value = self
			.reader
			.view_function(
				&self.rewards_contract,
				"ft_balance_of",
				json!({ "account_id": self.account_id.as_str() }),
			)
			.await
			.map_err(|e| AccountSyncError::source_unavailable(DataSource::TokenBalance, e))?;

		let raw = value.as_str().ok_or_else(|| {
			AccountSyncError::ParseError(format!("ft_balance_of returned {}", value))
		})?;
		Ok(FixedPointConverter::new(0).parse_base_units(raw)?)
	}

	/// The account's record in the rewards contract.
	pub async fn fetch_rewards_account(&self) -> Result<RewardsAccount, AccountSyncError> {
		view_function_as::<RewardsAccount>(
			self.reader.as_ref(),
			&self.rewards_contract,
			"get_user",
			json!({ "account_id": self.account_id.as_str() }),
		)
		.await
		.map_err(|e| AccountSyncError::source_unavailable(DataSource::AccruedYield, e))
	}

	/// Yield accrued for a wrapped balance of `wrapped_amount`, as of now.
	pub async fn fetch_accrued(&self, wrapped_amount: u128) -> Result<u128, AccountSyncError> {
		let record = self.fetch_rewards_account().await?;
		Ok(record.total_accrued(wrapped_amount, (self.clock)())?)
	}
}

/// One way of producing a new snapshot.
///
/// Strategies absorb every data source failure: they always return a snapshot, filling
/// in defaults or previous values for whatever could not be read.
#[async_trait::async_trait]
pub trait RefreshStrategy: Send + Sync {
	fn kind(&self) -> RefreshKind;

	/// Fetch, merge and return the next snapshot. Previous values are read from
	/// `cache` only after every fetch has resolved.
	async fn refresh(
		&self,
		sources: &SyncSources,
		tracker: &CycleTracker,
		cycle: CycleId,
		cache: &AccountStateCache,
	) -> AccountStateSnapshot;
}

/// Chain state, token balance and accrued yield.
pub struct FullRefresh;

#[async_trait::async_trait]
impl RefreshStrategy for FullRefresh {
	fn kind(&self) -> RefreshKind {
		RefreshKind::Full
	}

	async fn refresh(
		&self,
		sources: &SyncSources,
		tracker: &CycleTracker,
		cycle: CycleId,
		cache: &AccountStateCache,
	) -> AccountStateSnapshot {
		let (chain_state, token_balance) =
			tokio::join!(sources.fetch_chain_state(), sources.fetch_token_balance());

		let view = chain_state.unwrap_or_else(|e| {
			warn!("Cycle {}: using initial chain state: {}", cycle, e);
			tracker.record_source_failure(cycle, DataSource::ChainState);
			ChainAccountView::initial()
		});

		// yield is only computed from a balance that was actually read
		let (wrapped_amount, accrued) = match token_balance {
			Ok(wrapped_amount) => (wrapped_amount, sources.fetch_accrued(wrapped_amount).await),
			Err(e) => {
				warn!("Cycle {}: token balance defaults to zero: {}", cycle, e);
				tracker.record_source_failure(cycle, DataSource::TokenBalance);
				(0, Err(e))
			}
		};

		tracker.merging(cycle);
		let accrued_yield = match accrued {
			Ok(accrued) => accrued,
			Err(e) => {
				let carried = cache.current().map(|s| s.accrued_yield).unwrap_or(0);
				warn!(
					"Cycle {}: carrying forward accrued yield {}: {}",
					cycle, carried, e
				);
				tracker.record_source_failure(cycle, DataSource::AccruedYield);
				carried
			}
		};

		debug!(
			"Cycle {}: merged chain state at block {} with wrapped {} and accrued {}",
			cycle, view.block_height, wrapped_amount, accrued_yield
		);

		AccountStateSnapshot::from_chain(
			sources.account_id.clone(),
			&view,
			wrapped_amount,
			accrued_yield,
		)
	}
}

/// Token balance only; everything else is copied from the current snapshot.
pub struct ContractRefresh;

#[async_trait::async_trait]
impl RefreshStrategy for ContractRefresh {
	fn kind(&self) -> RefreshKind {
		RefreshKind::Contract
	}

	async fn refresh(
		&self,
		sources: &SyncSources,
		tracker: &CycleTracker,
		cycle: CycleId,
		cache: &AccountStateCache,
	) -> AccountStateSnapshot {
		if cache.current().is_none() {
			debug!("Cycle {}: nothing cached yet, running a full refresh", cycle);
			return FullRefresh.refresh(sources, tracker, cycle, cache).await;
		}

		let wrapped_amount = sources.fetch_token_balance().await.unwrap_or_else(|e| {
			warn!("Cycle {}: token balance defaults to zero: {}", cycle, e);
			tracker.record_source_failure(cycle, DataSource::TokenBalance);
			0
		});

		tracker.merging(cycle);
		match cache.current() {
			Some(previous) => previous.with_wrapped_token_amount(wrapped_amount),
			None => AccountStateSnapshot::from_chain(
				sources.account_id.clone(),
				&ChainAccountView::initial(),
				wrapped_amount,
				0,
			),
		}
	}
}
