//! Account sync engine.
//!
//! This module defines the `AccountSyncEngine`, which keeps the cached snapshot of one
//! account current. Each refresh runs as a spawned task: the sub-fetches of a cycle
//! are issued concurrently, merged behind a join barrier and published to the cache in
//! one step. The most recently started task is remembered so callers can await it.
//!
//! Overlapping cycles are not cancelled or serialized. Whichever cycle completes last
//! publishes last, so a slow older cycle can overwrite the result of a newer one.
//! Every published snapshot is internally consistent; only recency is affected.
//!
//! Write paths go through a `TransactionSubmitter`. Successful calls trigger a full
//! refresh so the cache reflects the new on-chain state.

use crate::rpc::ChainReader;
use crate::transaction::{
    Action, DEFAULT_FUNCTION_CALL_GAS, ExecutionOutcome, ONE_YOCTO, PendingTransaction, TransactionError,
    TransactionSubmitter, WITHDRAW_FEE_BUFFER,
};
use crate::wallet::AccountSyncError;
use crate::wallet::cache::{AccountStateCache, SharedSnapshot};
use crate::wallet::rewards::DEFAULT_APY;
use crate::wallet::state::ReservePolicy;
use crate::wallet::sync::{
    cycle_tracker::{CycleId, CycleTracker, RefreshKind, RefreshStats},
    strategies::{Clock, ContractRefresh, FullRefresh, RefreshStrategy, SyncSources, system_clock},
};
use crate::wallet::types::AccountId;

use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use futures_util::{Stream, StreamExt};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Contract the production wallet keeps its wrapped balance and rewards in.
pub const DEFAULT_REWARDS_CONTRACT: &str = "storage.herewallet.near";

/// Handle to a spawned refresh cycle. Cloneable; every clone resolves to the same result.
pub type RefreshTask = Shared<BoxFuture<'static, Result<SharedSnapshot, String>>>;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Contract queried for `ft_balance_of` and `get_user`.
    pub rewards_contract: String,
    pub reserve_policy: ReservePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rewards_contract: DEFAULT_REWARDS_CONTRACT.to_string(),
            reserve_policy: ReservePolicy::default(),
        }
    }
}

struct EngineInner {
    sources: SyncSources,
    submitter: Option<Arc<dyn TransactionSubmitter>>,
    reserve_policy: ReservePolicy,
    cache: AccountStateCache,
    tracker: CycleTracker,
    pending: Mutex<Option<RefreshTask>>,
}

impl EngineInner {
    async fn run_cycle(&self, kind: RefreshKind, cycle: CycleId) -> SharedSnapshot {
        let mut open = OpenCycle {
            tracker: &self.tracker,
            cycle,
            published: false,
        };
        let strategy: &dyn RefreshStrategy = match kind {
            RefreshKind::Full => &FullRefresh,
            RefreshKind::Contract => &ContractRefresh,
        };
        let snapshot = strategy
            .refresh(&self.sources, &self.tracker, cycle, &self.cache)
            .await;
        let published = self.cache.publish(snapshot);
        self.tracker.published(cycle);
        open.published = true;
        published
    }
}

/// Marks a cycle abandoned when its task unwinds or is dropped before publishing.
struct OpenCycle<'a> {
    tracker: &'a CycleTracker,
    cycle: CycleId,
    published: bool,
}

impl Drop for OpenCycle<'_> {
    fn drop(&mut self) {
        if !self.published {
            warn!("Refresh cycle {} ended without publishing", self.cycle);
            self.tracker.abandoned(self.cycle);
        }
    }
}

/// Keeps the balance state of one account synchronized with the chain.
///
/// Cheap to clone; clones share the cache and the in-flight task.
#[derive(Clone)]
pub struct AccountSyncEngine {
    inner: Arc<EngineInner>,
}

impl AccountSyncEngine {
    /// Create an engine without starting a refresh.
    ///
    /// Fails with `AccountNotFound` when `account_id` is not a valid account name.
    /// A read-only engine (no submitter) rejects every write operation.
    pub fn new(
        account_id: &str,
        reader: Arc<dyn ChainReader>,
        submitter: Option<Arc<dyn TransactionSubmitter>>,
        config: EngineConfig,
    ) -> Result<Self, AccountSyncError> {
        Self::with_clock(account_id, reader, submitter, config, system_clock())
    }

    /// Like `new`, with an explicit clock for yield accrual.
    pub fn with_clock(
        account_id: &str,
        reader: Arc<dyn ChainReader>,
        submitter: Option<Arc<dyn TransactionSubmitter>>,
        config: EngineConfig,
        clock: Clock,
    ) -> Result<Self, AccountSyncError> {
        let account_id = AccountId::parse(account_id)?;
        info!("Creating sync engine for {}", account_id);

        let sources = SyncSources {
            reader,
            account_id,
            rewards_contract: config.rewards_contract,
            clock,
        };

        Ok(Self {
            inner: Arc::new(EngineInner {
                sources,
                submitter,
                reserve_policy: config.reserve_policy,
                cache: AccountStateCache::new(),
                tracker: CycleTracker::new(),
                pending: Mutex::new(None),
            }),
        })
    }

    /// Create an engine and immediately start a full refresh.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(
        account_id: &str,
        reader: Arc<dyn ChainReader>,
        submitter: Option<Arc<dyn TransactionSubmitter>>,
        config: EngineConfig,
    ) -> Result<Self, AccountSyncError> {
        let engine = Self::new(account_id, reader, submitter, config)?;
        let _ = engine.reload_all_states();
        Ok(engine)
    }

    pub fn account_id(&self) -> &AccountId {
        &self.inner.sources.account_id
    }

    pub fn reserve_policy(&self) -> &ReservePolicy {
        &self.inner.reserve_policy
    }

    fn spawn_cycle(&self, kind: RefreshKind) -> RefreshTask {
        let cycle = self.inner.tracker.begin(kind);
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.run_cycle(kind, cycle).await });

        let task: RefreshTask = async move {
            handle.await.map_err(|e| {
                error!("Refresh cycle {} aborted: {}", cycle, e);
                e.to_string()
            })
        }
        .boxed()
        .shared();

        *self.lock_pending() = Some(task.clone());
        task
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<RefreshTask>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a full refresh cycle without waiting for it.
    pub fn reload_all_states(&self) -> RefreshTask {
        debug!("Full refresh requested for {}", self.account_id());
        self.spawn_cycle(RefreshKind::Full)
    }

    /// Start a refresh of the wrapped token balance only. Falls back to a full cycle
    /// when nothing has been published yet.
    pub fn reload_contract_state(&self) -> RefreshTask {
        debug!("Contract refresh requested for {}", self.account_id());
        self.spawn_cycle(RefreshKind::Contract)
    }

    /// Wait for the most recently started refresh. Returns immediately with the cached
    /// snapshot when no refresh was ever started.
    pub async fn pending_refresh(&self) -> Option<SharedSnapshot> {
        let task = self.lock_pending().clone();
        match task {
            Some(task) => match task.await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("Pending refresh for {} failed: {}", self.account_id(), e);
                    self.current_snapshot()
                }
            },
            None => self.current_snapshot(),
        }
    }

    /// Run a full refresh cycle and return the snapshot it published.
    pub async fn force_full_refresh(&self) -> Result<SharedSnapshot, AccountSyncError> {
        self.reload_all_states()
            .await
            .map_err(AccountSyncError::RefreshAborted)
    }

    pub fn refresh_stats(&self) -> RefreshStats {
        self.inner.tracker.get_stats()
    }

    pub fn current_snapshot(&self) -> Option<SharedSnapshot> {
        self.inner.cache.current()
    }

    /// Stream of published snapshots, starting with the current one.
    pub fn snapshot_updates(&self) -> impl Stream<Item = SharedSnapshot> + Send + 'static {
        self.inner.cache.updates()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SharedSnapshot>> {
        self.inner.cache.subscribe()
    }

    /// Stream of the total spendable balance, recomputed for every published snapshot.
    pub fn total_spendable_updates(&self) -> impl Stream<Item = u128> + Send + 'static {
        let policy = self.inner.reserve_policy.clone();
        self.snapshot_updates()
            .map(move |snapshot| snapshot.total_spendable_base_units(&policy))
    }

    fn derive<T>(&self, f: impl FnOnce(&SharedSnapshot, &ReservePolicy) -> T) -> Option<T> {
        self.current_snapshot()
            .map(|snapshot| f(&snapshot, &self.inner.reserve_policy))
    }

    pub fn native_amount(&self) -> Option<u128> {
        self.derive(|s, _| s.native_amount)
    }

    pub fn wrapped_token_amount(&self) -> Option<u128> {
        self.derive(|s, _| s.wrapped_token_amount)
    }

    pub fn accrued_amount(&self) -> Option<u128> {
        self.derive(|s, _| s.accrued_yield)
    }

    pub fn reserved_amount(&self) -> Option<u128> {
        self.derive(|s, policy| s.reserved_base_units(policy))
    }

    pub fn spendable_native_amount(&self) -> Option<u128> {
        self.derive(|s, policy| s.spendable_native_base_units(policy))
    }

    pub fn total_spendable(&self) -> Option<u128> {
        self.derive(|s, policy| s.total_spendable_base_units(policy))
    }

    /// Annual yield of the rewards contract for this account; 10% when unreadable.
    pub async fn apy(&self) -> Decimal {
        match self.inner.sources.fetch_rewards_account().await {
            Ok(record) => record.apy(),
            Err(e) => {
                warn!("Using default APY for {}: {}", self.account_id(), e);
                DEFAULT_APY
            }
        }
    }

    pub async fn latest_block_hash(&self) -> Option<String> {
        match self.inner.sources.reader.latest_block_hash().await {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("Failed to fetch the latest block hash: {}", e);
                None
            }
        }
    }

    fn submitter(&self) -> Result<&Arc<dyn TransactionSubmitter>, AccountSyncError> {
        self.inner.submitter.as_ref().ok_or_else(|| {
            AccountSyncError::TransactionFailed(TransactionError::ValidationError(format!(
                "{} is read-only",
                self.account_id()
            )))
        })
    }

    /// Call a change method and wait for the follow-up refresh before returning.
    pub async fn function_call(
        &self,
        contract_id: &str,
        method_name: &str,
        args: serde_json::Value,
        gas: Option<u64>,
        deposit: u128,
    ) -> Result<ExecutionOutcome, AccountSyncError> {
        info!("{} calling {}.{}", self.account_id(), contract_id, method_name);
        let outcome = self
            .submitter()?
            .function_call(contract_id, method_name, args, gas, deposit)
            .await?;

        if let Err(e) = self.reload_all_states().await {
            warn!("Refresh after {} failed: {}", method_name, e);
        }
        Ok(outcome)
    }

    /// Transfer native tokens. The follow-up refresh runs in the background.
    pub async fn send_money(
        &self,
        receiver_id: &str,
        amount: u128,
    ) -> Result<ExecutionOutcome, AccountSyncError> {
        info!("{} sending {} to {}", self.account_id(), amount, receiver_id);
        let outcome = self.submitter()?.send_money(receiver_id, amount).await?;
        let _ = self.reload_all_states();
        Ok(outcome)
    }

    /// Add an access key to this account. A `contract_id` makes it a function-call key
    /// limited to `method_names` and `allowance`; without one it is a full-access key.
    ///
    /// Returns the transaction hash.
    pub async fn add_key(
        &self,
        public_key: &str,
        contract_id: Option<&str>,
        method_names: Vec<String>,
        allowance: Option<u128>,
    ) -> Result<String, AccountSyncError> {
        let submitter = self.submitter()?;
        if !public_key.starts_with("ed25519:") && !public_key.starts_with("secp256k1:") {
            return Err(AccountSyncError::TransactionFailed(
                TransactionError::ValidationError(format!("Invalid public key {}", public_key)),
            ));
        }

        info!("{} adding key {}", self.account_id(), public_key);
        let transaction = PendingTransaction {
            receiver_id: self.account_id().to_string(),
            actions: vec![Action::AddKey {
                public_key: public_key.to_string(),
                contract_id: contract_id.map(str::to_string),
                method_names,
                allowance,
            }],
        };
        let outcome = submitter.sign_and_send_transaction(&transaction).await?;
        // key storage is charged to the account
        let _ = self.reload_all_states();
        Ok(outcome.transaction_hash)
    }

    /// Withdraw `amount` plus gas and a fee buffer from the rewards contract, capped at
    /// the wrapped balance.
    pub async fn withdraw_from_contract(
        &self,
        amount: u128,
    ) -> Result<ExecutionOutcome, AccountSyncError> {
        self.pending_refresh().await;
        let wrapped = self.wrapped_token_amount().unwrap_or(0);
        let withdraw_amount = amount
            .saturating_add(DEFAULT_FUNCTION_CALL_GAS as u128)
            .saturating_add(WITHDRAW_FEE_BUFFER)
            .min(wrapped);

        debug!(
            "Withdrawing {} of {} wrapped for {}",
            withdraw_amount,
            wrapped,
            self.account_id()
        );
        let contract = self.inner.sources.rewards_contract.clone();
        self.function_call(
            &contract,
            "storage_withdraw",
            json!({ "amount": withdraw_amount.to_string() }),
            None,
            ONE_YOCTO,
        )
        .await
    }

    /// Make sure `amount` native base units are available on top of the storage
    /// reserve, withdrawing the shortfall from the rewards contract if needed.
    pub async fn allocate_amount(
        &self,
        amount: u128,
    ) -> Result<Option<ExecutionOutcome>, AccountSyncError> {
        let snapshot = self.force_full_refresh().await?;
        let needed = snapshot
            .reserved_base_units(&self.inner.reserve_policy)
            .saturating_add(amount);

        if needed <= snapshot.native_amount {
            return Ok(None);
        }
        let shortfall = needed - snapshot.native_amount;
        info!("Allocating {} for {}", shortfall, self.account_id());
        self.withdraw_from_contract(shortfall).await.map(Some)
    }

    /// Submit a batch of externally built transactions, topping up the native balance
    /// from the rewards contract first when it cannot cover the batch.
    ///
    /// Returns the hashes of all submitted transactions, including the withdrawal.
    pub async fn sign_and_send_transactions(
        &self,
        transactions: &[PendingTransaction],
    ) -> Result<Vec<String>, AccountSyncError> {
        let submitter = self.submitter()?.clone();
        self.pending_refresh().await;

        let required = transactions
            .iter()
            .fold(0u128, |acc, tx| acc.saturating_add(tx.required_balance()));
        let spendable = self.spendable_native_amount().unwrap_or(0);

        let mut hashes = Vec::with_capacity(transactions.len() + 1);
        if spendable < required {
            info!(
                "Batch needs {} but only {} is spendable; withdrawing first",
                required, spendable
            );
            hashes.push(self.withdraw_from_contract(required).await?.transaction_hash);
        }

        for transaction in transactions {
            let outcome = submitter.sign_and_send_transaction(transaction).await?;
            debug!(
                "Submitted transaction {} to {}",
                outcome.transaction_hash, transaction.receiver_id
            );
            hashes.push(outcome.transaction_hash);
        }

        if !transactions.is_empty() {
            let _ = self.reload_all_states();
        }
        Ok(hashes)
    }
}

/// Force a full refresh of every engine concurrently.
pub async fn refresh_all(
    engines: &[AccountSyncEngine],
) -> Vec<Result<SharedSnapshot, AccountSyncError>> {
    join_all(engines.iter().map(|engine| engine.force_full_refresh())).await
}
