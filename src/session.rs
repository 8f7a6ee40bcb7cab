//! Balance aggregation session.
//!
//! A session joins the backend token list with the engine's balance for one account.
//! A background loop refreshes both on a fixed interval or when asked, overwrites the
//! native token's amount with the engine's total spendable balance and publishes the
//! resulting list. The fiat exchange rate is published separately and is not updated
//! atomically with the list.

use crate::backend::{BackendError, ExchangeRate, FtOverviewToken, TokenRegistry};
use crate::utils::CoinType;
use crate::wallet::AccountSyncEngine;

use futures_util::{Stream, stream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time between automatic updates.
    pub refresh_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
        }
    }
}

struct SessionShared {
    engine: AccountSyncEngine,
    registry: Arc<dyn TokenRegistry>,
    tokens: watch::Sender<Vec<FtOverviewToken>>,
    exchange_rate: watch::Sender<Option<ExchangeRate>>,
}

impl SessionShared {
    /// One update: token list and a full engine refresh, fetched concurrently.
    async fn update_tokens(&self) {
        let account_id = self.engine.account_id().as_str();
        let (listed, refreshed) = tokio::join!(
            self.registry.fungible_tokens(account_id),
            self.engine.force_full_refresh()
        );

        let mut tokens = match listed {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Keeping previous token list for {}: {}", account_id, e);
                self.tokens.borrow().clone()
            }
        };

        let total_spendable = match refreshed {
            Ok(snapshot) => Some(snapshot.total_spendable_base_units(self.engine.reserve_policy())),
            Err(e) => {
                warn!("Balance refresh for {} failed: {}", account_id, e);
                self.engine.total_spendable()
            }
        };

        if let Some(total_spendable) = total_spendable {
            for token in tokens.iter_mut().filter(|t| t.is_native()) {
                if let Err(e) = token.set_amount_from_base_units(total_spendable) {
                    warn!("Cannot display {} {}: {}", total_spendable, token.symbol, e);
                }
            }
        }

        let changed = self.tokens.send_if_modified(|current| {
            if *current == tokens {
                return false;
            }
            *current = tokens;
            true
        });
        debug!("Token list for {} updated (changed: {})", account_id, changed);
    }

    async fn update_exchange_rate(&self) -> Result<ExchangeRate, BackendError> {
        let rate = self.registry.exchange_rate(CoinType::Near).await?;
        self.exchange_rate.send_replace(Some(rate));
        Ok(rate)
    }
}

async fn session_loop(
    shared: Arc<SessionShared>,
    refresh_interval: Duration,
    mut requests: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = time::interval(refresh_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let should_update = tokio::select! {
            _ = interval.tick() => true,
            request = requests.recv() => {
                if request.is_none() {
                    break;
                }
                true
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                false
            }
        };

        if !should_update {
            continue;
        }

        shared.update_tokens().await;
    }

    info!("Balance session for {} stopped", shared.engine.account_id());
}

/// Periodically merged view of an account's token balances.
pub struct BalanceAggregationSession {
    shared: Arc<SessionShared>,
    requests: mpsc::Sender<()>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BalanceAggregationSession {
    /// Start the update loop and an initial exchange-rate fetch.
    ///
    /// The first update runs immediately. Must be called from within a Tokio runtime.
    pub fn start(
        engine: AccountSyncEngine,
        registry: Arc<dyn TokenRegistry>,
        config: SessionConfig,
    ) -> Self {
        info!(
            "Starting balance session for {} every {:?}",
            engine.account_id(),
            config.refresh_interval
        );

        let (tokens, _) = watch::channel(Vec::new());
        let (exchange_rate, _) = watch::channel(None);
        let shared = Arc::new(SessionShared {
            engine,
            registry,
            tokens,
            exchange_rate,
        });

        let rate_shared = shared.clone();
        tokio::spawn(async move {
            if let Err(e) = rate_shared.update_exchange_rate().await {
                warn!("Initial exchange rate fetch failed: {}", e);
            }
        });

        // one queued request is enough; further requests coalesce into it
        let (requests, request_rx) = mpsc::channel(1);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(session_loop(
            shared.clone(),
            config.refresh_interval,
            request_rx,
            shutdown_rx,
        ));

        Self {
            shared,
            requests,
            shutdown,
            task,
        }
    }

    pub fn engine(&self) -> &AccountSyncEngine {
        &self.shared.engine
    }

    /// Latest published token list.
    pub fn tokens(&self) -> Vec<FtOverviewToken> {
        self.shared.tokens.borrow().clone()
    }

    /// The native token entry of the latest list, if the backend listed one.
    pub fn native_token(&self) -> Option<FtOverviewToken> {
        self.shared
            .tokens
            .borrow()
            .iter()
            .find(|token| token.is_native())
            .cloned()
    }

    /// Stream of token lists: the current one first, then every change.
    pub fn token_updates(&self) -> impl Stream<Item = Vec<FtOverviewToken>> + Send + 'static {
        let receiver = self.shared.tokens.subscribe();

        stream::unfold((receiver, true), |(mut receiver, first)| async move {
            if !first {
                receiver.changed().await.ok()?;
            }
            let tokens = receiver.borrow_and_update().clone();
            Some((tokens, (receiver, false)))
        })
    }

    /// Latest fiat rate of the native token, `None` until the first successful fetch.
    pub fn exchange_rate(&self) -> Option<ExchangeRate> {
        *self.shared.exchange_rate.borrow()
    }

    pub fn subscribe_exchange_rate(&self) -> watch::Receiver<Option<ExchangeRate>> {
        self.shared.exchange_rate.subscribe()
    }

    /// Fetch and publish the exchange rate now. The previous rate is kept on failure.
    pub async fn update_exchange_rate(&self) -> Result<ExchangeRate, BackendError> {
        self.shared.update_exchange_rate().await
    }

    /// Ask the loop for an update without waiting for the next tick.
    pub fn request_update(&self) {
        if self.requests.try_send(()).is_err() {
            debug!("Update already queued for {}", self.shared.engine.account_id());
        }
    }

    /// Run one update on the caller's task and return the published list.
    pub async fn update_tokens(&self) -> Vec<FtOverviewToken> {
        self.shared.update_tokens().await;
        self.tokens()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            warn!("Balance session task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{ChainAccountView, ChainReader, RpcError};
    use crate::wallet::sync::EngineConfig;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NEAR: u128 = 1_000_000_000_000_000_000_000_000;

    struct StaticChain {
        native: u128,
        wrapped: u128,
    }

    #[async_trait]
    impl ChainReader for StaticChain {
        async fn view_account(&self, _account_id: &str) -> Result<ChainAccountView, RpcError> {
            Ok(ChainAccountView {
                amount: self.native.to_string(),
                block_height: 1,
                ..ChainAccountView::initial()
            })
        }

        async fn view_function(
            &self,
            _contract_id: &str,
            method_name: &str,
            _args: serde_json::Value,
        ) -> Result<serde_json::Value, RpcError> {
            match method_name {
                "ft_balance_of" => Ok(serde_json::Value::String(self.wrapped.to_string())),
                _ => Err(RpcError::NoData),
            }
        }

        async fn latest_block_hash(&self) -> Result<String, RpcError> {
            Err(RpcError::NoData)
        }
    }

    #[derive(Default)]
    struct FakeRegistry {
        lists: Mutex<Vec<Result<Vec<FtOverviewToken>, ()>>>,
        rate: Mutex<Option<ExchangeRate>>,
        list_calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenRegistry for FakeRegistry {
        async fn fungible_tokens(
            &self,
            _account_id: &str,
        ) -> Result<Vec<FtOverviewToken>, BackendError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let mut lists = self.lists.lock().unwrap();
            let next = if lists.len() > 1 {
                lists.remove(0)
            } else {
                lists.first().cloned().unwrap_or(Ok(vec![]))
            };
            next.map_err(|_| BackendError::NoData)
        }

        async fn exchange_rate(&self, _coin: CoinType) -> Result<ExchangeRate, BackendError> {
            self.rate.lock().unwrap().ok_or(BackendError::Status(503))
        }
    }

    fn token(symbol: &str, decimal: u32, amount: &str) -> FtOverviewToken {
        FtOverviewToken {
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            icon: String::new(),
            contract_id: symbol.to_lowercase(),
            currency: 0,
            token_id: 0,
            description: String::new(),
            decimal,
            amount: Decimal::from_str(amount).unwrap(),
            usd_rate: Decimal::from(2),
            usd_rate_yesterday: Decimal::ZERO,
        }
    }

    fn engine(native: u128, wrapped: u128) -> AccountSyncEngine {
        AccountSyncEngine::new(
            "alice.near",
            Arc::new(StaticChain { native, wrapped }),
            None,
            EngineConfig::default(),
        )
        .unwrap()
    }

    fn hourly() -> SessionConfig {
        SessionConfig {
            refresh_interval: Duration::from_secs(3600),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn native_entry_shows_total_spendable() {
        let registry = Arc::new(FakeRegistry::default());
        registry
            .lists
            .lock()
            .unwrap()
            .push(Ok(vec![token("NEAR", 24, "0"), token("USDC", 6, "12.5")]));

        let session = BalanceAggregationSession::start(engine(2 * NEAR, NEAR), registry, hourly());
        let mut updates = Box::pin(session.token_updates());
        // initial empty list
        assert!(updates.next().await.unwrap().is_empty());

        let tokens = updates.next().await.unwrap();
        assert_eq!(tokens.len(), 2);
        // 2 NEAR - 0.05 reserved + 1 wrapped
        assert_eq!(
            session.native_token().unwrap().amount,
            Decimal::from_str("2.95").unwrap()
        );
        assert_eq!(tokens[1].amount, Decimal::from_str("12.5").unwrap());
        assert_eq!(
            session.native_token().unwrap().fiat_amount().unwrap(),
            Decimal::from_str("5.90").unwrap()
        );

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn registry_failure_keeps_previous_list() {
        let registry = Arc::new(FakeRegistry::default());
        registry.lists.lock().unwrap().extend([
            Ok(vec![token("NEAR", 24, "0")]),
            Err(()),
        ]);

        let session =
            BalanceAggregationSession::start(engine(NEAR, 0), registry.clone(), hourly());
        while session.tokens().is_empty() {
            tokio::task::yield_now().await;
        }
        let first = session.tokens();
        assert_eq!(
            first[0].amount,
            Decimal::from_str("0.95").unwrap()
        );

        let second = session.update_tokens().await;
        assert_eq!(second, first);
        assert_eq!(registry.list_calls.load(Ordering::SeqCst), 2);

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_and_requests_trigger_updates() {
        let registry = Arc::new(FakeRegistry::default());
        let session = BalanceAggregationSession::start(
            engine(NEAR, 0),
            registry.clone(),
            SessionConfig {
                refresh_interval: Duration::from_secs(5),
            },
        );

        // immediate first tick
        while registry.list_calls.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }

        time::sleep(Duration::from_secs(5)).await;
        while registry.list_calls.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        session.request_update();
        while registry.list_calls.load(Ordering::SeqCst) < 3 {
            tokio::task::yield_now().await;
        }

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_rate_is_fetched_at_start_and_on_request() {
        let registry = Arc::new(FakeRegistry::default());
        let first = ExchangeRate {
            rate: Decimal::from_str("3.2").unwrap(),
            yesterday_rate: Decimal::from(3),
        };
        *registry.rate.lock().unwrap() = Some(first);

        let session = BalanceAggregationSession::start(engine(NEAR, 0), registry.clone(), hourly());
        let mut rates = session.subscribe_exchange_rate();
        rates.wait_for(|rate| rate.is_some()).await.unwrap();
        assert_eq!(session.exchange_rate(), Some(first));

        *registry.rate.lock().unwrap() = None;
        assert!(session.update_exchange_rate().await.is_err());
        assert_eq!(session.exchange_rate(), Some(first));

        let second = ExchangeRate {
            rate: Decimal::from(4),
            ..first
        };
        *registry.rate.lock().unwrap() = Some(second);
        assert_eq!(session.update_exchange_rate().await.unwrap(), second);
        assert_eq!(session.exchange_rate(), Some(second));

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_loop() {
        let registry = Arc::new(FakeRegistry::default());
        let session = BalanceAggregationSession::start(engine(NEAR, 0), registry.clone(), hourly());
        while registry.list_calls.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        session.shutdown().await;

        time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(registry.list_calls.load(Ordering::SeqCst), 1);
    }
}
