//! Holder of the latest known account snapshot.
//!
//! The cache is a `tokio::sync::watch` channel: one value, replaced atomically on every
//! publish, readable without blocking by any number of readers. Subscribers always
//! observe the newest value; a slow subscriber skips intermediate snapshots but never
//! misses the latest one.

use crate::wallet::state::AccountStateSnapshot;

use futures_util::Stream;
use futures_util::stream;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub type SharedSnapshot = Arc<AccountStateSnapshot>;

#[derive(Debug)]
pub struct AccountStateCache {
    sender: watch::Sender<Option<SharedSnapshot>>,
}

impl AccountStateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// Latest published snapshot, or `None` before the first refresh completes.
    pub fn current(&self) -> Option<SharedSnapshot> {
        self.sender.borrow().clone()
    }

    /// Replace the current snapshot and notify all subscribers.
    pub fn publish(&self, snapshot: AccountStateSnapshot) -> SharedSnapshot {
        let snapshot = Arc::new(snapshot);
        debug!(
            "Publishing snapshot for {} at block {}",
            snapshot.account_id, snapshot.block_height
        );
        self.sender.send_replace(Some(snapshot.clone()));
        snapshot
    }

    /// Raw receiver, for callers that want `watch` semantics directly.
    pub fn subscribe(&self) -> watch::Receiver<Option<SharedSnapshot>> {
        self.sender.subscribe()
    }

    /// Stream of snapshots: the current one first (if any), then each new publish.
    pub fn updates(&self) -> impl Stream<Item = SharedSnapshot> + Send + 'static {
        let receiver = self.sender.subscribe();

        stream::unfold((receiver, true), |(mut receiver, first)| async move {
            if first {
                let current = receiver.borrow_and_update().clone();
                if let Some(snapshot) = current {
                    return Some((snapshot, (receiver, false)));
                }
            }
            loop {
                receiver.changed().await.ok()?;
                let next = receiver.borrow_and_update().clone();
                if let Some(snapshot) = next {
                    return Some((snapshot, (receiver, false)));
                }
            }
        })
    }
}

impl Default for AccountStateCache {
    fn default() -> Self {
        Self::new()
    }
}
