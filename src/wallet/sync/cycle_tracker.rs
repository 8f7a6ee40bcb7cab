//! Refresh cycle tracking.
//!
//! This module provides the `CycleTracker`, which assigns ids to refresh cycles, records
//! the phase each cycle is in and counts how cycles and their data sources fared. Cycles
//! may overlap, so the tracker keys phases by cycle id rather than keeping one global
//! state.
//!
//! The tracker is shared by the engine and its spawned refresh tasks and is only ever
//! locked for short, non-async sections.

use crate::wallet::types::DataSource;

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

/// Identifier of one refresh cycle, increasing in request order.
pub type CycleId = u64;

/// Phase of a single refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// No cycle with this id is running.
    Idle,
    /// Sub-fetches are in flight.
    Fetching,
    /// All sources resolved; the snapshot is being assembled.
    Merging,
    /// The snapshot was written to the cache.
    Published,
}

/// Kind of refresh a cycle performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    /// Chain state, token balance and accrued yield.
    Full,
    /// Token balance only.
    Contract,
}

#[derive(Debug, Default)]
struct TrackerState {
    next_id: CycleId,
    active: HashMap<CycleId, CyclePhase>,
    cycles_started: usize,
    cycles_published: usize,
    last_published: Option<CycleId>,
    source_failures: HashMap<DataSource, usize>,
}

/// Records refresh cycle progress and statistics.
#[derive(Debug, Default)]
pub struct CycleTracker {
    state: Mutex<TrackerState>,
}

impl CycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut TrackerState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Open a new cycle in the `Fetching` phase and return its id.
    pub fn begin(&self, kind: RefreshKind) -> CycleId {
        let id = self.with_state(|state| {
            state.next_id += 1;
            state.cycles_started += 1;
            state.active.insert(state.next_id, CyclePhase::Fetching);
            state.next_id
        });
        debug!("Refresh cycle {} ({:?}) fetching", id, kind);
        id
    }

    /// Move a cycle to `Merging` once all of its sources have resolved.
    pub fn merging(&self, id: CycleId) {
        self.with_state(|state| {
            if let Some(phase) = state.active.get_mut(&id) {
                *phase = CyclePhase::Merging;
            }
        });
    }

    /// Record a data source failure absorbed by a cycle.
    pub fn record_source_failure(&self, id: CycleId, source: DataSource) {
        self.with_state(|state| {
            *state.source_failures.entry(source).or_default() += 1;
        });
        debug!("Refresh cycle {} absorbed a {} failure", id, source);
    }

    /// Mark a cycle as published and close it.
    pub fn published(&self, id: CycleId) {
        let superseded = self.with_state(|state| {
            state.active.remove(&id);
            state.cycles_published += 1;
            let superseded = state.last_published.is_some_and(|last| last > id);
            state.last_published = Some(id);
            superseded
        });
        if superseded {
            info!(
                "Refresh cycle {} completed after a newer cycle and overwrote its snapshot",
                id
            );
        }
    }

    /// Close a cycle that ended without publishing.
    pub fn abandoned(&self, id: CycleId) {
        self.with_state(|state| {
            state.active.remove(&id);
        });
    }

    /// Phase of a given cycle. Closed or unknown cycles report `Published` or `Idle`.
    pub fn phase(&self, id: CycleId) -> CyclePhase {
        self.with_state(|state| match state.active.get(&id) {
            Some(phase) => *phase,
            None if state.last_published.is_some() && id <= state.next_id => CyclePhase::Published,
            None => CyclePhase::Idle,
        })
    }

    /// Number of cycles currently running.
    pub fn in_flight(&self) -> usize {
        self.with_state(|state| state.active.len())
    }

    pub fn get_stats(&self) -> RefreshStats {
        self.with_state(|state| RefreshStats {
            cycles_started: state.cycles_started,
            cycles_published: state.cycles_published,
            in_flight: state.active.len(),
            last_published_cycle: state.last_published,
            chain_state_failures: state.source_failures.get(&DataSource::ChainState).copied().unwrap_or(0),
            token_balance_failures: state.source_failures.get(&DataSource::TokenBalance).copied().unwrap_or(0),
            accrued_yield_failures: state.source_failures.get(&DataSource::AccruedYield).copied().unwrap_or(0),
        })
    }
}

/// Statistics about refresh cycles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshStats {
    pub cycles_started: usize,
    pub cycles_published: usize,
    pub in_flight: usize,
    pub last_published_cycle: Option<CycleId>,
    pub chain_state_failures: usize,
    pub token_balance_failures: usize,
    pub accrued_yield_failures: usize,
}

impl RefreshStats {
    /// Get a human-readable summary of the refresh statistics
    pub fn summary(&self) -> String {
        format!(
            "{} cycles started, {} published, {} in flight; absorbed failures: {} chain, {} token, {} yield",
            self.cycles_started,
            self.cycles_published,
            self.in_flight,
            self.chain_state_failures,
            self.token_balance_failures,
            self.accrued_yield_failures
        )
    }
}
