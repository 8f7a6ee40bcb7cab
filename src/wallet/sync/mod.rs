//! Account synchronization module
//!
//! This module keeps one account's cached snapshot in step with the chain:
//!
//! - `engine`: The `AccountSyncEngine`, entry point for refreshes, derived balances and
//!   transaction paths.
//! - `strategies`: Full and contract-only refresh cycles and the data sources they read.
//! - `cycle_tracker`: Tracks the phase of every refresh cycle and counts absorbed failures.
//!
//! Each refresh cycle fetches its sources concurrently, merges them behind a join barrier
//! and publishes a single snapshot. Source failures are absorbed inside the cycle.

/// Refresh cycle phases and statistics
pub mod cycle_tracker;
/// Sync engine and its transaction paths
pub mod engine;
/// Pluggable refresh strategies
pub mod strategies;

pub use cycle_tracker::{CyclePhase, RefreshKind, RefreshStats};
pub use engine::*;
