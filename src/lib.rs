//! Balance synchronization for NEAR wallet accounts.
//!
//! `wallet::AccountSyncEngine` keeps a cached snapshot of one account's chain state,
//! wrapped token balance and accrued yield, and derives spendable balances from it.
//! `session::BalanceAggregationSession` merges that balance into the token list served
//! by the wallet backend.

pub mod backend;
pub mod config;
pub mod rpc;
pub mod session;
pub mod transaction;
pub mod utils;
pub mod wallet;

pub use config::AppConfig;
pub use session::{BalanceAggregationSession, SessionConfig};
pub use wallet::{AccountStateSnapshot, AccountSyncEngine, AccountSyncError};
