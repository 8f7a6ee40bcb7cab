pub mod cache;
pub mod rewards;
pub mod state;
pub mod sync;
pub mod types;

pub use cache::{AccountStateCache, SharedSnapshot};
pub use rewards::RewardsAccount;
pub use state::{AccountStateSnapshot, ReservePolicy};
pub use sync::AccountSyncEngine;
pub use types::*;
