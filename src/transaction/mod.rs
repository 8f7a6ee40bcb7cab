/// Transaction submission trait
pub mod submitter;
/// Actions, outcomes and errors
pub mod types;

pub use submitter::TransactionSubmitter;
pub use types::*;

/// Number of decimal places for the NEAR native token (yoctoNEAR).
pub const NATIVE_TOKEN_DECIMALS: u32 = 24;

/// Gas attached to contract calls made by the wallet itself (30 Tgas).
pub const DEFAULT_FUNCTION_CALL_GAS: u64 = 30_000_000_000_000;

/// Extra native balance withdrawn on top of a requested amount (0.1 NEAR).
pub const WITHDRAW_FEE_BUFFER: u128 = 100_000_000_000_000_000_000_000;

/// Deposit required by storage-management change methods.
pub const ONE_YOCTO: u128 = 1;
