//! Types for NEAR JSON-RPC integration

use serde::{Deserialize, Serialize};

/// Code hash reported for accounts without a deployed contract.
pub const EMPTY_CODE_HASH: &str = "11111111111111111111111111111111";

/// Account state as returned by the `view_account` query.
///
/// Balances arrive as decimal strings in yoctoNEAR and are parsed into `u128`
/// when the snapshot is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainAccountView {
    /// Liquid balance in yoctoNEAR.
    pub amount: String,
    /// Balance locked for staking, in yoctoNEAR.
    pub locked: String,
    /// Hash of the deployed contract code.
    pub code_hash: String,
    /// Bytes of storage used by the account.
    pub storage_usage: u64,
    /// Block height at which storage was last paid for.
    #[serde(default)]
    pub storage_paid_at: u64,
    /// Height of the block this view was taken at.
    #[serde(default)]
    pub block_height: u64,
    /// Hash of the block this view was taken at.
    #[serde(default)]
    pub block_hash: String,
}

impl ChainAccountView {
    /// Zero state used when the chain view cannot be fetched.
    pub fn initial() -> Self {
        Self {
            amount: "0".to_string(),
            locked: "0".to_string(),
            code_hash: EMPTY_CODE_HASH.to_string(),
            storage_usage: 0,
            storage_paid_at: 0,
            block_height: 0,
            block_hash: String::new(),
        }
    }
}

/// Result of a `call_function` query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallFunctionResult {
    /// Raw bytes returned by the contract, usually UTF-8 JSON.
    #[serde(default)]
    pub result: Vec<u8>,
    /// Log lines emitted by the view call.
    #[serde(default)]
    pub logs: Vec<String>,
    /// Set instead of `result` when the contract call failed.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub block_height: u64,
}

/// Minimal block view, only the header hash is read.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockView {
    pub header: BlockHeaderView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeaderView {
    pub hash: String,
    pub height: u64,
}

/// Error types for chain RPC operations
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Account {0} does not exist on chain")]
    UnknownAccount(String),

    #[error("No data returned")]
    NoData,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    DecodeError(String),
}
