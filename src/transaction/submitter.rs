//! Transaction submission seam.
//!
//! Key management and signing live in an external SDK. The sync engine only needs
//! to submit already-authorised operations for its own account and learn whether they
//! succeeded, so that is all this trait asks for.

use super::types::{ExecutionOutcome, PendingTransaction, TransactionError};
use async_trait::async_trait;

/// Signs and submits transactions on behalf of one account.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Call a change method on a contract.
    async fn function_call(
        &self,
        contract_id: &str,
        method_name: &str,
        args: serde_json::Value,
        gas: Option<u64>,
        deposit: u128,
    ) -> Result<ExecutionOutcome, TransactionError>;

    /// Transfer native tokens to another account.
    async fn send_money(
        &self,
        receiver_id: &str,
        amount: u128,
    ) -> Result<ExecutionOutcome, TransactionError>;

    /// Sign and submit a transaction built elsewhere.
    async fn sign_and_send_transaction(
        &self,
        transaction: &PendingTransaction,
    ) -> Result<ExecutionOutcome, TransactionError>;
}
