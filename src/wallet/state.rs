//! Account state snapshot and the balances derived from it.
//!
//! A snapshot is an immutable value produced by exactly one refresh cycle. Derived
//! quantities (storage reserve, spendable balance) are recomputed from the snapshot on
//! every call and never stored, so they can never drift from the state they describe.

use crate::rpc::ChainAccountView;
use crate::transaction::NATIVE_TOKEN_DECIMALS;
use crate::utils::{ConversionError, FixedPointConverter};
use crate::wallet::types::AccountId;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Storage reserve policy.
///
/// The reserve is `storage_usage / bytes_per_native_unit` native tokens plus a flat
/// `minimum_buffer`. Both constants are wallet business policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservePolicy {
    /// Bytes of storage covered by one whole native token.
    pub bytes_per_native_unit: u64,
    /// Flat amount, in whole native tokens, always kept aside.
    pub minimum_buffer: Decimal,
}

impl Default for ReservePolicy {
    fn default() -> Self {
        Self {
            bytes_per_native_unit: 100_000,
            minimum_buffer: Decimal::new(5, 2),
        }
    }
}

impl ReservePolicy {
    /// Base units reserved for `storage_usage` bytes.
    pub fn reserved_for(&self, storage_usage: u64) -> Result<u128, ConversionError> {
        let converter = FixedPointConverter::new(NATIVE_TOKEN_DECIMALS);
        let storage = converter.fiat_to_base_units(
            Decimal::from(storage_usage),
            Decimal::from(self.bytes_per_native_unit),
        )?;
        let buffer = converter.to_base_units(self.minimum_buffer)?;
        storage.checked_add(buffer).ok_or(ConversionError::Overflow)
    }
}

/// Latest known balance-relevant state of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStateSnapshot {
    pub account_id: AccountId,
    /// Balance locked for staking.
    pub locked: u128,
    /// Liquid native balance.
    pub native_amount: u128,
    pub code_hash: String,
    pub storage_paid_at: u64,
    pub storage_usage: u64,
    /// Balance held in the rewards contract's fungible token.
    pub wrapped_token_amount: u128,
    /// Yield owed by the rewards contract.
    pub accrued_yield: u128,
    /// Block height of the chain view, 0 when the view was synthesized.
    pub block_height: u64,
}

impl AccountStateSnapshot {
    /// Build a snapshot from a chain view and the separately fetched balances.
    ///
    /// Unparseable chain balances are treated as zero.
    pub fn from_chain(
        account_id: AccountId,
        view: &ChainAccountView,
        wrapped_token_amount: u128,
        accrued_yield: u128,
    ) -> Self {
        let converter = FixedPointConverter::new(NATIVE_TOKEN_DECIMALS);
        let parse = |field: &str, raw: &str| {
            converter.parse_base_units(raw).unwrap_or_else(|e| {
                warn!("Ignoring malformed {} for {}: {}", field, account_id, e);
                0
            })
        };

        Self {
            locked: parse("locked balance", &view.locked),
            native_amount: parse("native balance", &view.amount),
            code_hash: view.code_hash.clone(),
            storage_paid_at: view.storage_paid_at,
            storage_usage: view.storage_usage,
            wrapped_token_amount,
            accrued_yield,
            block_height: view.block_height,
            account_id,
        }
    }

    /// Copy of this snapshot with a new wrapped-token balance; every other field kept.
    pub fn with_wrapped_token_amount(&self, wrapped_token_amount: u128) -> Self {
        Self {
            wrapped_token_amount,
            ..self.clone()
        }
    }

    /// Native balance set aside for storage.
    pub fn reserved_base_units(&self, policy: &ReservePolicy) -> u128 {
        policy.reserved_for(self.storage_usage).unwrap_or(u128::MAX)
    }

    /// Native balance minus the storage reserve, never below zero.
    pub fn spendable_native_base_units(&self, policy: &ReservePolicy) -> u128 {
        self.native_amount
            .saturating_sub(self.reserved_base_units(policy))
    }

    /// Spendable native balance plus the wrapped-token balance.
    pub fn total_spendable_base_units(&self, policy: &ReservePolicy) -> u128 {
        self.spendable_native_base_units(policy)
            .saturating_add(self.wrapped_token_amount)
    }
}
