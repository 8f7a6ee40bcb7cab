//! Rewards contract records and the accrued-yield formula.

use crate::utils::{ConversionError, FixedPointConverter};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Seconds in a Julian year, the period `apy_value` is quoted over.
pub const SECONDS_PER_YEAR: u128 = 31_557_600;
/// `apy_value` is expressed in basis points.
pub const APY_BASIS_POINTS: u64 = 10_000;
/// APY assumed when the contract cannot be read.
pub const DEFAULT_APY: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

/// User record returned by the rewards contract's `get_user` view method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsAccount {
	/// Annual yield in basis points.
	pub apy_value: u64,
	/// Time of the last on-chain accrual, in nanoseconds since the epoch.
	pub last_accrual_ts: u64,
	/// Yield accrued on chain up to `last_accrual_ts`, in base units.
	pub accrued: String,
}

impl RewardsAccount {
	/// Annual yield as a fraction, e.g. `0.1` for 10%.
	pub fn apy(&self) -> Decimal {
		Decimal::from(self.apy_value) / Decimal::from(APY_BASIS_POINTS)
	}

	/// Time of the last on-chain accrual.
	pub fn last_accrual(&self) -> Option<DateTime<Utc>> {
		let nanos = i64::try_from(self.last_accrual_ts).ok()?;
		Some(DateTime::from_timestamp_nanos(nanos))
	}

	/// Yield owed at `now` for a wrapped balance of `wrapped_amount` base units:
	/// the on-chain accrued figure plus the linear accrual since the last update,
	/// rounded down to a whole base unit.
	pub fn total_accrued(
		&self,
		wrapped_amount: u128,
		now: DateTime<Utc>,
	) -> Result<u128, ConversionError> {
		let accrued = FixedPointConverter::new(0).parse_base_units(&self.accrued)?;

		let last_ms = (self.last_accrual_ts / 1_000_000) as i64;
		let elapsed_ms = now.timestamp_millis().saturating_sub(last_ms).max(0) as u128;

		// wrapped * apy / 10_000 per year, linear in milliseconds
		let per_year = wrapped_amount.saturating_mul(self.apy_value as u128);
		let divisor = SECONDS_PER_YEAR * APY_BASIS_POINTS as u128 * 1_000;
		let pending = (per_year / divisor)
			.saturating_mul(elapsed_ms)
			.saturating_add((per_year % divisor) * elapsed_ms / divisor);

		accrued.checked_add(pending).ok_or(ConversionError::Overflow)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	const NEAR: u128 = 1_000_000_000_000_000_000_000_000;

	fn account(apy_value: u64, last: DateTime<Utc>, accrued: &str) -> RewardsAccount {
		RewardsAccount {
			apy_value,
			last_accrual_ts: last.timestamp_nanos_opt().unwrap() as u64,
			accrued: accrued.to_string(),
		}
	}

	#[test]
	fn decodes_contract_record() {
		let raw = serde_json::json!({
			"apy_value": 1000,
			"last_accrual_ts": 1_660_000_000_000_000_000u64,
			"accrued": "12345"
		});
		let record: RewardsAccount = serde_json::from_value(raw).unwrap();
		assert_eq!(record.apy(), Decimal::new(1, 1));
		assert_eq!(record.accrued, "12345");
		assert_eq!(record.last_accrual().unwrap().timestamp(), 1_660_000_000);
	}

	#[test]
	fn accrues_a_full_year_at_apy() {
		let last = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
		let now = last + Duration::seconds(SECONDS_PER_YEAR as i64);
		let record = account(1_000, last, "0");
		assert_eq!(record.total_accrued(100 * NEAR, now).unwrap(), 10 * NEAR);
	}

	#[test]
	fn adds_on_chain_accrued_amount() {
		let last = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
		let record = account(1_000, last, "500");
		assert_eq!(record.total_accrued(100 * NEAR, last).unwrap(), 500);
	}

	#[test]
	fn clock_skew_does_not_reduce_accrual() {
		let last = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
		let record = account(1_000, last, "7");
		let earlier = last - Duration::seconds(60);
		assert_eq!(record.total_accrued(NEAR, earlier).unwrap(), 7);
	}

	#[test]
	fn malformed_accrued_is_a_parse_error() {
		let record = account(1_000, Utc::now(), "1.5");
		assert!(matches!(
			record.total_accrued(NEAR, Utc::now()),
			Err(ConversionError::Parse(_))
		));
	}

	#[test]
	fn default_apy_is_ten_percent() {
		assert_eq!(DEFAULT_APY, Decimal::new(1, 1));
	}
}
