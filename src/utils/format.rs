use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places used when showing fiat values.
pub const FIAT_DISPLAY_DECIMALS: u32 = 2;
/// Decimal places kept for token amounts in balance lists.
pub const TOKEN_AMOUNT_DECIMALS: u32 = 6;

/// Format a base-unit amount with exactly `decimals` fractional digits.
///
/// Works on the integer directly, so values beyond what a float or a `Decimal`
/// can hold are still printed exactly.
pub fn format_token_amount(amount: u128, decimals: u32) -> String {
	let digits = amount.to_string();
	let decimals = decimals as usize;
	if decimals == 0 {
		return digits;
	}

	let padded = if digits.len() <= decimals {
		format!("{}{}", "0".repeat(decimals + 1 - digits.len()), digits)
	} else {
		digits
	};
	let (whole, fraction) = padded.split_at(padded.len() - decimals);
	format!("{}.{}", whole, fraction)
}

/// Round half-to-even to `decimals` places, for display only.
pub fn round_for_display(amount: Decimal, decimals: u32) -> Decimal {
	amount.round_dp_with_strategy(decimals, RoundingStrategy::MidpointNearestEven)
}

/// Render a fiat value with two decimals, e.g. `"1.00"`.
pub fn format_fiat(amount: Decimal) -> String {
	let mut rounded = round_for_display(amount, FIAT_DISPLAY_DECIMALS);
	rounded.rescale(FIAT_DISPLAY_DECIMALS);
	rounded.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::str::FromStr;

	#[test]
	fn formats_base_units_exactly() {
		assert_eq!(format_token_amount(1_500_000, 6), "1.500000");
		assert_eq!(format_token_amount(42, 6), "0.000042");
		assert_eq!(format_token_amount(0, 2), "0.00");
		assert_eq!(format_token_amount(7, 0), "7");
		assert_eq!(
			format_token_amount(u128::MAX, 24),
			"340282366920938.463463374607431768211455"
		);
	}

	#[test]
	fn display_rounding_is_bankers() {
		let amount = Decimal::from_str("1.005").unwrap();
		assert_eq!(format_fiat(amount), "1.00");
		assert_eq!(format_fiat(Decimal::from_str("1.015").unwrap()), "1.02");
		assert_eq!(format_fiat(Decimal::from_str("2").unwrap()), "2.00");
	}

	#[test]
	fn display_rounding_is_idempotent() {
		for raw in ["0.125", "9.995", "1.0049999", "123456.785"] {
			let amount = Decimal::from_str(raw).unwrap();
			let once = round_for_display(amount, FIAT_DISPLAY_DECIMALS);
			assert_eq!(round_for_display(once, FIAT_DISPLAY_DECIMALS), once);
		}
	}
}
