//! Exact conversion between human decimal amounts and base-unit integers.
//!
//! Chain amounts are unsigned 128-bit integers counted in the token's smallest unit
//! (yoctoNEAR for the native coin). Human amounts are `rust_decimal::Decimal` values.
//! Every conversion here works on integer mantissas so no intermediate value is
//! ever rounded except at the single, explicit half-to-even step.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Largest mantissa a `Decimal` can carry (2^96 - 1).
const MAX_DECIMAL_MANTISSA: u128 = (1u128 << 96) - 1;
/// Largest scale a `Decimal` can carry.
const MAX_DECIMAL_SCALE: u32 = 28;

/// Coins the wallet knows the decimal exponent of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoinType {
    Null,
    Near,
    Bitcoin,
}

impl CoinType {
    /// Decimal exponent of the coin's smallest unit.
    pub fn exponent(&self) -> u32 {
        match self {
            CoinType::Near => 24,
            CoinType::Bitcoin => 12,
            CoinType::Null => 0,
        }
    }

    /// Ticker used by the backend API.
    pub fn as_str(&self) -> &'static str {
        match self {
            CoinType::Near => "NEAR",
            CoinType::Bitcoin => "BITCOIN",
            CoinType::Null => "NULL",
        }
    }
}

/// Errors raised by amount conversions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("Amount must not be negative: {0}")]
    Negative(Decimal),

    #[error("Invalid base-unit literal: {0:?}")]
    Parse(String),

    #[error("Amount does not fit the target representation")]
    Overflow,

    #[error("Exchange rate must be positive: {0}")]
    InvalidRate(Decimal),
}

/// Converter for a token with a fixed decimal exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedPointConverter {
    exponent: u32,
}

impl FixedPointConverter {
    pub const fn new(exponent: u32) -> Self {
        Self { exponent }
    }

    pub fn for_coin(coin: CoinType) -> Self {
        Self::new(coin.exponent())
    }

    pub fn exponent(&self) -> u32 {
        self.exponent
    }

    /// Convert a human amount to base units, rounding half-to-even.
    pub fn to_base_units(&self, human: Decimal) -> Result<u128, ConversionError> {
        let (mantissa, scale) = non_negative_parts(human)?;

        match self.exponent.cmp(&scale) {
            Ordering::Less => Ok(match pow10(scale - self.exponent) {
                Some(divisor) => div_round_half_even(mantissa, divisor),
                // divisor exceeds u128, the quotient is far below one half
                None => 0,
            }),
            _ => pow10(self.exponent - scale)
                .and_then(|multiplier| mantissa.checked_mul(multiplier))
                .ok_or(ConversionError::Overflow),
        }
    }

    /// Parse a base-10 integer literal that a source already reports in base units.
    pub fn parse_base_units(&self, raw: &str) -> Result<u128, ConversionError> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConversionError::Parse(raw.to_string()));
        }
        raw.parse::<u128>().map_err(|_| ConversionError::Overflow)
    }

    /// Exact division of base units by 10^exponent. No rounding is applied.
    pub fn to_human(&self, base_units: u128) -> Result<Decimal, ConversionError> {
        let mut mantissa = base_units;
        let mut scale = self.exponent;

        // Trailing zeros can be folded into the scale without losing anything.
        while (mantissa > MAX_DECIMAL_MANTISSA || scale > MAX_DECIMAL_SCALE)
            && scale > 0
            && mantissa % 10 == 0
        {
            mantissa /= 10;
            scale -= 1;
        }

        if mantissa > MAX_DECIMAL_MANTISSA || scale > MAX_DECIMAL_SCALE {
            return Err(ConversionError::Overflow);
        }

        Decimal::try_from_i128_with_scale(mantissa as i128, scale)
            .map_err(|_| ConversionError::Overflow)
    }

    /// Parse a base-unit literal and convert it to a human amount.
    pub fn to_human_str(&self, raw: &str) -> Result<Decimal, ConversionError> {
        self.to_human(self.parse_base_units(raw)?)
    }

    /// Base units worth `fiat` at `rate` fiat per whole token.
    ///
    /// Computes `fiat / rate * 10^exponent` as an exact rational and rounds once,
    /// half-to-even.
    pub fn fiat_to_base_units(&self, fiat: Decimal, rate: Decimal) -> Result<u128, ConversionError> {
        let (numerator, fiat_scale) = non_negative_parts(fiat)?;
        if rate.is_sign_negative() || rate.is_zero() {
            return Err(ConversionError::InvalidRate(rate));
        }
        let denominator = rate.mantissa().unsigned_abs();

        // fiat / rate * 10^e == numerator * 10^(e + rate_scale - fiat_scale) / denominator
        let shift = self.exponent as i64 + rate.scale() as i64 - fiat_scale as i64;

        if shift < 0 {
            return Ok(match pow10(shift.unsigned_abs() as u32)
                .and_then(|p| denominator.checked_mul(p))
            {
                Some(divisor) => div_round_half_even(numerator, divisor),
                None => 0,
            });
        }

        // Long division one decimal digit at a time. The remainder always stays
        // below the 96-bit denominator, so `remainder * 10` never overflows.
        let mut quotient = numerator / denominator;
        let mut remainder = numerator % denominator;
        for _ in 0..shift {
            let widened = remainder * 10;
            quotient = quotient
                .checked_mul(10)
                .and_then(|q| q.checked_add(widened / denominator))
                .ok_or(ConversionError::Overflow)?;
            remainder = widened % denominator;
        }

        round_half_even(quotient, remainder, denominator)
    }

    /// Fiat value of a human amount.
    pub fn to_fiat(&self, amount: Decimal, rate: Decimal) -> Result<Decimal, ConversionError> {
        amount.checked_mul(rate).ok_or(ConversionError::Overflow)
    }
}

impl From<CoinType> for FixedPointConverter {
    fn from(coin: CoinType) -> Self {
        Self::for_coin(coin)
    }
}

fn non_negative_parts(value: Decimal) -> Result<(u128, u32), ConversionError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ConversionError::Negative(value));
    }
    Ok((value.mantissa().unsigned_abs(), value.scale()))
}

fn pow10(exp: u32) -> Option<u128> {
    10u128.checked_pow(exp)
}

fn div_round_half_even(numerator: u128, divisor: u128) -> u128 {
    let quotient = numerator / divisor;
    let remainder = numerator % divisor;
    // quotient < u128::MAX whenever divisor > 1, so the increment cannot overflow
    round_half_even(quotient, remainder, divisor).unwrap_or(quotient)
}

fn round_half_even(quotient: u128, remainder: u128, divisor: u128) -> Result<u128, ConversionError> {
    let round_up = match remainder.cmp(&(divisor - remainder)) {
        Ordering::Greater => true,
        Ordering::Equal => quotient % 2 == 1,
        Ordering::Less => false,
    };
    if round_up {
        quotient.checked_add(1).ok_or(ConversionError::Overflow)
    } else {
        Ok(quotient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    const NEAR: FixedPointConverter = FixedPointConverter::new(24);

    #[test]
    fn converts_whole_and_fractional_near() {
        assert_eq!(NEAR.to_base_units(dec("1")).unwrap(), 10u128.pow(24));
        assert_eq!(
            NEAR.to_base_units(dec("5.05")).unwrap(),
            5_050_000_000_000_000_000_000_000
        );
        assert_eq!(NEAR.to_base_units(Decimal::ZERO).unwrap(), 0);
    }

    #[test]
    fn rounds_half_to_even_below_base_unit() {
        let six = FixedPointConverter::new(6);
        assert_eq!(six.to_base_units(dec("0.0000005")).unwrap(), 0);
        assert_eq!(six.to_base_units(dec("0.0000015")).unwrap(), 2);
        assert_eq!(six.to_base_units(dec("0.0000025")).unwrap(), 2);
        assert_eq!(six.to_base_units(dec("0.00000251")).unwrap(), 3);
        assert_eq!(FixedPointConverter::new(0).to_base_units(dec("2.5")).unwrap(), 2);
        assert_eq!(FixedPointConverter::new(0).to_base_units(dec("3.5")).unwrap(), 4);
    }

    #[test]
    fn rejects_negative_amounts() {
        assert_eq!(
            NEAR.to_base_units(dec("-0.1")),
            Err(ConversionError::Negative(dec("-0.1")))
        );
    }

    #[test]
    fn large_human_amounts_do_not_lose_precision() {
        // 10^9 NEAR is 10^33 yocto, beyond what a Decimal mantissa can hold
        let billion = dec("1000000000");
        assert_eq!(NEAR.to_base_units(billion).unwrap(), 10u128.pow(33));
        assert_eq!(NEAR.to_human(10u128.pow(33)).unwrap(), billion);
    }

    #[test]
    fn overflow_is_reported() {
        let huge = FixedPointConverter::new(38);
        assert_eq!(huge.to_base_units(dec("10")), Err(ConversionError::Overflow));
    }

    #[test]
    fn parses_base_unit_literals() {
        assert_eq!(
            NEAR.parse_base_units("2500000000000000000000").unwrap(),
            2_500_000_000_000_000_000_000
        );
        assert!(matches!(NEAR.parse_base_units(""), Err(ConversionError::Parse(_))));
        assert!(matches!(NEAR.parse_base_units("12a"), Err(ConversionError::Parse(_))));
        assert!(matches!(NEAR.parse_base_units("+12"), Err(ConversionError::Parse(_))));
        assert!(matches!(NEAR.parse_base_units("-1"), Err(ConversionError::Parse(_))));
        assert_eq!(
            NEAR.parse_base_units("340282366920938463463374607431768211456"),
            Err(ConversionError::Overflow)
        );
    }

    #[test]
    fn to_human_is_exact() {
        assert_eq!(NEAR.to_human_str("2500000000000000000000").unwrap(), dec("0.0025"));
        assert_eq!(NEAR.to_human_str("2500000000000000000000000").unwrap(), dec("2.5"));
        assert_eq!(NEAR.to_human(1).unwrap(), dec("0.000000000000000000000001"));
        assert_eq!(NEAR.to_human(u128::MAX - 5).unwrap_err(), ConversionError::Overflow);
    }

    #[test]
    fn fiat_conversion_divides_before_rounding() {
        // 10 USD at 3 USD/NEAR is 3.333.. NEAR
        let base = NEAR.fiat_to_base_units(dec("10"), dec("3")).unwrap();
        assert_eq!(base, 3_333_333_333_333_333_333_333_333);

        // 20 USD at 3 USD/NEAR rounds the trailing 6.66.. up
        let base = NEAR.fiat_to_base_units(dec("20"), dec("3")).unwrap();
        assert_eq!(base, 6_666_666_666_666_666_666_666_667);

        let btc = FixedPointConverter::for_coin(CoinType::Bitcoin);
        assert_eq!(btc.fiat_to_base_units(dec("1.5"), dec("0.5")).unwrap(), 3 * 10u128.pow(12));
    }

    #[test]
    fn fiat_conversion_rejects_bad_rates() {
        assert_eq!(
            NEAR.fiat_to_base_units(dec("1"), Decimal::ZERO),
            Err(ConversionError::InvalidRate(Decimal::ZERO))
        );
        assert!(NEAR.fiat_to_base_units(dec("1"), dec("-2")).is_err());
    }

    #[test]
    fn fiat_conversion_with_fine_fiat_scale() {
        let zero_exp = FixedPointConverter::new(0);
        assert_eq!(zero_exp.fiat_to_base_units(dec("0.0000000001"), dec("3")).unwrap(), 0);
        assert_eq!(zero_exp.fiat_to_base_units(dec("7.5"), dec("1")).unwrap(), 8);
    }

    #[test]
    fn fiat_value() {
        assert_eq!(NEAR.to_fiat(dec("2.5"), dec("3.1")).unwrap(), dec("7.75"));
    }

    proptest! {
        #[test]
        fn round_trip_is_exact_when_scale_fits(mantissa in 0u64..1_000_000_000_000, scale in 0u32..=12) {
            let converter = FixedPointConverter::new(24);
            let human = Decimal::from_i128_with_scale(mantissa as i128, scale);
            let base = converter.to_base_units(human).unwrap();
            prop_assert_eq!(converter.to_human(base).unwrap(), human);
        }

        #[test]
        fn round_trip_rounds_half_even_when_scale_exceeds_exponent(mantissa in 0u64..10_000_000_000_000, scale in 7u32..=10) {
            let converter = FixedPointConverter::new(6);
            let human = Decimal::from_i128_with_scale(mantissa as i128, scale);
            let back = converter.to_human(converter.to_base_units(human).unwrap()).unwrap();
            prop_assert_eq!(
                back,
                human.round_dp_with_strategy(6, rust_decimal::RoundingStrategy::MidpointNearestEven)
            );
            prop_assert!((back - human).abs() <= Decimal::new(5, 7));
        }

        #[test]
        fn to_base_units_is_monotonic(a in 0u64..u64::MAX, b in 0u64..u64::MAX, scale in 0u32..=20) {
            let converter = FixedPointConverter::new(6);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo = converter.to_base_units(Decimal::from_i128_with_scale(lo as i128, scale)).unwrap();
            let hi = converter.to_base_units(Decimal::from_i128_with_scale(hi as i128, scale)).unwrap();
            prop_assert!(lo <= hi);
        }
    }
}
