//!
//! Utility module for the wallet core.
//!
//! Exact amount conversion and the formatting helpers built on top of it.
/// Human <-> base-unit conversion
pub mod converter;
/// Formatting and display rounding
pub mod format;

pub use converter::{CoinType, ConversionError, FixedPointConverter};
pub use format::{format_fiat, format_token_amount, round_for_display};
