//! Types for the wallet backend API

use crate::utils::{
	ConversionError, FixedPointConverter, round_for_display,
	format::{FIAT_DISPLAY_DECIMALS, TOKEN_AMOUNT_DECIMALS},
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Symbol of the native token entry in the token list.
pub const NATIVE_SYMBOL: &str = "NEAR";

/// One fungible token held by an account, as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FtOverviewToken {
	pub name: String,
	pub symbol: String,
	#[serde(default)]
	pub icon: String,
	pub contract_id: String,
	#[serde(default)]
	pub currency: i64,
	#[serde(default)]
	pub token_id: u64,
	#[serde(default)]
	pub description: String,
	/// Decimal places of the token's base unit.
	pub decimal: u32,
	/// Balance in whole tokens.
	pub amount: Decimal,
	pub usd_rate: Decimal,
	#[serde(default)]
	pub usd_rate_yesterday: Decimal,
}

impl FtOverviewToken {
	fn converter(&self) -> FixedPointConverter {
		FixedPointConverter::new(self.decimal)
	}

	pub fn is_native(&self) -> bool {
		self.symbol == NATIVE_SYMBOL
	}

	/// Balance in base units.
	pub fn value(&self) -> Result<u128, ConversionError> {
		self.converter().to_base_units(self.amount)
	}

	/// Balance in USD, rounded half-to-even to cents.
	pub fn fiat_amount(&self) -> Result<Decimal, ConversionError> {
		let fiat = self.converter().to_fiat(self.amount, self.usd_rate)?;
		Ok(round_for_display(fiat, FIAT_DISPLAY_DECIMALS))
	}

	/// Set the balance from base units, rounded half-to-even to six decimals.
	pub fn set_amount_from_base_units(&mut self, base_units: u128) -> Result<(), ConversionError> {
		let human = self.converter().to_human(base_units)?;
		self.amount = round_for_display(human, TOKEN_AMOUNT_DECIMALS);
		Ok(())
	}
}

/// Response of `GET /user/fts`.
#[derive(Debug, Clone, Deserialize)]
pub struct FungibleTokensResponse {
	pub fts: Vec<FtOverviewToken>,
}

/// Fiat exchange rate of a coin, as returned by `GET /rate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExchangeRate {
	pub rate: Decimal,
	#[serde(default)]
	pub yesterday_rate: Decimal,
}

/// Error types for backend requests
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Backend returned status {0}")]
	Status(u16),

	#[error("No data in response")]
	NoData,
}
