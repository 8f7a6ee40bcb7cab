//! Runtime configuration.
//!
//! Defaults point at the production network and wallet backend. Every field can be
//! overridden through an environment variable.

use crate::backend::DEFAULT_BACKEND_URL;
use crate::session::SessionConfig;
use crate::wallet::ReservePolicy;
use crate::wallet::sync::{DEFAULT_REWARDS_CONTRACT, EngineConfig};

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RPC_URL: &str = "https://rpc.mainnet.near.org";

/// Error types for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Invalid value for {name}: {value}")]
	InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
	/// JSON-RPC endpoint.
	pub rpc_url: String,
	/// Wallet backend base URL.
	pub backend_url: String,
	/// Contract holding the wrapped balance and rewards.
	pub rewards_contract: String,
	/// Time between balance session updates.
	pub refresh_interval: Duration,
	/// Per-request HTTP timeout.
	pub request_timeout: Duration,
	/// Total time spent retrying one transient HTTP failure.
	pub retry_max_elapsed: Duration,
	pub reserve: ReservePolicy,
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			rpc_url: DEFAULT_RPC_URL.to_string(),
			backend_url: DEFAULT_BACKEND_URL.to_string(),
			rewards_contract: DEFAULT_REWARDS_CONTRACT.to_string(),
			refresh_interval: Duration::from_secs(5),
			request_timeout: Duration::from_secs(30),
			retry_max_elapsed: Duration::from_secs(10),
			reserve: ReservePolicy::default(),
		}
	}
}

impl AppConfig {
	/// Defaults overridden by the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Defaults overridden by whatever `lookup` returns for each variable name.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let mut config = Self::default();

		if let Some(url) = lookup("NEAR_RPC_URL") {
			config.rpc_url = url;
		}
		if let Some(url) = lookup("HERE_BACKEND_URL") {
			config.backend_url = url;
		}
		if let Some(contract) = lookup("HERE_REWARDS_CONTRACT") {
			config.rewards_contract = contract;
		}
		if let Some(secs) = parse_var::<u64>(&lookup, "BALANCE_REFRESH_SECS")? {
			config.refresh_interval = Duration::from_secs(secs);
		}
		if let Some(secs) = parse_var::<u64>(&lookup, "REQUEST_TIMEOUT_SECS")? {
			config.request_timeout = Duration::from_secs(secs);
		}
		if let Some(secs) = parse_var::<u64>(&lookup, "RETRY_MAX_ELAPSED_SECS")? {
			config.retry_max_elapsed = Duration::from_secs(secs);
		}
		if let Some(bytes) = parse_var::<u64>(&lookup, "STORAGE_BYTES_PER_NEAR")? {
			if bytes == 0 {
				return Err(ConfigError::InvalidValue {
					name: "STORAGE_BYTES_PER_NEAR",
					value: bytes.to_string(),
				});
			}
			config.reserve.bytes_per_native_unit = bytes;
		}
		if let Some(buffer) = parse_var::<Decimal>(&lookup, "STORAGE_MIN_BUFFER")? {
			if buffer.is_sign_negative() {
				return Err(ConfigError::InvalidValue {
					name: "STORAGE_MIN_BUFFER",
					value: buffer.to_string(),
				});
			}
			config.reserve.minimum_buffer = buffer;
		}

		Ok(config)
	}

	pub fn engine_config(&self) -> EngineConfig {
		EngineConfig {
			rewards_contract: self.rewards_contract.clone(),
			reserve_policy: self.reserve.clone(),
		}
	}

	pub fn session_config(&self) -> SessionConfig {
		SessionConfig {
			refresh_interval: self.refresh_interval,
		}
	}
}

fn parse_var<T: FromStr>(
	lookup: &impl Fn(&str) -> Option<String>,
	name: &'static str,
) -> Result<Option<T>, ConfigError> {
	match lookup(name) {
		Some(value) => value
			.trim()
			.parse()
			.map(Some)
			.map_err(|_| ConfigError::InvalidValue { name, value }),
		None => Ok(None),
	}
}
