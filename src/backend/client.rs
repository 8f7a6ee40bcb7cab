//! HTTP client for the wallet backend.
//!
//! The backend lists the fungible tokens an account holds and quotes fiat exchange
//! rates. Both are plain `GET` endpoints returning JSON.

use super::types::*;
use crate::utils::CoinType;

use async_trait::async_trait;
use backoff::{ExponentialBackoff, future::retry};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Production backend endpoint.
pub const DEFAULT_BACKEND_URL: &str = "https://api.herewallet.app/api/v1";

/// Source of token lists and exchange rates.
#[async_trait]
pub trait TokenRegistry: Send + Sync {
	/// Tokens held by `account_id`, with balances and USD rates.
	async fn fungible_tokens(&self, account_id: &str) -> Result<Vec<FtOverviewToken>, BackendError>;

	/// Today's and yesterday's fiat rate of `coin`.
	async fn exchange_rate(&self, coin: CoinType) -> Result<ExchangeRate, BackendError>;
}

/// Wallet backend client
#[derive(Clone)]
pub struct HereBackendClient {
	http_client: Client,
	/// Base URL, without a trailing slash.
	base_url: String,
	retry_max_elapsed: Duration,
}

impl HereBackendClient {
	pub fn new(
		base_url: String,
		timeout: Duration,
		retry_max_elapsed: Duration,
	) -> Result<Self, BackendError> {
		let http_client = Client::builder().timeout(timeout).build()?;

		Ok(Self {
			http_client,
			base_url: base_url.trim_end_matches('/').to_string(),
			retry_max_elapsed,
		})
	}

	/// `GET {base_url}{path}` with query parameters, decoded as `T`.
	///
	/// Transport failures and 5xx responses are retried with exponential backoff.
	async fn get_json<T: DeserializeOwned>(
		&self,
		path: &str,
		query: &[(&str, &str)],
	) -> Result<T, BackendError> {
		let url = format!("{}{}", self.base_url, path);
		let policy = ExponentialBackoff {
			max_elapsed_time: Some(self.retry_max_elapsed),
			..ExponentialBackoff::default()
		};

		let body = retry(policy, || async {
			let response = self
				.http_client
				.get(&url)
				.query(query)
				.send()
				.await
				.map_err(|e| {
					warn!("Backend request {} failed to send: {}", path, e);
					backoff::Error::transient(BackendError::HttpError(e))
				})?;

			let status = response.status();
			if status.is_server_error() {
				warn!("Backend request {} returned {}", path, status);
				return Err(backoff::Error::transient(BackendError::Status(
					status.as_u16(),
				)));
			}
			if !status.is_success() {
				return Err(backoff::Error::permanent(BackendError::Status(
					status.as_u16(),
				)));
			}

			response
				.text()
				.await
				.map_err(|e| backoff::Error::permanent(BackendError::HttpError(e)))
		})
		.await?;

		if body.trim().is_empty() {
			return Err(BackendError::NoData);
		}
		Ok(serde_json::from_str(&body)?)
	}
}

#[async_trait]
impl TokenRegistry for HereBackendClient {
	async fn fungible_tokens(&self, account_id: &str) -> Result<Vec<FtOverviewToken>, BackendError> {
		debug!("Fetching token list for {}", account_id);
		let response: FungibleTokensResponse = self
			.get_json("/user/fts", &[("near_account_id", account_id)])
			.await?;
		debug!("Backend listed {} tokens for {}", response.fts.len(), account_id);
		Ok(response.fts)
	}

	async fn exchange_rate(&self, coin: CoinType) -> Result<ExchangeRate, BackendError> {
		debug!("Fetching {} exchange rate", coin.as_str());
		self.get_json("/rate", &[("currency", coin.as_str())]).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn trims_trailing_slash() {
		let client = HereBackendClient::new(
			"https://api.example.org/api/v1/".to_string(),
			Duration::from_secs(5),
			Duration::from_secs(5),
		)
		.unwrap();
		assert_eq!(client.base_url, "https://api.example.org/api/v1");
	}

	#[test]
	fn decodes_token_list() {
		let body = r#"{"fts":[{"name":"USD Coin","symbol":"USDC","contract_id":"usdc.near","decimal":6,"amount":12.5,"usd_rate":1}]}"#;
		let response: FungibleTokensResponse = serde_json::from_str(body).unwrap();
		assert_eq!(response.fts.len(), 1);
		assert_eq!(response.fts[0].value().unwrap(), 12_500_000);
		assert!(!response.fts[0].is_native());
	}
}
