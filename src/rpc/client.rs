//!
//! JSON-RPC client for NEAR archival and regular RPC nodes.
//!
//! This module provides the `ChainReader` seam used by the sync engine and an async
//! implementation of it over HTTP. Only read-only queries live here; signing and
//! submitting transactions belongs to the external SDK behind `TransactionSubmitter`.

use super::types::*;
use async_trait::async_trait;
use backoff::{ExponentialBackoff, future::retry};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Read-only access to chain state.
#[async_trait]
pub trait ChainReader: Send + Sync {
	/// Fetch the account's chain state.
	async fn view_account(&self, account_id: &str) -> Result<ChainAccountView, RpcError>;

	/// Call a read-only contract method with JSON arguments and decode its JSON result.
	async fn view_function(
		&self,
		contract_id: &str,
		method_name: &str,
		args: serde_json::Value,
	) -> Result<serde_json::Value, RpcError>;

	/// Hash of the latest final block.
	async fn latest_block_hash(&self) -> Result<String, RpcError>;
}

/// Call a view function and deserialize its result into `T`.
pub async fn view_function_as<T: DeserializeOwned>(
	reader: &(impl ChainReader + ?Sized),
	contract_id: &str,
	method_name: &str,
	args: serde_json::Value,
) -> Result<T, RpcError> {
	let value = reader.view_function(contract_id, method_name, args).await?;
	Ok(serde_json::from_value(value)?)
}

/// NEAR JSON-RPC client
#[derive(Clone)]
pub struct NearRpcClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// The JSON-RPC endpoint.
	rpc_url: String,
	/// Upper bound on the time spent retrying transient failures.
	retry_max_elapsed: Duration,
}

impl NearRpcClient {
	/// Create a new RPC client.
	///
	/// # Arguments
	/// * `rpc_url` - The JSON-RPC endpoint, e.g. `https://rpc.mainnet.near.org`.
	/// * `timeout` - Per-request timeout.
	/// * `retry_max_elapsed` - Total time budget for retrying transient failures.
	pub fn new(
		rpc_url: String,
		timeout: Duration,
		retry_max_elapsed: Duration,
	) -> Result<Self, RpcError> {
		let http_client = Client::builder().timeout(timeout).build()?;

		Ok(Self {
			http_client,
			rpc_url,
			retry_max_elapsed,
		})
	}

	/// Execute a JSON-RPC call and return its `result` member.
	///
	/// Transport failures and 5xx responses are retried with exponential backoff;
	/// errors reported by the node itself are returned immediately.
	pub async fn execute_query(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Result<serde_json::Value, RpcError> {
		let request_body = json!({
			"jsonrpc": "2.0",
			"id": "dontcare",
			"method": method,
			"params": params,
		});

		let policy = ExponentialBackoff {
			max_elapsed_time: Some(self.retry_max_elapsed),
			..ExponentialBackoff::default()
		};

		let response_json: serde_json::Value = retry(policy, || async {
			let response = self
				.http_client
				.post(&self.rpc_url)
				.json(&request_body)
				.send()
				.await
				.map_err(|e| {
					warn!("RPC request {} failed to send: {}", method, e);
					backoff::Error::transient(RpcError::HttpError(e))
				})?;

			let status = response.status();
			if status.is_server_error() {
				warn!("RPC request {} returned {}", method, status);
				return Err(backoff::Error::transient(RpcError::RpcError(format!(
					"HTTP error: {}",
					status
				))));
			}
			if !status.is_success() {
				return Err(backoff::Error::permanent(RpcError::RpcError(format!(
					"HTTP error: {}",
					status
				))));
			}

			response
				.json::<serde_json::Value>()
				.await
				.map_err(|e| backoff::Error::permanent(RpcError::HttpError(e)))
		})
		.await?;

		if let Some(error) = response_json.get("error") {
			return Err(classify_rpc_error(error));
		}

		response_json
			.get("result")
			.cloned()
			.ok_or(RpcError::NoData)
	}
}

/// Map a JSON-RPC error object onto `RpcError`.
fn classify_rpc_error(error: &serde_json::Value) -> RpcError {
	let cause = error
		.get("cause")
		.and_then(|c| c.get("name"))
		.and_then(|n| n.as_str());

	if cause == Some("UNKNOWN_ACCOUNT") {
		let account = error
			.get("cause")
			.and_then(|c| c.get("info"))
			.and_then(|i| i.get("requested_account_id"))
			.and_then(|a| a.as_str())
			.unwrap_or_default();
		return RpcError::UnknownAccount(account.to_string());
	}

	RpcError::RpcError(format!("RPC errors: {}", error))
}

#[async_trait]
impl ChainReader for NearRpcClient {
	async fn view_account(&self, account_id: &str) -> Result<ChainAccountView, RpcError> {
		debug!("Fetching chain state for {}", account_id);

		let result = self
			.execute_query(
				"query",
				json!({
					"request_type": "view_account",
					"finality": "final",
					"account_id": account_id,
				}),
			)
			.await?;

		// Older nodes report unknown accounts inside `result.error`.
		if let Some(error) = result.get("error").and_then(|e| e.as_str()) {
			if error.contains("does not exist") {
				return Err(RpcError::UnknownAccount(account_id.to_string()));
			}
			return Err(RpcError::RpcError(error.to_string()));
		}

		Ok(serde_json::from_value(result)?)
	}

	async fn view_function(
		&self,
		contract_id: &str,
		method_name: &str,
		args: serde_json::Value,
	) -> Result<serde_json::Value, RpcError> {
		debug!("Calling view function {}::{}", contract_id, method_name);

		let args_base64 = BASE64.encode(serde_json::to_vec(&args)?);
		let result = self
			.execute_query(
				"query",
				json!({
					"request_type": "call_function",
					"finality": "final",
					"account_id": contract_id,
					"method_name": method_name,
					"args_base64": args_base64,
				}),
			)
			.await?;

		let call: CallFunctionResult = serde_json::from_value(result)?;
		if let Some(error) = call.error {
			return Err(RpcError::RpcError(error));
		}

		decode_call_result(&call.result)
	}

	async fn latest_block_hash(&self) -> Result<String, RpcError> {
		let result = self
			.execute_query("block", json!({ "finality": "final" }))
			.await?;
		let block: BlockView = serde_json::from_value(result)?;
		Ok(block.header.hash)
	}
}

/// Decode the raw bytes a view call returned as JSON.
fn decode_call_result(bytes: &[u8]) -> Result<serde_json::Value, RpcError> {
	if bytes.is_empty() {
		return Err(RpcError::NoData);
	}
	serde_json::from_slice(bytes)
		.map_err(|e| RpcError::DecodeError(format!("View result is not JSON: {}", e)))
}
