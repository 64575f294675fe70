//!
//! Etherscan v2 client for the account/contract-model network.
//!
//! Etherscan answers almost everything with HTTP 200 and signals failure inside the JSON envelope
//! (`status`, `message`, `result`). The envelope is classified into data, a valid empty state,
//! throttling, or a hard provider failure before anything is normalized.

use super::retry::{RetryPolicy, retry_with_policy};
use super::types::*;
use crate::registry::Network;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "Etherscan";

/// Etherscan response envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
	#[serde(default)]
	status: String,
	#[serde(default)]
	message: String,
	#[serde(default)]
	result: Value,
}

/// What an envelope means once the status/message conventions are applied.
#[derive(Debug, PartialEq)]
enum Outcome {
	Data(Value),
	Empty,
	RateLimited(String),
	Failed(String),
}

impl Envelope {
	fn classify(self) -> Outcome {
		if self.status == "1" {
			return Outcome::Data(self.result);
		}

		let message = self.message.to_lowercase();
		let result_text = self.result.as_str().unwrap_or_default().to_lowercase();
		let detail = match self.result.as_str() {
			Some(text) if !text.is_empty() => text.to_string(),
			_ => self.message.clone(),
		};

		let throttled = message.contains("rate limit")
			|| result_text.contains("rate limit")
			|| message.contains("max calls")
			|| result_text.contains("max rate");
		if throttled {
			return Outcome::RateLimited(detail);
		}

		if message.contains("no transactions") || result_text.contains("no transactions") {
			return Outcome::Empty;
		}

		if detail.is_empty() {
			Outcome::Failed("Unknown error".to_string())
		} else {
			Outcome::Failed(detail)
		}
	}
}

/// One `tokentx` or `txlist` row as Etherscan returns it (every field is a string).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferRow {
	hash: String,
	#[serde(default)]
	from: String,
	#[serde(default)]
	to: String,
	#[serde(default)]
	value: String,
	time_stamp: String,
	block_number: String,
	#[serde(default)]
	gas_used: Option<String>,
	#[serde(default)]
	gas_price: Option<String>,
	#[serde(default)]
	is_error: Option<String>,
	#[serde(default)]
	contract_address: Option<String>,
}

impl TransferRow {
	fn normalize(self) -> Result<RawTransaction, ProviderError> {
		let seconds: i64 = self.time_stamp.parse().map_err(|_| {
			ProviderError::Malformed(format!("bad timeStamp '{}' on {}", self.time_stamp, self.hash))
		})?;
		let timestamp = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
			ProviderError::Malformed(format!("timeStamp out of range on {}", self.hash))
		})?;
		let block_number = self.block_number.parse().map_err(|_| {
			ProviderError::Malformed(format!(
				"bad blockNumber '{}' on {}",
				self.block_number, self.hash
			))
		})?;
		validate_amount(PROVIDER, &self.value)?;

		Ok(RawTransaction {
			hash: self.hash,
			from: self.from,
			to: self.to,
			value: self.value,
			timestamp,
			block_number,
			gas_used: self.gas_used.filter(|g| !g.is_empty()),
			gas_price: self.gas_price.filter(|g| !g.is_empty()),
			failed: self.is_error.as_deref().is_some_and(|flag| flag != "0"),
			contract: self.contract_address.filter(|c| !c.is_empty()),
		})
	}
}

/// Etherscan adapter settings.
#[derive(Debug, Clone)]
pub struct EtherscanConfig {
	pub api_key: Option<String>,
	pub base_url: String,
	pub chain_id: u64,
	/// Rows requested per call (`offset`).
	pub page_size: u32,
	/// Upper bound on history pages fetched per wallet and call.
	pub max_pages: u32,
	pub batch: BatchPolicy,
	pub retry: RetryPolicy,
}

impl Default for EtherscanConfig {
	fn default() -> Self {
		Self {
			api_key: None,
			base_url: "https://api.etherscan.io/v2/api".to_string(),
			chain_id: 1,
			page_size: 100,
			max_pages: 10,
			// Free tier allows 5 calls per second.
			batch: BatchPolicy::new(4, Duration::from_millis(1000)),
			retry: RetryPolicy::default(),
		}
	}
}

/// Etherscan indexer client
#[derive(Clone)]
pub struct EtherscanProvider {
	http_client: Client,
	config: EtherscanConfig,
}

impl EtherscanProvider {
	/// Create a new Etherscan client.
	pub fn new(config: EtherscanConfig) -> Result<Self, ProviderError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;
		Ok(Self {
			http_client,
			config,
		})
	}

	fn api_key(&self) -> Result<&str, ProviderError> {
		self.config
			.api_key
			.as_deref()
			.filter(|key| !key.is_empty())
			.ok_or(ProviderError::MissingApiKey("ETHERSCAN_API_KEY"))
	}

	/// Execute one query with rate-limit retries and classify the envelope.
	async fn execute_query(&self, params: Vec<(&'static str, String)>) -> Result<Outcome, ProviderError> {
		let api_key = self.api_key()?.to_string();

		retry_with_policy(self.config.retry, ProviderError::is_retryable, || {
			let mut query = params.clone();
			query.push(("chainid", self.config.chain_id.to_string()));
			query.push(("apikey", api_key.clone()));
			async move {
				let response = self
					.http_client
					.get(&self.config.base_url)
					.query(&query)
					.send()
					.await?;

				let status = response.status();
				if status.as_u16() == 429 {
					return Err(ProviderError::RateLimited(format!("{PROVIDER}: HTTP 429")));
				}
				if !status.is_success() {
					return Err(ProviderError::HttpStatus {
						provider: PROVIDER,
						status: status.as_u16(),
					});
				}

				let envelope: Envelope = response.json().await?;
				match envelope.classify() {
					Outcome::RateLimited(detail) => Err(ProviderError::RateLimited(detail)),
					other => Ok(other),
				}
			}
		})
		.await
	}
}

#[async_trait::async_trait]
impl ChainProvider for EtherscanProvider {
	fn network(&self) -> Network {
		Network::Erc20
	}

	fn name(&self) -> &'static str {
		PROVIDER
	}

	fn batch_policy(&self) -> BatchPolicy {
		self.config.batch
	}

	fn ensure_configured(&self) -> Result<(), ProviderError> {
		self.api_key().map(|_| ())
	}

	/// Native transfers (`txlist`) when `contract` is `None`, token transfers (`tokentx`)
	/// otherwise, newest first. Pages are followed until a short page or `max_pages`.
	async fn fetch_transactions(
		&self,
		address: &str,
		contract: Option<&str>,
	) -> Result<Vec<RawTransaction>, ProviderError> {
		let action = if contract.is_some() { "tokentx" } else { "txlist" };
		let page_size = self.config.page_size.max(1);
		let mut transfers = Vec::new();

		for page in 1..=self.config.max_pages.max(1) {
			let mut params = vec![
				("module", "account".to_string()),
				("action", action.to_string()),
				("address", address.to_string()),
				("startblock", "0".to_string()),
				("endblock", "99999999".to_string()),
				("page", page.to_string()),
				("offset", page_size.to_string()),
				("sort", "desc".to_string()),
			];
			if let Some(contract) = contract {
				params.push(("contractaddress", contract.to_string()));
			}

			let rows = match self.execute_query(params).await? {
				Outcome::Data(Value::Array(rows)) => rows,
				Outcome::Data(Value::Null) | Outcome::Empty => break,
				Outcome::Data(other) => {
					return Err(ProviderError::Malformed(format!(
						"expected transfer list, got {other}"
					)));
				}
				Outcome::Failed(message) => {
					return Err(ProviderError::Api {
						provider: PROVIDER,
						message,
					});
				}
				Outcome::RateLimited(detail) => return Err(ProviderError::RateLimited(detail)),
			};
			debug!(
				"{} {} page {} returned {} rows for {}",
				PROVIDER,
				action,
				page,
				rows.len(),
				address
			);

			let full = rows.len() >= page_size as usize;
			for row in rows {
				let mut tx = serde_json::from_value::<TransferRow>(row)?.normalize()?;
				if contract.is_none() {
					// txlist sets contractAddress on contract creations
					tx.contract = None;
				}
				transfers.push(tx);
			}
			if !full {
				break;
			}
		}
		Ok(transfers)
	}

	async fn fetch_balance(
		&self,
		address: &str,
		contract: Option<&str>,
	) -> Result<String, ProviderError> {
		let action = if contract.is_some() { "tokenbalance" } else { "balance" };
		let mut params = vec![
			("module", "account".to_string()),
			("action", action.to_string()),
			("address", address.to_string()),
			("tag", "latest".to_string()),
		];
		if let Some(contract) = contract {
			params.push(("contractaddress", contract.to_string()));
		}

		let balance = match self.execute_query(params).await? {
			Outcome::Data(Value::String(balance)) => balance,
			Outcome::Data(Value::Number(balance)) => balance.to_string(),
			Outcome::Empty => "0".to_string(),
			Outcome::Data(other) => {
				return Err(ProviderError::Malformed(format!(
					"expected balance string, got {other}"
				)));
			}
			Outcome::Failed(message) => {
				return Err(ProviderError::Api {
					provider: PROVIDER,
					message,
				});
			}
			Outcome::RateLimited(detail) => return Err(ProviderError::RateLimited(detail)),
		};
		validate_amount(PROVIDER, &balance)?;
		Ok(balance)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mockito::Matcher;
	use serde_json::json;

	fn envelope(value: Value) -> Envelope {
		serde_json::from_value(value).unwrap()
	}

	fn provider(server: &mockito::ServerGuard, api_key: Option<&str>) -> EtherscanProvider {
		EtherscanProvider::new(EtherscanConfig {
			api_key: api_key.map(str::to_string),
			base_url: format!("{}/v2/api", server.url()),
			retry: RetryPolicy {
				max_retries: 2,
				base_delay: Duration::from_millis(1),
			},
			..EtherscanConfig::default()
		})
		.unwrap()
	}

	#[test]
	fn classifies_envelopes() {
		assert_eq!(
			envelope(json!({"status": "1", "message": "OK", "result": "42"})).classify(),
			Outcome::Data(json!("42"))
		);
		assert_eq!(
			envelope(json!({"status": "0", "message": "No transactions found", "result": []}))
				.classify(),
			Outcome::Empty
		);
		assert_eq!(
			envelope(json!({
				"status": "0",
				"message": "NOTOK",
				"result": "Max rate limit reached, please use API Key for higher rate limit"
			}))
			.classify(),
			Outcome::RateLimited(
				"Max rate limit reached, please use API Key for higher rate limit".to_string()
			)
		);
		assert_eq!(
			envelope(json!({"status": "0", "message": "NOTOK", "result": "Invalid address format"}))
				.classify(),
			Outcome::Failed("Invalid address format".to_string())
		);
		assert_eq!(
			envelope(json!({"status": "0", "message": "", "result": null})).classify(),
			Outcome::Failed("Unknown error".to_string())
		);
	}

	#[tokio::test]
	async fn missing_key_fails_before_any_request() {
		let mut server = mockito::Server::new_async().await;
		let untouched = server
			.mock("GET", Matcher::Any)
			.expect(0)
			.create_async()
			.await;

		let provider = provider(&server, None);
		let err = provider.fetch_transactions("0xabc", None).await.unwrap_err();
		assert!(err.is_configuration());
		assert!(provider.ensure_configured().is_err());
		untouched.assert_async().await;
	}

	#[tokio::test]
	async fn fetches_and_normalizes_transfers() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("GET", "/v2/api")
			.match_query(Matcher::AllOf(vec![
				Matcher::UrlEncoded("action".into(), "tokentx".into()),
				Matcher::UrlEncoded("address".into(), "0xwallet".into()),
				Matcher::UrlEncoded("contractaddress".into(), "0xtoken".into()),
				Matcher::UrlEncoded("sort".into(), "desc".into()),
				Matcher::UrlEncoded("apikey".into(), "key".into()),
				Matcher::UrlEncoded("chainid".into(), "1".into()),
			]))
			.with_body(
				json!({
					"status": "1",
					"message": "OK",
					"result": [{
						"hash": "0xhash",
						"from": "0xother",
						"to": "0xWALLET",
						"value": "1000000",
						"timeStamp": "1700000000",
						"blockNumber": "18000000",
						"gasUsed": "21000",
						"gasPrice": "30000000000",
						"contractAddress": "0xtoken"
					}]
				})
				.to_string(),
			)
			.create_async()
			.await;

		let txs = provider(&server, Some("key"))
			.fetch_transactions("0xwallet", Some("0xtoken"))
			.await
			.unwrap();
		mock.assert_async().await;

		assert_eq!(txs.len(), 1);
		let tx = &txs[0];
		assert_eq!(tx.hash, "0xhash");
		assert_eq!(tx.value, "1000000");
		assert_eq!(tx.block_number, 18_000_000);
		assert_eq!(tx.timestamp.timestamp(), 1_700_000_000);
		assert_eq!(tx.gas_used.as_deref(), Some("21000"));
		assert!(!tx.failed);
		assert_eq!(tx.contract.as_deref(), Some("0xtoken"));
	}

	fn native_row(hash: &str) -> Value {
		json!({
			"hash": hash,
			"from": "0xwallet",
			"to": "0xother",
			"value": "1000000000000000000",
			"timeStamp": "1700000000",
			"blockNumber": "18000000",
			"gasUsed": "21000",
			"gasPrice": "30000000000",
			"isError": "0",
			"contractAddress": ""
		})
	}

	#[tokio::test]
	async fn native_history_uses_txlist() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("GET", "/v2/api")
			.match_query(Matcher::AllOf(vec![
				Matcher::UrlEncoded("action".into(), "txlist".into()),
				Matcher::UrlEncoded("address".into(), "0xwallet".into()),
			]))
			.with_body(
				json!({
					"status": "1",
					"message": "OK",
					"result": [native_row("0xeth"), {
						"hash": "0xdeploy",
						"from": "0xwallet",
						"to": "",
						"value": "0",
						"timeStamp": "1700000100",
						"blockNumber": "18000001",
						"isError": "1",
						"contractAddress": "0xcreated"
					}]
				})
				.to_string(),
			)
			.create_async()
			.await;

		let txs = provider(&server, Some("key"))
			.fetch_transactions("0xwallet", None)
			.await
			.unwrap();
		mock.assert_async().await;

		assert_eq!(txs.len(), 2);
		assert_eq!(txs[0].value, "1000000000000000000");
		assert!(txs.iter().all(|tx| tx.contract.is_none()));
		assert!(!txs[0].failed);
		assert!(txs[1].failed);
	}

	#[tokio::test]
	async fn follows_pages_until_a_short_page() {
		let mut server = mockito::Server::new_async().await;
		let page = |n: &str| {
			Matcher::AllOf(vec![
				Matcher::UrlEncoded("action".into(), "txlist".into()),
				Matcher::UrlEncoded("page".into(), n.into()),
				Matcher::UrlEncoded("offset".into(), "2".into()),
			])
		};
		let first = server
			.mock("GET", "/v2/api")
			.match_query(page("1"))
			.with_body(
				json!({"status": "1", "message": "OK", "result": [native_row("0x1"), native_row("0x2")]})
					.to_string(),
			)
			.expect(1)
			.create_async()
			.await;
		let second = server
			.mock("GET", "/v2/api")
			.match_query(page("2"))
			.with_body(
				json!({"status": "1", "message": "OK", "result": [native_row("0x3")]}).to_string(),
			)
			.expect(1)
			.create_async()
			.await;
		let third = server
			.mock("GET", "/v2/api")
			.match_query(page("3"))
			.expect(0)
			.create_async()
			.await;

		let provider = EtherscanProvider::new(EtherscanConfig {
			page_size: 2,
			..provider(&server, Some("key")).config
		})
		.unwrap();
		let txs = provider.fetch_transactions("0xwallet", None).await.unwrap();
		first.assert_async().await;
		second.assert_async().await;
		third.assert_async().await;

		let hashes: Vec<_> = txs.iter().map(|tx| tx.hash.as_str()).collect();
		assert_eq!(hashes, vec!["0x1", "0x2", "0x3"]);
	}

	#[tokio::test]
	async fn page_cap_bounds_the_history() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("GET", "/v2/api")
			.match_query(Matcher::Any)
			.with_body(json!({"status": "1", "message": "OK", "result": [native_row("0x1")]}).to_string())
			.expect(3)
			.create_async()
			.await;

		let provider = EtherscanProvider::new(EtherscanConfig {
			page_size: 1,
			max_pages: 3,
			..provider(&server, Some("key")).config
		})
		.unwrap();
		let txs = provider.fetch_transactions("0xwallet", None).await.unwrap();
		mock.assert_async().await;
		assert_eq!(txs.len(), 3);
	}

	#[tokio::test]
	async fn no_transactions_is_an_empty_list() {
		let mut server = mockito::Server::new_async().await;
		server
			.mock("GET", "/v2/api")
			.match_query(Matcher::Any)
			.with_body(r#"{"status":"0","message":"No transactions found","result":[]}"#)
			.create_async()
			.await;

		let txs = provider(&server, Some("key"))
			.fetch_transactions("0xwallet", None)
			.await
			.unwrap();
		assert!(txs.is_empty());
	}

	#[tokio::test]
	async fn rate_limit_is_retried_then_surfaced() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("GET", "/v2/api")
			.match_query(Matcher::Any)
			.with_body(r#"{"status":"0","message":"NOTOK","result":"Max rate limit reached"}"#)
			.expect(3)
			.create_async()
			.await;

		let err = provider(&server, Some("key"))
			.fetch_balance("0xwallet", Some("0xtoken"))
			.await
			.unwrap_err();
		mock.assert_async().await;
		match err {
			ProviderError::RateLimited(message) => assert_eq!(message, "Max rate limit reached"),
			other => panic!("unexpected error: {other}"),
		}
	}

	#[tokio::test]
	async fn provider_failures_are_not_retried() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("GET", "/v2/api")
			.match_query(Matcher::Any)
			.with_body(r#"{"status":"0","message":"NOTOK","result":"Invalid API Key"}"#)
			.expect(1)
			.create_async()
			.await;

		let err = provider(&server, Some("key"))
			.fetch_balance("0xwallet", None)
			.await
			.unwrap_err();
		mock.assert_async().await;
		assert_eq!(err.to_string(), "Etherscan: Invalid API Key");
	}

	#[tokio::test]
	async fn reads_token_balance() {
		let mut server = mockito::Server::new_async().await;
		server
			.mock("GET", "/v2/api")
			.match_query(Matcher::AllOf(vec![
				Matcher::UrlEncoded("action".into(), "tokenbalance".into()),
				Matcher::UrlEncoded("tag".into(), "latest".into()),
			]))
			.with_body(r#"{"status":"1","message":"OK","result":"123456789"}"#)
			.create_async()
			.await;

		let balance = provider(&server, Some("key"))
			.fetch_balance("0xwallet", Some("0xtoken"))
			.await
			.unwrap();
		assert_eq!(balance, "123456789");
	}
}
