//!
//! TronGrid REST client for the alternative account-based network.
//!
//! Unlike Etherscan, TronGrid uses plain HTTP status codes: 429 means throttled, any other
//! non-2xx status is a provider failure. Token balances come back as a list of single-entry
//! `{contract: amount}` maps that has to be scanned.

use super::retry::{RetryPolicy, retry_with_policy};
use super::types::*;
use crate::registry::Network;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "TronGrid";

#[derive(Debug, Deserialize)]
struct Page<T> {
	#[serde(default = "Vec::new")]
	data: Vec<T>,
	#[serde(default)]
	meta: Meta,
}

/// Paging cursor; `fingerprint` is present while more rows remain.
#[derive(Debug, Default, Deserialize)]
struct Meta {
	#[serde(default)]
	fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
	#[serde(default)]
	address: Option<String>,
}

/// One row from `/v1/accounts/{address}/transactions/trc20`.
#[derive(Debug, Deserialize)]
struct TokenTransfer {
	transaction_id: String,
	#[serde(default)]
	from: String,
	#[serde(default)]
	to: String,
	#[serde(default)]
	value: Option<String>,
	#[serde(default)]
	block_timestamp: i64,
	#[serde(default)]
	block: Option<u64>,
	#[serde(default)]
	token_info: Option<TokenInfo>,
}

impl TokenTransfer {
	fn normalize(self) -> Result<RawTransaction, ProviderError> {
		let timestamp = timestamp_millis(self.block_timestamp, &self.transaction_id)?;
		let value = self.value.unwrap_or_else(|| "0".to_string());
		validate_amount(PROVIDER, &value)?;

		Ok(RawTransaction {
			hash: self.transaction_id,
			from: self.from,
			to: self.to,
			value,
			timestamp,
			block_number: self.block.unwrap_or(0),
			gas_used: None,
			gas_price: None,
			failed: false,
			contract: self.token_info.and_then(|info| info.address),
		})
	}
}

/// One row from `/v1/accounts/{address}/transactions` requested with `visible=true`.
#[derive(Debug, Deserialize)]
struct NativeTransaction {
	#[serde(rename = "txID")]
	tx_id: String,
	#[serde(default, rename = "blockNumber")]
	block_number: Option<u64>,
	#[serde(default)]
	block_timestamp: i64,
	#[serde(default)]
	ret: Vec<ContractResult>,
	#[serde(default)]
	raw_data: RawData,
}

#[derive(Debug, Deserialize)]
struct ContractResult {
	#[serde(default, rename = "contractRet")]
	contract_ret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawData {
	#[serde(default)]
	contract: Vec<Contract>,
}

#[derive(Debug, Deserialize)]
struct Contract {
	#[serde(default, rename = "type")]
	kind: String,
	#[serde(default)]
	parameter: Option<Parameter>,
}

#[derive(Debug, Deserialize)]
struct Parameter {
	#[serde(default)]
	value: TransferValue,
}

#[derive(Debug, Default, Deserialize)]
struct TransferValue {
	#[serde(default)]
	amount: Option<u64>,
	#[serde(default)]
	owner_address: String,
	#[serde(default)]
	to_address: String,
}

impl NativeTransaction {
	/// The TRX transfer carried by this transaction, if it is one.
	fn normalize(self) -> Result<Option<RawTransaction>, ProviderError> {
		let Some(contract) = self.raw_data.contract.into_iter().next() else {
			return Ok(None);
		};
		if contract.kind != "TransferContract" {
			return Ok(None);
		}
		let value = contract.parameter.map(|p| p.value).unwrap_or_default();
		let timestamp = timestamp_millis(self.block_timestamp, &self.tx_id)?;
		let failed = self
			.ret
			.first()
			.and_then(|ret| ret.contract_ret.as_deref())
			.is_some_and(|ret| ret != "SUCCESS");

		Ok(Some(RawTransaction {
			hash: self.tx_id,
			from: value.owner_address,
			to: value.to_address,
			value: value.amount.unwrap_or(0).to_string(),
			timestamp,
			block_number: self.block_number.unwrap_or(0),
			gas_used: None,
			gas_price: None,
			failed,
			contract: None,
		}))
	}
}

fn timestamp_millis(millis: i64, hash: &str) -> Result<DateTime<Utc>, ProviderError> {
	DateTime::from_timestamp_millis(millis)
		.ok_or_else(|| ProviderError::Malformed(format!("block_timestamp out of range on {hash}")))
}

/// Account object from `/v1/accounts/{address}`.
#[derive(Debug, Deserialize)]
struct Account {
	#[serde(default)]
	balance: Option<Value>,
	#[serde(default)]
	trc20: Vec<HashMap<String, String>>,
}

impl Account {
	fn native_balance(&self) -> String {
		match &self.balance {
			Some(Value::Number(n)) => n.to_string(),
			Some(Value::String(s)) if !s.is_empty() => s.clone(),
			_ => "0".to_string(),
		}
	}

	/// Scan the token-balance pairs for `contract`, defaulting to zero.
	fn token_balance(&self, contract: &str) -> String {
		self.trc20
			.iter()
			.find_map(|entry| entry.get(contract))
			.cloned()
			.unwrap_or_else(|| "0".to_string())
	}
}

/// TronGrid adapter settings.
#[derive(Debug, Clone)]
pub struct TronGridConfig {
	pub api_key: Option<String>,
	pub base_url: String,
	/// Rows requested per call (`limit`).
	pub page_size: u32,
	/// Upper bound on history pages fetched per wallet and call.
	pub max_pages: u32,
	pub batch: BatchPolicy,
	pub retry: RetryPolicy,
}

impl Default for TronGridConfig {
	fn default() -> Self {
		Self {
			api_key: None,
			base_url: "https://api.trongrid.io".to_string(),
			page_size: 50,
			max_pages: 10,
			batch: BatchPolicy::new(4, Duration::from_millis(250)),
			retry: RetryPolicy::default(),
		}
	}
}

/// TronGrid REST client
#[derive(Clone)]
pub struct TronGridProvider {
	http_client: Client,
	config: TronGridConfig,
}

impl TronGridProvider {
	pub fn new(config: TronGridConfig) -> Result<Self, ProviderError> {
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
			.ok_or(ProviderError::MissingApiKey("TRONGRID_API_KEY"))
	}

	/// GET a TronGrid path, retrying on HTTP 429.
	async fn get_json<T: DeserializeOwned>(
		&self,
		path: &str,
		query: &[(&str, String)],
	) -> Result<T, ProviderError> {
		let api_key = self.api_key()?;
		let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

		retry_with_policy(self.config.retry, ProviderError::is_retryable, || async {
			let response = self
				.http_client
				.get(&url)
				.header("TRON-PRO-API-KEY", api_key)
				.query(query)
				.send()
				.await?;

			let status = response.status();
			if status.as_u16() == 429 {
				return Err(ProviderError::RateLimited(format!(
					"{PROVIDER}: Rate limit exceeded"
				)));
			}
			if !status.is_success() {
				return Err(ProviderError::HttpStatus {
					provider: PROVIDER,
					status: status.as_u16(),
				});
			}

			Ok(response.json::<T>().await?)
		})
		.await
	}

	/// Follow `meta.fingerprint` across pages until a short page, no cursor, or `max_pages`.
	async fn collect_pages<T: DeserializeOwned>(
		&self,
		path: &str,
		mut query: Vec<(&'static str, String)>,
	) -> Result<Vec<T>, ProviderError> {
		let limit = self.config.page_size.max(1);
		query.push(("limit", limit.to_string()));

		let mut rows = Vec::new();
		for page in 1..=self.config.max_pages.max(1) {
			let batch: Page<T> = self.get_json(path, &query).await?;
			debug!("{} {} page {} returned {} rows", PROVIDER, path, page, batch.data.len());
			let full = batch.data.len() >= limit as usize;
			rows.extend(batch.data);

			match batch.meta.fingerprint {
				Some(fingerprint) if full => {
					query.retain(|(key, _)| *key != "fingerprint");
					query.push(("fingerprint", fingerprint));
				}
				_ => break,
			}
		}
		Ok(rows)
	}
}

#[async_trait::async_trait]
impl ChainProvider for TronGridProvider {
	fn network(&self) -> Network {
		Network::Trc20
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

	/// TRC20 transfers of `contract`, or native TRX transfers when it is `None`.
	async fn fetch_transactions(
		&self,
		address: &str,
		contract: Option<&str>,
	) -> Result<Vec<RawTransaction>, ProviderError> {
		let order = ("order_by", "block_timestamp,desc".to_string());
		let transfers: Vec<RawTransaction> = match contract {
			Some(contract) => {
				let rows: Vec<TokenTransfer> = self
					.collect_pages(
						&format!("/v1/accounts/{address}/transactions/trc20"),
						vec![order, ("contract_address", contract.to_string())],
					)
					.await?;
				rows.into_iter()
					.map(TokenTransfer::normalize)
					.collect::<Result<_, _>>()?
			}
			None => {
				let rows: Vec<NativeTransaction> = self
					.collect_pages(
						&format!("/v1/accounts/{address}/transactions"),
						vec![order, ("visible", "true".to_string())],
					)
					.await?;
				rows.into_iter()
					.map(NativeTransaction::normalize)
					.filter_map(Result::transpose)
					.collect::<Result<_, _>>()?
			}
		};
		debug!("{} returned {} transfers for {}", PROVIDER, transfers.len(), address);
		Ok(transfers)
	}

	async fn fetch_balance(
		&self,
		address: &str,
		contract: Option<&str>,
	) -> Result<String, ProviderError> {
		let page: Page<Account> = self
			.get_json(&format!("/v1/accounts/{address}"), &[])
			.await?;

		let balance = match (page.data.first(), contract) {
			(None, _) => "0".to_string(),
			(Some(account), Some(contract)) => account.token_balance(contract),
			(Some(account), None) => account.native_balance(),
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

	const WALLET: &str = "TXYZwallet";
	const USDT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

	fn provider(server: &mockito::ServerGuard) -> TronGridProvider {
		TronGridProvider::new(TronGridConfig {
			api_key: Some("tron-key".to_string()),
			base_url: server.url(),
			retry: RetryPolicy {
				max_retries: 2,
				base_delay: Duration::from_millis(1),
			},
			..TronGridConfig::default()
		})
		.unwrap()
	}

	#[tokio::test]
	async fn fetches_trc20_transfers_with_key_header() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("GET", format!("/v1/accounts/{WALLET}/transactions/trc20").as_str())
			.match_header("TRON-PRO-API-KEY", "tron-key")
			.match_query(Matcher::AllOf(vec![
				Matcher::UrlEncoded("contract_address".into(), USDT.into()),
				Matcher::UrlEncoded("order_by".into(), "block_timestamp,desc".into()),
			]))
			.with_body(
				json!({
					"data": [{
						"transaction_id": "abc123",
						"from": "TSender",
						"to": WALLET,
						"value": "2500000",
						"block_timestamp": 1700000000123i64,
						"token_info": {"symbol": "USDT", "decimals": 6, "address": USDT},
						"type": "Transfer"
					}],
					"success": true
				})
				.to_string(),
			)
			.create_async()
			.await;

		let txs = provider(&server)
			.fetch_transactions(WALLET, Some(USDT))
			.await
			.unwrap();
		mock.assert_async().await;

		assert_eq!(txs.len(), 1);
		assert_eq!(txs[0].hash, "abc123");
		assert_eq!(txs[0].value, "2500000");
		assert_eq!(txs[0].timestamp.timestamp_millis(), 1_700_000_000_123);
		assert_eq!(txs[0].block_number, 0);
		assert_eq!(txs[0].contract.as_deref(), Some(USDT));
		assert!(txs[0].gas_used.is_none());
	}

	fn trx_transfer(id: &str, kind: &str, result: &str) -> Value {
		json!({
			"txID": id,
			"blockNumber": 56000000,
			"block_timestamp": 1700000000000i64,
			"ret": [{"contractRet": result, "fee": 1100000}],
			"raw_data": {
				"contract": [{
					"type": kind,
					"parameter": {
						"value": {"amount": 15000000, "owner_address": "TSender", "to_address": WALLET},
						"type_url": "type.googleapis.com/protocol.TransferContract"
					}
				}]
			}
		})
	}

	#[tokio::test]
	async fn native_history_keeps_trx_transfers_only() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("GET", format!("/v1/accounts/{WALLET}/transactions").as_str())
			.match_query(Matcher::UrlEncoded("visible".into(), "true".into()))
			.with_body(
				json!({
					"data": [
						trx_transfer("t1", "TransferContract", "SUCCESS"),
						trx_transfer("t2", "TriggerSmartContract", "SUCCESS"),
						trx_transfer("t3", "TransferContract", "OUT_OF_ENERGY")
					],
					"success": true,
					"meta": {"page_size": 3}
				})
				.to_string(),
			)
			.create_async()
			.await;

		let txs = provider(&server).fetch_transactions(WALLET, None).await.unwrap();
		mock.assert_async().await;

		let hashes: Vec<_> = txs.iter().map(|tx| tx.hash.as_str()).collect();
		assert_eq!(hashes, vec!["t1", "t3"]);
		assert_eq!(txs[0].value, "15000000");
		assert_eq!(txs[0].from, "TSender");
		assert_eq!(txs[0].to, WALLET);
		assert_eq!(txs[0].block_number, 56_000_000);
		assert!(txs[0].contract.is_none());
		assert!(!txs[0].failed);
		assert!(txs[1].failed);
	}

	#[tokio::test]
	async fn follows_the_fingerprint_cursor() {
		let mut server = mockito::Server::new_async().await;
		let path = format!("/v1/accounts/{WALLET}/transactions/trc20");
		let row = |id: &str| {
			json!({
				"transaction_id": id,
				"from": "TSender",
				"to": WALLET,
				"value": "1",
				"block_timestamp": 1700000000000i64,
				"token_info": {"address": USDT}
			})
		};
		let first = server
			.mock("GET", path.as_str())
			.match_query(Matcher::UrlEncoded("limit".into(), "2".into()))
			.with_body(
				json!({"data": [row("a"), row("b")], "meta": {"fingerprint": "cursor-2"}})
					.to_string(),
			)
			.expect(1)
			.create_async()
			.await;
		let second = server
			.mock("GET", path.as_str())
			.match_query(Matcher::UrlEncoded("fingerprint".into(), "cursor-2".into()))
			.with_body(json!({"data": [row("c")], "meta": {}}).to_string())
			.expect(1)
			.create_async()
			.await;

		let provider = TronGridProvider::new(TronGridConfig {
			page_size: 2,
			..provider(&server).config
		})
		.unwrap();
		let txs = provider.fetch_transactions(WALLET, Some(USDT)).await.unwrap();
		first.assert_async().await;
		second.assert_async().await;

		let hashes: Vec<_> = txs.iter().map(|tx| tx.hash.as_str()).collect();
		assert_eq!(hashes, vec!["a", "b", "c"]);
	}

	#[tokio::test]
	async fn token_balance_scans_pairs_and_defaults_to_zero() {
		let mut server = mockito::Server::new_async().await;
		server
			.mock("GET", format!("/v1/accounts/{WALLET}").as_str())
			.with_body(
				json!({
					"data": [{
						"balance": 1234,
						"trc20": [{"TOtherToken": "5"}, {USDT: "9900000"}]
					}]
				})
				.to_string(),
			)
			.expect_at_least(1)
			.create_async()
			.await;

		let provider = provider(&server);
		assert_eq!(provider.fetch_balance(WALLET, Some(USDT)).await.unwrap(), "9900000");
		assert_eq!(provider.fetch_balance(WALLET, Some("TMissing")).await.unwrap(), "0");
		assert_eq!(provider.fetch_balance(WALLET, None).await.unwrap(), "1234");
	}

	#[tokio::test]
	async fn unknown_account_has_zero_balance() {
		let mut server = mockito::Server::new_async().await;
		server
			.mock("GET", format!("/v1/accounts/{WALLET}").as_str())
			.with_body(r#"{"data": [], "success": true}"#)
			.create_async()
			.await;

		assert_eq!(
			provider(&server).fetch_balance(WALLET, Some(USDT)).await.unwrap(),
			"0"
		);
	}

	#[tokio::test]
	async fn http_429_is_retried_then_rate_limited() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("GET", format!("/v1/accounts/{WALLET}").as_str())
			.with_status(429)
			.expect(3)
			.create_async()
			.await;

		let err = provider(&server).fetch_balance(WALLET, None).await.unwrap_err();
		mock.assert_async().await;
		assert!(matches!(err, ProviderError::RateLimited(_)));
	}

	#[tokio::test]
	async fn other_statuses_fail_without_retry() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("GET", format!("/v1/accounts/{WALLET}").as_str())
			.with_status(500)
			.expect(1)
			.create_async()
			.await;

		let err = provider(&server).fetch_balance(WALLET, None).await.unwrap_err();
		mock.assert_async().await;
		assert_eq!(err.to_string(), "TronGrid: HTTP 500");
	}

	#[tokio::test]
	async fn missing_key_is_a_configuration_error() {
		let provider = TronGridProvider::new(TronGridConfig::default()).unwrap();
		let err = provider.fetch_transactions(WALLET, Some(USDT)).await.unwrap_err();
		assert!(err.is_configuration());
	}
}
