//! Types shared by the chain indexer adapters

use crate::registry::Network;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A transfer as reported by an indexer, normalized across both providers.
///
/// Amounts stay as the provider's raw minor-unit decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
	/// Transaction hash (Etherscan `hash`, TronGrid `transaction_id`).
	pub hash: String,
	pub from: String,
	pub to: String,
	/// Unsigned minor-unit amount.
	pub value: String,
	pub timestamp: DateTime<Utc>,
	pub block_number: u64,
	/// Gas consumed, when the indexer exposes it.
	pub gas_used: Option<String>,
	/// Gas price in minor units, when the indexer exposes it.
	pub gas_price: Option<String>,
	/// Whether the indexer flagged the transaction as reverted.
	pub failed: bool,
	/// Token contract the transfer belongs to, if reported.
	pub contract: Option<String>,
}

/// Bounded fan-out settings tuned to a provider's published rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
	/// Number of calls issued concurrently in one window.
	pub batch_size: usize,
	/// Pause after each batch.
	pub delay: Duration,
}

impl BatchPolicy {
	pub fn new(batch_size: usize, delay: Duration) -> Self {
		Self {
			batch_size: batch_size.max(1),
			delay,
		}
	}
}

/// Error types for indexer adapters
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
	#[error("{0} not configured")]
	MissingApiKey(&'static str),

	#[error("Rate limit: {0}")]
	RateLimited(String),

	#[error("{provider}: {message}")]
	Api {
		provider: &'static str,
		message: String,
	},

	#[error("{provider}: HTTP {status}")]
	HttpStatus { provider: &'static str, status: u16 },

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Malformed response: {0}")]
	Malformed(String),
}

impl ProviderError {
	/// Only throttling is worth retrying; everything else fails the task immediately.
	pub fn is_retryable(&self) -> bool {
		matches!(self, ProviderError::RateLimited(_))
	}

	pub fn is_configuration(&self) -> bool {
		matches!(self, ProviderError::MissingApiKey(_))
	}
}

/// An external indexing API for one network.
#[async_trait::async_trait]
pub trait ChainProvider: Send + Sync {
	/// The network this provider indexes.
	fn network(&self) -> Network;

	/// Name used in logs and error messages.
	fn name(&self) -> &'static str;

	/// Fan-out settings the scheduler must respect for this provider.
	fn batch_policy(&self) -> BatchPolicy;

	/// Fails fast when the provider cannot be called at all (missing API key).
	fn ensure_configured(&self) -> Result<(), ProviderError>;

	/// Token transfers touching `address`, optionally restricted to one contract.
	/// Provider ordering (newest first) is preserved.
	async fn fetch_transactions(
		&self,
		address: &str,
		contract: Option<&str>,
	) -> Result<Vec<RawTransaction>, ProviderError>;

	/// Current on-chain balance as an unsigned minor-unit decimal string.
	/// `None` asks for the native balance.
	async fn fetch_balance(
		&self,
		address: &str,
		contract: Option<&str>,
	) -> Result<String, ProviderError>;
}

/// Check that a provider-supplied amount is a plain unsigned decimal integer.
pub(crate) fn validate_amount(provider: &'static str, amount: &str) -> Result<(), ProviderError> {
	if !amount.is_empty() && amount.bytes().all(|b| b.is_ascii_digit()) {
		Ok(())
	} else {
		Err(ProviderError::Malformed(format!(
			"{provider} returned non-integer amount '{amount}'"
		)))
	}
}
