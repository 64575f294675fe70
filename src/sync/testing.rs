//! Scripted provider for exercising the sync, balance and reconciliation engines offline.

use crate::provider::{BatchPolicy, ChainProvider, ProviderError, RawTransaction};
use crate::registry::Network;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type PairKey = (String, Option<String>);
type FetchHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Scripted failure, replayed as a fresh `ProviderError` of the same kind on each call.
#[derive(Clone)]
enum Failure {
	RateLimited(String),
	MissingApiKey(&'static str),
	Api(String),
}

#[derive(Default)]
struct Script {
	transactions: HashMap<PairKey, Vec<RawTransaction>>,
	balances: HashMap<PairKey, String>,
	/// Failures by address, applied to every call for that wallet
	failures: HashMap<String, Failure>,
	transaction_calls: Vec<String>,
	on_fetch: Option<FetchHook>,
	configured: bool,
}

/// Mock chain provider. Unscripted pairs have no transfers and a zero balance.
pub struct MockProvider {
	network: Network,
	batch: BatchPolicy,
	script: Mutex<Script>,
}

impl MockProvider {
	pub fn new(network: Network) -> Self {
		Self {
			network,
			batch: BatchPolicy::new(4, Duration::ZERO),
			script: Mutex::new(Script {
				configured: true,
				..Script::default()
			}),
		}
	}

	fn script(&self) -> MutexGuard<'_, Script> {
		self.script.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn key(address: &str, contract: Option<&str>) -> PairKey {
		(address.to_string(), contract.map(str::to_lowercase))
	}

	pub fn set_transactions(&self, address: &str, contract: Option<&str>, txs: Vec<RawTransaction>) {
		self.script().transactions.insert(Self::key(address, contract), txs);
	}

	pub fn set_balance(&self, address: &str, contract: Option<&str>, balance: &str) {
		self.script()
			.balances
			.insert(Self::key(address, contract), balance.to_string());
	}

	/// Make every transfer and balance call for `address` fail.
	///
	/// Rate limits and missing keys keep their kind; any other error is replayed as an API error
	/// with the same message.
	pub fn fail_address(&self, address: &str, error: ProviderError) {
		let failure = match error {
			ProviderError::RateLimited(message) => Failure::RateLimited(message),
			ProviderError::MissingApiKey(key) => Failure::MissingApiKey(key),
			other => Failure::Api(other.to_string()),
		};
		self.script().failures.insert(address.to_string(), failure);
	}

	/// Run `hook` with the address at the start of every `fetch_transactions` call.
	pub fn on_fetch(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
		self.script().on_fetch = Some(Arc::new(hook));
	}

	pub fn set_configured(&self, configured: bool) {
		self.script().configured = configured;
	}

	/// Addresses passed to `fetch_transactions`, in call order.
	pub fn transaction_calls(&self) -> Vec<String> {
		self.script().transaction_calls.clone()
	}

	fn scripted_failure(&self, script: &Script, address: &str) -> Option<ProviderError> {
		script.failures.get(address).cloned().map(|failure| match failure {
			Failure::RateLimited(message) => ProviderError::RateLimited(message),
			Failure::MissingApiKey(key) => ProviderError::MissingApiKey(key),
			Failure::Api(message) => ProviderError::Api {
				provider: self.name(),
				message,
			},
		})
	}
}

#[async_trait::async_trait]
impl ChainProvider for MockProvider {
	fn network(&self) -> Network {
		self.network
	}

	fn name(&self) -> &'static str {
		match self.network {
			Network::Erc20 => "MockEtherscan",
			Network::Trc20 => "MockTronGrid",
		}
	}

	fn batch_policy(&self) -> BatchPolicy {
		self.batch
	}

	fn ensure_configured(&self) -> Result<(), ProviderError> {
		if self.script().configured {
			Ok(())
		} else {
			Err(ProviderError::MissingApiKey(match self.network {
				Network::Erc20 => "ETHERSCAN_API_KEY",
				Network::Trc20 => "TRONGRID_API_KEY",
			}))
		}
	}

	async fn fetch_transactions(
		&self,
		address: &str,
		contract: Option<&str>,
	) -> Result<Vec<RawTransaction>, ProviderError> {
		let hook = self.script().on_fetch.clone();
		if let Some(hook) = hook {
			hook(address);
		}
		let mut script = self.script();
		script.transaction_calls.push(address.to_string());
		if let Some(err) = self.scripted_failure(&script, address) {
			return Err(err);
		}
		Ok(script
			.transactions
			.get(&Self::key(address, contract))
			.cloned()
			.unwrap_or_default())
	}

	async fn fetch_balance(
		&self,
		address: &str,
		contract: Option<&str>,
	) -> Result<String, ProviderError> {
		let script = self.script();
		let key = Self::key(address, contract);
		if let Some(err) = self.scripted_failure(&script, address) {
			return Err(err);
		}
		Ok(script
			.balances
			.get(&key)
			.cloned()
			.unwrap_or_else(|| "0".to_string()))
	}
}
