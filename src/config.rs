//! Runtime configuration from command-line flags and the environment.

use crate::auth::Role;
use crate::provider::{BatchPolicy, EtherscanConfig, RetryPolicy, TronGridConfig};
use crate::registry::DecimalsPolicy;
use crate::service::TrackerSettings;
use std::path::PathBuf;
use std::time::Duration;

/// Every flag falls back to the environment variable of the same name.
#[derive(clap::Args, Debug, Clone)]
pub struct Config {
	#[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
	pub etherscan_api_key: Option<String>,

	#[arg(long, env = "TRONGRID_API_KEY", hide_env_values = true)]
	pub trongrid_api_key: Option<String>,

	#[arg(long, env = "ETHERSCAN_BASE_URL", default_value = "https://api.etherscan.io/v2/api")]
	pub etherscan_base_url: String,

	#[arg(long, env = "ETHERSCAN_CHAIN_ID", default_value_t = 1)]
	pub etherscan_chain_id: u64,

	#[arg(long, env = "TRONGRID_BASE_URL", default_value = "https://api.trongrid.io")]
	pub trongrid_base_url: String,

	/// Directory holding the JSON state file
	#[arg(long, env = "TRACKER_DATA_DIR", default_value = "./tracker-data")]
	pub data_dir: PathBuf,

	/// Wallets per sync page
	#[arg(long, env = "SYNC_PAGE_SIZE", default_value_t = 3)]
	pub sync_page_size: usize,

	/// Wallets per balance-refresh page
	#[arg(long, env = "BALANCE_PAGE_SIZE", default_value_t = 5)]
	pub balance_page_size: usize,

	/// Seconds between unattended sync runs, used to pick the scheduled page
	#[arg(long, env = "SYNC_INTERVAL_SECS", default_value_t = 300)]
	pub sync_interval_secs: u64,

	/// `auto-correct` or `registry-only`
	#[arg(long, env = "DECIMALS_POLICY", default_value = "auto-correct")]
	pub decimals_policy: DecimalsPolicy,

	/// Role granted to the CLI caller
	#[arg(long, env = "TRACKER_ROLE", default_value = "viewer")]
	pub role: Role,

	#[arg(long, env = "ETHERSCAN_BATCH_SIZE", default_value_t = 4)]
	pub etherscan_batch_size: usize,

	#[arg(long, env = "ETHERSCAN_BATCH_DELAY_MS", default_value_t = 1000)]
	pub etherscan_batch_delay_ms: u64,

	#[arg(long, env = "TRONGRID_BATCH_SIZE", default_value_t = 4)]
	pub trongrid_batch_size: usize,

	#[arg(long, env = "TRONGRID_BATCH_DELAY_MS", default_value_t = 250)]
	pub trongrid_batch_delay_ms: u64,

	/// Retries after a rate-limit response
	#[arg(long, env = "PROVIDER_MAX_RETRIES", default_value_t = 3)]
	pub max_retries: u32,

	/// Retry `n` waits `n` times this many milliseconds
	#[arg(long, env = "PROVIDER_RETRY_DELAY_MS", default_value_t = 1000)]
	pub retry_delay_ms: u64,

	/// History pages followed per wallet on each sync
	#[arg(long, env = "PROVIDER_MAX_PAGES", default_value_t = 10)]
	pub max_pages: u32,
}

impl Config {
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			max_retries: self.max_retries,
			base_delay: Duration::from_millis(self.retry_delay_ms),
		}
	}

	pub fn etherscan(&self) -> EtherscanConfig {
		EtherscanConfig {
			api_key: self.etherscan_api_key.clone(),
			base_url: self.etherscan_base_url.clone(),
			chain_id: self.etherscan_chain_id,
			batch: BatchPolicy::new(
				self.etherscan_batch_size,
				Duration::from_millis(self.etherscan_batch_delay_ms),
			),
			retry: self.retry_policy(),
			max_pages: self.max_pages,
			..EtherscanConfig::default()
		}
	}

	pub fn trongrid(&self) -> TronGridConfig {
		TronGridConfig {
			api_key: self.trongrid_api_key.clone(),
			base_url: self.trongrid_base_url.clone(),
			batch: BatchPolicy::new(
				self.trongrid_batch_size,
				Duration::from_millis(self.trongrid_batch_delay_ms),
			),
			retry: self.retry_policy(),
			max_pages: self.max_pages,
			..TronGridConfig::default()
		}
	}

	pub fn tracker_settings(&self) -> TrackerSettings {
		TrackerSettings {
			sync_page_size: self.sync_page_size,
			balance_page_size: self.balance_page_size,
			sync_interval: Duration::from_secs(self.sync_interval_secs),
			decimals_policy: self.decimals_policy,
			..TrackerSettings::default()
		}
	}
}
