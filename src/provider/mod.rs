//! Chain indexer adapters.
//!
//! Each adapter wraps one external indexing API behind [`ChainProvider`] and normalizes its
//! response shapes into [`RawTransaction`] and unsigned balance strings.

/// Etherscan v2 adapter (ERC20 network)
pub mod etherscan;
/// Linear retry shared by both adapters
pub mod retry;
/// TronGrid adapter (TRC20 network)
pub mod trongrid;
mod types;

pub use etherscan::{EtherscanConfig, EtherscanProvider};
pub use retry::{RetryPolicy, retry_with_policy};
pub use trongrid::{TronGridConfig, TronGridProvider};
pub use types::*;

use crate::registry::Network;
use std::sync::Arc;

/// One provider per network, shared across the sync, balance and reconciliation engines.
#[derive(Clone)]
pub struct ProviderSet {
	erc20: Arc<dyn ChainProvider>,
	trc20: Arc<dyn ChainProvider>,
}

impl ProviderSet {
	pub fn new(erc20: Arc<dyn ChainProvider>, trc20: Arc<dyn ChainProvider>) -> Self {
		Self { erc20, trc20 }
	}

	/// Build both HTTP adapters from their settings.
	pub fn from_configs(
		etherscan: EtherscanConfig,
		trongrid: TronGridConfig,
	) -> Result<Self, ProviderError> {
		Ok(Self::new(
			Arc::new(EtherscanProvider::new(etherscan)?),
			Arc::new(TronGridProvider::new(trongrid)?),
		))
	}

	pub fn for_network(&self, network: Network) -> Arc<dyn ChainProvider> {
		match network {
			Network::Erc20 => self.erc20.clone(),
			Network::Trc20 => self.trc20.clone(),
		}
	}

	/// Whether each network's provider has what it needs to make calls.
	pub fn configured(&self) -> Vec<(Network, bool)> {
		Network::ALL
			.iter()
			.map(|network| (*network, self.for_network(*network).ensure_configured().is_ok()))
			.collect()
	}
}
