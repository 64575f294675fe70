//! Registry records consumed by the sync and reconciliation engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two supported chain families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Network {
	/// Account/contract model chain indexed by Etherscan.
	#[serde(rename = "ERC20")]
	Erc20,
	/// Alternative account-based chain indexed by TronGrid.
	#[serde(rename = "TRC20")]
	Trc20,
}

impl Network {
	pub const ALL: [Network; 2] = [Network::Erc20, Network::Trc20];

	pub fn as_str(&self) -> &'static str {
		match self {
			Network::Erc20 => "ERC20",
			Network::Trc20 => "TRC20",
		}
	}

	/// Symbol of the chain's native asset, used for native-balance reconciliation.
	pub fn native_symbol(&self) -> &'static str {
		match self {
			Network::Erc20 => "ETH",
			Network::Trc20 => "TRX",
		}
	}
}

impl fmt::Display for Network {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid network: {0}")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
	type Err = UnknownNetwork;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_uppercase().as_str() {
			"ERC20" => Ok(Network::Erc20),
			"TRC20" => Ok(Network::Trc20),
			_ => Err(UnknownNetwork(s.to_string())),
		}
	}
}

/// A tracked, externally custodied wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
	pub id: u64,
	pub network: Network,
	pub address: String,
	pub label: Option<String>,
	pub created_at: DateTime<Utc>,
}

impl Wallet {
	/// Label used in sync logs: the wallet label, or an abbreviated address.
	pub fn display_label(&self) -> String {
		match &self.label {
			Some(label) if !label.is_empty() => label.clone(),
			_ => format!("{}...", self.address.chars().take(10).collect::<String>()),
		}
	}
}

/// A tracked token contract on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
	pub id: u64,
	pub network: Network,
	pub contract: String,
	pub symbol: String,
	pub decimals: u32,
	pub created_at: DateTime<Utc>,
}

/// Caller input for registering a wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWallet {
	pub network: Network,
	pub address: String,
	#[serde(default)]
	pub label: Option<String>,
}

impl NewWallet {
	pub fn validate(&self) -> Result<(), String> {
		if self.address.trim().is_empty() {
			return Err("network and address are required".to_string());
		}
		Ok(())
	}
}

/// Caller input for registering a token. Decimals are optional and
/// fall back to the known-token table, then to the generic default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewToken {
	pub network: Network,
	pub contract: String,
	pub symbol: String,
	#[serde(default)]
	pub decimals: Option<u32>,
}

impl NewToken {
	pub fn validate(&self) -> Result<(), String> {
		if self.contract.trim().is_empty() || self.symbol.trim().is_empty() {
			return Err("network, contract, and symbol are required".to_string());
		}
		self.decimals.map_or(Ok(()), super::decimals::validate_decimals)
	}
}

/// Result of a bulk wallet import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkImportReport {
	pub total: usize,
	pub created: usize,
	pub skipped: usize,
	pub duplicates_in_input: usize,
}
