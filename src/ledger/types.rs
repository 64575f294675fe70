//! Ledger, reconciliation and balance-cache records.

use crate::registry::Network;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transfer direction relative to the tracked wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
	#[serde(rename = "IN")]
	In,
	#[serde(rename = "OUT")]
	Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
	Confirmed,
	Failed,
}

/// Composite identity of a ledger row. A hash is scoped per wallet because one
/// transfer can touch two tracked wallets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
	pub network: Network,
	pub hash: String,
	pub wallet: String,
}

/// One observed transfer, as recorded for a tracked wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
	pub network: Network,
	pub hash: String,
	/// Tracked wallet address this row belongs to.
	pub wallet: String,
	/// Token contract, `None` for native transfers.
	pub token: Option<String>,
	pub direction: Direction,
	/// Unsigned minor-unit magnitude exactly as the provider reported it.
	pub amount: String,
	pub timestamp: DateTime<Utc>,
	pub block_number: u64,
	pub fee: Option<String>,
	pub status: TxStatus,
}

impl LedgerTransaction {
	pub fn key(&self) -> LedgerKey {
		LedgerKey {
			network: self.network,
			hash: self.hash.clone(),
			wallet: self.wallet.clone(),
		}
	}

	/// Whether the row belongs to the `(wallet, network, token)` pair.
	/// Contract identifiers compare case-insensitively.
	pub fn matches_pair(&self, wallet: &str, network: Network, token: Option<&str>) -> bool {
		if self.network != network || self.wallet != wallet {
			return false;
		}
		match (self.token.as_deref(), token) {
			(None, None) => true,
			(Some(ours), Some(theirs)) => ours.eq_ignore_ascii_case(theirs),
			_ => false,
		}
	}
}

/// Result of an idempotent ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
	Inserted,
	/// The key was already present; nothing was changed.
	Existing,
}

/// Read filter for the transaction listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
	pub network: Option<Network>,
	pub wallet: Option<String>,
	pub limit: Option<usize>,
}

impl TransactionFilter {
	pub const DEFAULT_LIMIT: usize = 100;
	pub const MAX_LIMIT: usize = 500;

	/// Requested limit, defaulted and capped.
	pub fn effective_limit(&self) -> usize {
		self.limit
			.unwrap_or(Self::DEFAULT_LIMIT)
			.min(Self::MAX_LIMIT)
	}

	pub fn matches(&self, tx: &LedgerTransaction) -> bool {
		self.network.is_none_or(|network| tx.network == network)
			&& self.wallet.as_deref().is_none_or(|wallet| tx.wallet == wallet)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
	Ok,
	Mismatch,
}

/// Append-only audit entry comparing ledger-derived and on-chain balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationRecord {
	pub id: u64,
	pub wallet: String,
	pub network: Network,
	/// Token contract, `None` for the native balance.
	pub token: Option<String>,
	pub symbol: String,
	/// Signed sum of ledger amounts.
	pub expected_balance: String,
	/// Unsigned on-chain balance.
	pub actual_balance: String,
	/// `actual - expected`, signed.
	pub difference: String,
	pub status: ReconciliationStatus,
	pub created_at: DateTime<Utc>,
}

/// A reconciliation result before the store assigns identity and time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReconciliationRecord {
	pub wallet: String,
	pub network: Network,
	pub token: Option<String>,
	pub symbol: String,
	pub expected_balance: String,
	pub actual_balance: String,
	pub difference: String,
	pub status: ReconciliationStatus,
}

/// Last fetched on-chain balance for a `(network, wallet, contract)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
	pub network: Network,
	pub wallet: String,
	pub contract: String,
	pub symbol: String,
	pub balance: String,
	pub decimals: u32,
	pub updated_at: DateTime<Utc>,
}

impl BalanceSnapshot {
	pub fn same_slot(&self, other: &BalanceSnapshot) -> bool {
		self.network == other.network && self.wallet == other.wallet && self.contract == other.contract
	}
}
