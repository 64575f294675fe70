//! Storage seams for the registry, ledger, reconciliation log and balance cache.

use super::types::*;
use crate::registry::{Network, Token, Wallet};
use num_bigint::BigInt;

/// Error types for the storage layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("Store unavailable: {0}")]
	Unavailable(String),

	#[error("Duplicate: {0}")]
	Duplicate(String),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Corrupt record: {0}")]
	Corrupt(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

/// Wallet and token lists, ordered by creation ascending for deterministic paging.
#[async_trait::async_trait]
pub trait RegistryStore: Send + Sync {
	async fn list_wallets(&self) -> Result<Vec<Wallet>, StoreError>;
	async fn list_tokens(&self) -> Result<Vec<Token>, StoreError>;

	/// Fails with [`StoreError::Duplicate`] when `(network, address)` exists.
	async fn insert_wallet(
		&self,
		network: Network,
		address: &str,
		label: Option<&str>,
	) -> Result<Wallet, StoreError>;
	async fn set_wallet_label(&self, id: u64, label: Option<&str>) -> Result<Wallet, StoreError>;
	async fn delete_wallet(&self, id: u64) -> Result<Wallet, StoreError>;

	/// Fails with [`StoreError::Duplicate`] when `(network, contract)` exists.
	async fn insert_token(
		&self,
		network: Network,
		contract: &str,
		symbol: &str,
		decimals: u32,
	) -> Result<Token, StoreError>;
	async fn set_token_decimals(&self, id: u64, decimals: u32) -> Result<Token, StoreError>;
	async fn delete_token(&self, id: u64) -> Result<Token, StoreError>;
}

/// Idempotent transaction ledger keyed by `(network, hash, wallet)`.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
	/// Insert when the key is absent; otherwise leave the stored row untouched.
	async fn upsert_transaction(&self, tx: LedgerTransaction) -> Result<UpsertOutcome, StoreError>;

	/// Upsert `txs` in order, one outcome per row. Stores with expensive writes commit the batch
	/// at once.
	async fn upsert_transactions(
		&self,
		txs: Vec<LedgerTransaction>,
	) -> Result<Vec<UpsertOutcome>, StoreError> {
		let mut outcomes = Vec::with_capacity(txs.len());
		for tx in txs {
			outcomes.push(self.upsert_transaction(tx).await?);
		}
		Ok(outcomes)
	}

	/// Rows matching `filter`, newest first.
	async fn list_transactions(
		&self,
		filter: &TransactionFilter,
	) -> Result<Vec<LedgerTransaction>, StoreError>;

	/// Signed sum (`+IN`, `-OUT`) over every row of the pair.
	async fn sum_signed(
		&self,
		wallet: &str,
		network: Network,
		token: Option<&str>,
	) -> Result<BigInt, StoreError>;
}

/// Append-only reconciliation audit log.
#[async_trait::async_trait]
pub trait ReconciliationStore: Send + Sync {
	async fn append_record(
		&self,
		record: NewReconciliationRecord,
	) -> Result<ReconciliationRecord, StoreError>;

	/// Most recent records first.
	async fn list_recent(&self, limit: usize) -> Result<Vec<ReconciliationRecord>, StoreError>;
}

/// Cache of the last fetched balance per `(network, wallet, contract)`.
#[async_trait::async_trait]
pub trait BalanceStore: Send + Sync {
	async fn upsert_balance(&self, snapshot: BalanceSnapshot) -> Result<(), StoreError>;

	/// Cached rows, most recently updated first.
	async fn list_balances(&self) -> Result<Vec<BalanceSnapshot>, StoreError>;
}

/// Everything the tracker persists, behind one handle.
#[async_trait::async_trait]
pub trait Store: RegistryStore + LedgerStore + ReconciliationStore + BalanceStore {
	/// Cheap reachability probe for health reporting.
	async fn ping(&self) -> Result<(), StoreError>;
}
