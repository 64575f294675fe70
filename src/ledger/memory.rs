//! In-memory store, used by tests and for dry runs.

use super::state::StoreState;
use super::store::*;
use super::types::*;
use crate::registry::{Network, Token, Wallet};
use num_bigint::BigInt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Volatile store with a switch to simulate the backing database going away.
#[derive(Debug, Clone)]
pub struct MemoryStore {
	state: Arc<RwLock<StoreState>>,
	available: Arc<AtomicBool>,
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryStore {
	pub fn new() -> Self {
		Self {
			state: Arc::new(RwLock::new(StoreState::default())),
			available: Arc::new(AtomicBool::new(true)),
		}
	}

	/// Make every subsequent call fail with [`StoreError::Unavailable`] (or recover).
	pub fn set_available(&self, available: bool) {
		self.available.store(available, Ordering::SeqCst);
	}

	fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, StoreError> {
		self.check()?;
		Ok(self.state.read().unwrap_or_else(PoisonError::into_inner))
	}

	fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, StoreError> {
		self.check()?;
		Ok(self.state.write().unwrap_or_else(PoisonError::into_inner))
	}

	fn check(&self) -> Result<(), StoreError> {
		if self.available.load(Ordering::SeqCst) {
			Ok(())
		} else {
			Err(StoreError::Unavailable("memory store offline".to_string()))
		}
	}
}

#[async_trait::async_trait]
impl RegistryStore for MemoryStore {
	async fn list_wallets(&self) -> Result<Vec<Wallet>, StoreError> {
		Ok(self.read()?.wallets())
	}

	async fn list_tokens(&self) -> Result<Vec<Token>, StoreError> {
		Ok(self.read()?.tokens())
	}

	async fn insert_wallet(
		&self,
		network: Network,
		address: &str,
		label: Option<&str>,
	) -> Result<Wallet, StoreError> {
		self.write()?.insert_wallet(network, address, label)
	}

	async fn set_wallet_label(&self, id: u64, label: Option<&str>) -> Result<Wallet, StoreError> {
		self.write()?.set_wallet_label(id, label)
	}

	async fn delete_wallet(&self, id: u64) -> Result<Wallet, StoreError> {
		self.write()?.delete_wallet(id)
	}

	async fn insert_token(
		&self,
		network: Network,
		contract: &str,
		symbol: &str,
		decimals: u32,
	) -> Result<Token, StoreError> {
		self.write()?.insert_token(network, contract, symbol, decimals)
	}

	async fn set_token_decimals(&self, id: u64, decimals: u32) -> Result<Token, StoreError> {
		self.write()?.set_token_decimals(id, decimals)
	}

	async fn delete_token(&self, id: u64) -> Result<Token, StoreError> {
		self.write()?.delete_token(id)
	}
}

#[async_trait::async_trait]
impl LedgerStore for MemoryStore {
	async fn upsert_transaction(&self, tx: LedgerTransaction) -> Result<UpsertOutcome, StoreError> {
		Ok(self.write()?.upsert_transaction(tx))
	}

	async fn upsert_transactions(
		&self,
		txs: Vec<LedgerTransaction>,
	) -> Result<Vec<UpsertOutcome>, StoreError> {
		let mut state = self.write()?;
		Ok(txs.into_iter().map(|tx| state.upsert_transaction(tx)).collect())
	}

	async fn list_transactions(
		&self,
		filter: &TransactionFilter,
	) -> Result<Vec<LedgerTransaction>, StoreError> {
		Ok(self.read()?.list_transactions(filter))
	}

	async fn sum_signed(
		&self,
		wallet: &str,
		network: Network,
		token: Option<&str>,
	) -> Result<BigInt, StoreError> {
		self.read()?.sum_signed(wallet, network, token)
	}
}

#[async_trait::async_trait]
impl ReconciliationStore for MemoryStore {
	async fn append_record(
		&self,
		record: NewReconciliationRecord,
	) -> Result<ReconciliationRecord, StoreError> {
		Ok(self.write()?.append_record(record))
	}

	async fn list_recent(&self, limit: usize) -> Result<Vec<ReconciliationRecord>, StoreError> {
		Ok(self.read()?.list_recent(limit))
	}
}

#[async_trait::async_trait]
impl BalanceStore for MemoryStore {
	async fn upsert_balance(&self, snapshot: BalanceSnapshot) -> Result<(), StoreError> {
		self.write()?.upsert_balance(snapshot);
		Ok(())
	}

	async fn list_balances(&self) -> Result<Vec<BalanceSnapshot>, StoreError> {
		Ok(self.read()?.list_balances())
	}
}

#[async_trait::async_trait]
impl Store for MemoryStore {
	async fn ping(&self) -> Result<(), StoreError> {
		self.check()
	}
}
