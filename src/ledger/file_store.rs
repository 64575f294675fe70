//! JSON-file store: the whole tracker state in one pretty-printed document,
//! rewritten atomically after each mutation.

use super::state::StoreState;
use super::store::*;
use super::types::*;
use crate::registry::{Network, Token, Wallet};
use num_bigint::BigInt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

const STATE_FILE: &str = "tracker_state.json";

/// File-based implementation of every store trait
pub struct JsonFileStore {
	path: PathBuf,
	state: Mutex<StoreState>,
}

impl JsonFileStore {
	/// Open (or initialize) the store under `data_dir`.
	pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
		let data_dir = data_dir.as_ref();
		tokio::fs::create_dir_all(data_dir).await?;
		let path = data_dir.join(STATE_FILE);

		let state = if tokio::fs::try_exists(&path).await? {
			let content = tokio::fs::read_to_string(&path).await?;
			let mut state: StoreState = serde_json::from_str(&content)?;
			state.reindex();
			info!("Loaded tracker state from {:?}", path);
			state
		} else {
			info!("No tracker state at {:?}, starting empty", path);
			StoreState::default()
		};

		Ok(Self {
			path,
			state: Mutex::new(state),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
		let tmp = self.path.with_extension("json.tmp");
		tokio::fs::write(&tmp, serde_json::to_string_pretty(state)?).await?;
		tokio::fs::rename(&tmp, &self.path).await?;
		debug!("Persisted tracker state to {:?}", self.path);
		Ok(())
	}

	/// Apply `change` to a copy of the state and commit it only once it is on disk.
	async fn mutate<T>(
		&self,
		change: impl FnOnce(&mut StoreState) -> Result<T, StoreError>,
	) -> Result<T, StoreError> {
		let mut guard = self.state.lock().await;
		let mut next = guard.clone();
		let result = change(&mut next)?;
		self.persist(&next).await?;
		*guard = next;
		Ok(result)
	}
}

#[async_trait::async_trait]
impl RegistryStore for JsonFileStore {
	async fn list_wallets(&self) -> Result<Vec<Wallet>, StoreError> {
		Ok(self.state.lock().await.wallets())
	}

	async fn list_tokens(&self) -> Result<Vec<Token>, StoreError> {
		Ok(self.state.lock().await.tokens())
	}

	async fn insert_wallet(
		&self,
		network: Network,
		address: &str,
		label: Option<&str>,
	) -> Result<Wallet, StoreError> {
		self.mutate(|state| state.insert_wallet(network, address, label))
			.await
	}

	async fn set_wallet_label(&self, id: u64, label: Option<&str>) -> Result<Wallet, StoreError> {
		self.mutate(|state| state.set_wallet_label(id, label)).await
	}

	async fn delete_wallet(&self, id: u64) -> Result<Wallet, StoreError> {
		self.mutate(|state| state.delete_wallet(id)).await
	}

	async fn insert_token(
		&self,
		network: Network,
		contract: &str,
		symbol: &str,
		decimals: u32,
	) -> Result<Token, StoreError> {
		self.mutate(|state| state.insert_token(network, contract, symbol, decimals))
			.await
	}

	async fn set_token_decimals(&self, id: u64, decimals: u32) -> Result<Token, StoreError> {
		self.mutate(|state| state.set_token_decimals(id, decimals))
			.await
	}

	async fn delete_token(&self, id: u64) -> Result<Token, StoreError> {
		self.mutate(|state| state.delete_token(id)).await
	}
}

#[async_trait::async_trait]
impl LedgerStore for JsonFileStore {
	async fn upsert_transaction(&self, tx: LedgerTransaction) -> Result<UpsertOutcome, StoreError> {
		// Conflicts are no-ops, so skip the rewrite entirely.
		if self.state.lock().await.contains_transaction(&tx.key()) {
			return Ok(UpsertOutcome::Existing);
		}
		self.mutate(|state| Ok(state.upsert_transaction(tx))).await
	}

	/// One rewrite for the whole batch, and none when every key is already recorded.
	async fn upsert_transactions(
		&self,
		txs: Vec<LedgerTransaction>,
	) -> Result<Vec<UpsertOutcome>, StoreError> {
		let all_known = {
			let state = self.state.lock().await;
			txs.iter().all(|tx| state.contains_transaction(&tx.key()))
		};
		if all_known {
			return Ok(vec![UpsertOutcome::Existing; txs.len()]);
		}
		self.mutate(|state| {
			Ok(txs
				.into_iter()
				.map(|tx| state.upsert_transaction(tx))
				.collect())
		})
		.await
	}

	async fn list_transactions(
		&self,
		filter: &TransactionFilter,
	) -> Result<Vec<LedgerTransaction>, StoreError> {
		Ok(self.state.lock().await.list_transactions(filter))
	}

	async fn sum_signed(
		&self,
		wallet: &str,
		network: Network,
		token: Option<&str>,
	) -> Result<BigInt, StoreError> {
		self.state.lock().await.sum_signed(wallet, network, token)
	}
}

#[async_trait::async_trait]
impl ReconciliationStore for JsonFileStore {
	async fn append_record(
		&self,
		record: NewReconciliationRecord,
	) -> Result<ReconciliationRecord, StoreError> {
		self.mutate(|state| Ok(state.append_record(record))).await
	}

	async fn list_recent(&self, limit: usize) -> Result<Vec<ReconciliationRecord>, StoreError> {
		Ok(self.state.lock().await.list_recent(limit))
	}
}

#[async_trait::async_trait]
impl BalanceStore for JsonFileStore {
	async fn upsert_balance(&self, snapshot: BalanceSnapshot) -> Result<(), StoreError> {
		self.mutate(|state| {
			state.upsert_balance(snapshot);
			Ok(())
		})
		.await
	}

	async fn list_balances(&self) -> Result<Vec<BalanceSnapshot>, StoreError> {
		Ok(self.state.lock().await.list_balances())
	}
}

#[async_trait::async_trait]
impl Store for JsonFileStore {
	async fn ping(&self) -> Result<(), StoreError> {
		let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
		tokio::fs::metadata(dir)
			.await
			.map(|_| ())
			.map_err(|e| StoreError::Unavailable(format!("{}: {}", dir.display(), e)))
	}
}
