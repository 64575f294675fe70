//! Persisted tracker state shared by the in-memory and JSON-file stores.

use super::amount;
use super::store::StoreError;
use super::types::*;
use crate::registry::{Network, Token, Wallet};
use chrono::Utc;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoreState {
	next_id: u64,
	wallets: Vec<Wallet>,
	tokens: Vec<Token>,
	transactions: Vec<LedgerTransaction>,
	reconciliations: Vec<ReconciliationRecord>,
	balances: Vec<BalanceSnapshot>,
	#[serde(skip)]
	ledger_keys: HashSet<LedgerKey>,
}

impl StoreState {
	/// Rebuild derived indexes after deserializing.
	pub(crate) fn reindex(&mut self) {
		self.ledger_keys = self.transactions.iter().map(LedgerTransaction::key).collect();
	}

	fn allocate_id(&mut self) -> u64 {
		self.next_id += 1;
		self.next_id
	}

	pub(crate) fn wallets(&self) -> Vec<Wallet> {
		let mut wallets = self.wallets.clone();
		wallets.sort_by_key(|wallet| (wallet.created_at, wallet.id));
		wallets
	}

	pub(crate) fn tokens(&self) -> Vec<Token> {
		let mut tokens = self.tokens.clone();
		tokens.sort_by_key(|token| (token.created_at, token.id));
		tokens
	}

	pub(crate) fn insert_wallet(
		&mut self,
		network: Network,
		address: &str,
		label: Option<&str>,
	) -> Result<Wallet, StoreError> {
		if self
			.wallets
			.iter()
			.any(|w| w.network == network && w.address == address)
		{
			return Err(StoreError::Duplicate(format!(
				"Wallet already exists for this network: {address}"
			)));
		}
		let wallet = Wallet {
			id: self.allocate_id(),
			network,
			address: address.to_string(),
			label: label.map(str::to_string),
			created_at: Utc::now(),
		};
		self.wallets.push(wallet.clone());
		Ok(wallet)
	}

	pub(crate) fn set_wallet_label(
		&mut self,
		id: u64,
		label: Option<&str>,
	) -> Result<Wallet, StoreError> {
		let wallet = self
			.wallets
			.iter_mut()
			.find(|w| w.id == id)
			.ok_or_else(|| StoreError::NotFound(format!("wallet {id}")))?;
		wallet.label = label.map(str::to_string);
		Ok(wallet.clone())
	}

	pub(crate) fn delete_wallet(&mut self, id: u64) -> Result<Wallet, StoreError> {
		let index = self
			.wallets
			.iter()
			.position(|w| w.id == id)
			.ok_or_else(|| StoreError::NotFound(format!("wallet {id}")))?;
		Ok(self.wallets.remove(index))
	}

	pub(crate) fn insert_token(
		&mut self,
		network: Network,
		contract: &str,
		symbol: &str,
		decimals: u32,
	) -> Result<Token, StoreError> {
		if self
			.tokens
			.iter()
			.any(|t| t.network == network && t.contract == contract)
		{
			return Err(StoreError::Duplicate(format!(
				"Token already exists for this network: {contract}"
			)));
		}
		let token = Token {
			id: self.allocate_id(),
			network,
			contract: contract.to_string(),
			symbol: symbol.to_string(),
			decimals,
			created_at: Utc::now(),
		};
		self.tokens.push(token.clone());
		Ok(token)
	}

	pub(crate) fn set_token_decimals(&mut self, id: u64, decimals: u32) -> Result<Token, StoreError> {
		let token = self
			.tokens
			.iter_mut()
			.find(|t| t.id == id)
			.ok_or_else(|| StoreError::NotFound(format!("token {id}")))?;
		token.decimals = decimals;
		Ok(token.clone())
	}

	pub(crate) fn delete_token(&mut self, id: u64) -> Result<Token, StoreError> {
		let index = self
			.tokens
			.iter()
			.position(|t| t.id == id)
			.ok_or_else(|| StoreError::NotFound(format!("token {id}")))?;
		Ok(self.tokens.remove(index))
	}

	pub(crate) fn contains_transaction(&self, key: &LedgerKey) -> bool {
		self.ledger_keys.contains(key)
	}

	pub(crate) fn upsert_transaction(&mut self, tx: LedgerTransaction) -> UpsertOutcome {
		if !self.ledger_keys.insert(tx.key()) {
			return UpsertOutcome::Existing;
		}
		self.transactions.push(tx);
		UpsertOutcome::Inserted
	}

	pub(crate) fn list_transactions(&self, filter: &TransactionFilter) -> Vec<LedgerTransaction> {
		let mut rows: Vec<_> = self
			.transactions
			.iter()
			.filter(|tx| filter.matches(tx))
			.cloned()
			.collect();
		rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
		rows.truncate(filter.effective_limit());
		rows
	}

	pub(crate) fn sum_signed(
		&self,
		wallet: &str,
		network: Network,
		token: Option<&str>,
	) -> Result<BigInt, StoreError> {
		amount::signed_sum(
			self.transactions
				.iter()
				.filter(|tx| tx.matches_pair(wallet, network, token))
				.map(|tx| (tx.direction, tx.amount.as_str())),
		)
		.map_err(|e| StoreError::Corrupt(e.to_string()))
	}

	pub(crate) fn append_record(&mut self, record: NewReconciliationRecord) -> ReconciliationRecord {
		let record = ReconciliationRecord {
			id: self.allocate_id(),
			wallet: record.wallet,
			network: record.network,
			token: record.token,
			symbol: record.symbol,
			expected_balance: record.expected_balance,
			actual_balance: record.actual_balance,
			difference: record.difference,
			status: record.status,
			created_at: Utc::now(),
		};
		self.reconciliations.push(record.clone());
		record
	}

	pub(crate) fn list_recent(&self, limit: usize) -> Vec<ReconciliationRecord> {
		// Appended in time order; ids break ties within one run.
		let mut records = self.reconciliations.clone();
		records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
		records.truncate(limit);
		records
	}

	pub(crate) fn upsert_balance(&mut self, snapshot: BalanceSnapshot) {
		match self.balances.iter_mut().find(|b| b.same_slot(&snapshot)) {
			Some(existing) => *existing = snapshot,
			None => self.balances.push(snapshot),
		}
	}

	pub(crate) fn list_balances(&self) -> Vec<BalanceSnapshot> {
		let mut balances = self.balances.clone();
		balances.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
		balances
	}
}
