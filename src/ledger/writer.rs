//! Normalizes provider transfers into ledger rows and records them idempotently.

use super::amount::{self, AmountError};
use super::store::{LedgerStore, Store, StoreError};
use super::types::*;
use crate::provider::RawTransaction;
use crate::registry::{Token, Wallet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counts for one `(wallet, token)` write-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
	/// Transfers handed to the store (new or already known).
	pub processed: usize,
	/// Transfers that created a new row.
	pub inserted: usize,
	/// Transfers dropped because their amounts could not be parsed.
	pub rejected: usize,
}

pub struct LedgerWriter {
	store: Arc<dyn Store>,
}

impl LedgerWriter {
	pub fn new(store: Arc<dyn Store>) -> Self {
		Self { store }
	}

	/// Build the ledger row for `raw` as seen from `wallet`.
	///
	/// # Arguments
	///
	/// * `raw` - Provider transfer
	/// * `wallet` - Tracked wallet the transfer was fetched for
	/// * `token` - Registry token the fetch was scoped to, `None` for native transfers
	pub fn normalize(
		raw: &RawTransaction,
		wallet: &Wallet,
		token: Option<&Token>,
	) -> Result<LedgerTransaction, AmountError> {
		amount::parse_unsigned(&raw.value)?;
		let direction = if raw.to.eq_ignore_ascii_case(&wallet.address) {
			Direction::In
		} else {
			Direction::Out
		};

		Ok(LedgerTransaction {
			network: wallet.network,
			hash: raw.hash.clone(),
			wallet: wallet.address.clone(),
			token: raw
				.contract
				.clone()
				.or_else(|| token.map(|t| t.contract.clone())),
			direction,
			amount: raw.value.clone(),
			timestamp: raw.timestamp,
			block_number: raw.block_number,
			fee: amount::fee(raw.gas_used.as_deref(), raw.gas_price.as_deref())?,
			status: if raw.failed {
				TxStatus::Failed
			} else {
				TxStatus::Confirmed
			},
		})
	}

	/// Upsert every transfer in provider order as one store batch.
	///
	/// A store failure fails the whole write-out; malformed transfers are skipped.
	pub async fn record(
		&self,
		wallet: &Wallet,
		token: Option<&Token>,
		transfers: &[RawTransaction],
	) -> Result<WriteSummary, StoreError> {
		let mut summary = WriteSummary::default();
		let mut rows = Vec::with_capacity(transfers.len());
		for raw in transfers {
			match Self::normalize(raw, wallet, token) {
				Ok(tx) => rows.push(tx),
				Err(e) => {
					warn!("Skipping transaction {}: {}", raw.hash, e);
					summary.rejected += 1;
				}
			}
		}
		if rows.is_empty() {
			return Ok(summary);
		}

		let outcomes = self.store.upsert_transactions(rows).await?;
		summary.processed = outcomes.len();
		summary.inserted = outcomes
			.iter()
			.filter(|outcome| **outcome == UpsertOutcome::Inserted)
			.count();
		debug!(
			"Recorded {} transfers for {} ({} new)",
			summary.processed, wallet.address, summary.inserted
		);
		Ok(summary)
	}
}
