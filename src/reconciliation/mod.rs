//! Reconciliation of ledger-derived balances against on-chain balances.
//!
//! For every wallet the engine checks the native balance and each same-network token. The
//! expected balance is the signed sum of the pair's ledger rows, the actual balance comes from the
//! network's provider, and `difference = actual - expected` is computed over arbitrary-precision
//! integers. Each checked pair appends one record; a pair whose balance cannot be fetched is
//! skipped and reported.

use crate::error::TrackerError;
use crate::ledger::{
	LedgerStore, NewReconciliationRecord, ReconciliationRecord, ReconciliationStatus,
	ReconciliationStore, RegistryStore, Store, amount,
};
use crate::provider::ProviderSet;
use crate::registry::{Network, Token, Wallet};
use crate::sync::BatchScheduler;
use futures::future::join_all;
use itertools::Itertools;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Records returned by `recent` when the caller gives no limit.
pub const DEFAULT_RECENT_LIMIT: usize = 50;

/// One `(wallet, token-or-native)` pair to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationTarget {
	pub wallet: Wallet,
	/// `None` checks the native balance.
	pub token: Option<Token>,
}

impl ReconciliationTarget {
	pub fn contract(&self) -> Option<&str> {
		self.token.as_ref().map(|token| token.contract.as_str())
	}

	pub fn symbol(&self) -> String {
		match &self.token {
			Some(token) => token.symbol.clone(),
			None => self.wallet.network.native_symbol().to_string(),
		}
	}
}

/// Native pair first, then the wallet's same-network tokens, wallet by wallet.
pub fn plan_targets(wallets: &[Wallet], tokens: &[Token]) -> Vec<ReconciliationTarget> {
	wallets
		.iter()
		.flat_map(|wallet| {
			std::iter::once(None)
				.chain(
					tokens
						.iter()
						.filter(|token| token.network == wallet.network)
						.map(Some),
				)
				.map(|token| ReconciliationTarget {
					wallet: wallet.clone(),
					token: token.cloned(),
				})
		})
		.collect()
}

/// A pair that was skipped because its actual balance could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedPair {
	pub wallet: String,
	pub network: Network,
	pub token: Option<String>,
	pub error: String,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
	/// Records appended by this run
	pub records: Vec<ReconciliationRecord>,
	pub skipped: Vec<SkippedPair>,
}

impl ReconciliationReport {
	pub fn mismatches(&self) -> usize {
		self.records
			.iter()
			.filter(|record| record.status == ReconciliationStatus::Mismatch)
			.count()
	}
}

pub struct ReconciliationEngine {
	store: Arc<dyn Store>,
	providers: ProviderSet,
}

impl ReconciliationEngine {
	pub fn new(store: Arc<dyn Store>, providers: ProviderSet) -> Self {
		Self { store, providers }
	}

	/// Check every pair once and append one record per pair that could be checked.
	pub async fn run(&self) -> Result<ReconciliationReport, TrackerError> {
		let (wallets, tokens) =
			tokio::try_join!(self.store.list_wallets(), self.store.list_tokens())?;
		let targets = plan_targets(&wallets, &tokens);

		for network in targets.iter().map(|target| target.wallet.network).unique() {
			self.providers.for_network(network).ensure_configured()?;
		}
		info!("Reconciling {} wallet balances", targets.len());

		let mut report = ReconciliationReport::default();
		for network in Network::ALL {
			let provider = self.providers.for_network(network);
			let scheduler = BatchScheduler::new(provider.batch_policy());
			let network_targets: Vec<_> = targets
				.iter()
				.filter(|target| target.wallet.network == network)
				.collect();

			for batch in network_targets.chunks(scheduler.policy().batch_size) {
				let actuals = join_all(batch.iter().map(|target| {
					provider.fetch_balance(&target.wallet.address, target.contract())
				}))
				.await;

				for (target, actual) in batch.iter().zip(actuals) {
					match actual {
						Ok(actual) => {
							let record = self.reconcile(target, &actual).await?;
							report.records.push(record);
						}
						Err(e) => {
							let e = TrackerError::from(e);
							if e.is_fatal() {
								error!("Reconciliation aborted: {}", e);
								return Err(e);
							}
							warn!(
								"Balance check failed for {}/{}: {}",
								target.wallet.address,
								target.symbol(),
								e
							);
							report.skipped.push(SkippedPair {
								wallet: target.wallet.address.clone(),
								network,
								token: target.contract().map(str::to_string),
								error: e.to_string(),
							});
						}
					}
				}
				scheduler.pause().await;
			}
		}

		info!(
			"Reconciliation finished: {} records, {} mismatches, {} skipped",
			report.records.len(),
			report.mismatches(),
			report.skipped.len()
		);
		Ok(report)
	}

	/// Compare one pair's ledger sum against `actual` and append the record.
	async fn reconcile(
		&self,
		target: &ReconciliationTarget,
		actual: &str,
	) -> Result<ReconciliationRecord, TrackerError> {
		let expected = self
			.store
			.sum_signed(&target.wallet.address, target.wallet.network, target.contract())
			.await?;
		let difference = amount::difference(actual, &expected)?;
		let status = if difference.is_zero() {
			ReconciliationStatus::Ok
		} else {
			ReconciliationStatus::Mismatch
		};
		if status == ReconciliationStatus::Mismatch {
			warn!(
				"Balance mismatch for {} {}: expected {}, actual {}",
				target.wallet.address,
				target.symbol(),
				expected,
				actual
			);
		}

		let record = self
			.store
			.append_record(NewReconciliationRecord {
				wallet: target.wallet.address.clone(),
				network: target.wallet.network,
				token: target.contract().map(str::to_string),
				symbol: target.symbol(),
				expected_balance: expected.to_string(),
				actual_balance: actual.to_string(),
				difference: difference.to_string(),
				status,
			})
			.await?;
		Ok(record)
	}

	/// Most recent records first; `None` means [`DEFAULT_RECENT_LIMIT`].
	pub async fn recent(
		&self,
		limit: Option<usize>,
	) -> Result<Vec<ReconciliationRecord>, TrackerError> {
		Ok(self
			.store
			.list_recent(limit.unwrap_or(DEFAULT_RECENT_LIMIT))
			.await?)
	}
}
