//! The tracker facade.
//!
//! [`Tracker`] owns the store, the providers and the engines built on them, and puts the caller
//! capability check in front of every operation. Mutations and manual triggers are admin-only;
//! reads need any signed-in caller; health needs nothing.

use crate::auth::AuthGate;
use crate::error::TrackerError;
use crate::ledger::{
	LedgerStore, LedgerTransaction, ReconciliationRecord, RegistryStore, Store, StoreError,
	TransactionFilter,
};
use crate::provider::ProviderSet;
use crate::reconciliation::{ReconciliationEngine, ReconciliationReport};
use crate::registry::{
	BulkImportReport, DecimalsPolicy, DecimalsResolver, Network, NewToken, NewWallet, Token,
	Wallet, validate_decimals,
};
use crate::sync::{
	BalancePage, BalanceRefresher, BalanceRow, Clock, PageReport, SyncEvent, SyncOrchestrator,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Largest accepted bulk wallet import.
pub const MAX_BULK_WALLETS: usize = 300;

/// Knobs of the engines behind the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
	/// Wallets per sync page
	pub sync_page_size: usize,
	/// Wallets per balance-refresh page
	pub balance_page_size: usize,
	/// Interval between unattended sync runs
	pub sync_interval: Duration,
	pub decimals_policy: DecimalsPolicy,
	/// Event buffer of streamed syncs
	pub stream_buffer: usize,
}

impl Default for TrackerSettings {
	fn default() -> Self {
		Self {
			sync_page_size: 3,
			balance_page_size: 5,
			sync_interval: Duration::from_secs(300),
			decimals_policy: DecimalsPolicy::AutoCorrect,
			stream_buffer: 64,
		}
	}
}

/// Result of applying the known-precision table to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimalsFixReport {
	pub fixed: usize,
	pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
	pub store: bool,
	pub etherscan: bool,
	pub trongrid: bool,
}

pub struct Tracker {
	store: Arc<dyn Store>,
	providers: ProviderSet,
	auth: Arc<dyn AuthGate>,
	resolver: DecimalsResolver,
	settings: TrackerSettings,
	orchestrator: Arc<SyncOrchestrator>,
	balances: BalanceRefresher,
	reconciliation: ReconciliationEngine,
}

impl Tracker {
	pub fn new(
		store: Arc<dyn Store>,
		providers: ProviderSet,
		auth: Arc<dyn AuthGate>,
		settings: TrackerSettings,
	) -> Self {
		let resolver = DecimalsResolver::new(settings.decimals_policy);
		let orchestrator = SyncOrchestrator::new(
			store.clone(),
			providers.clone(),
			settings.sync_page_size,
		)
		.with_interval(settings.sync_interval);
		Self {
			balances: BalanceRefresher::new(
				store.clone(),
				providers.clone(),
				resolver,
				settings.balance_page_size,
			),
			reconciliation: ReconciliationEngine::new(store.clone(), providers.clone()),
			orchestrator: Arc::new(orchestrator),
			store,
			providers,
			auth,
			resolver,
			settings,
		}
	}

	/// Replace the clock used to pick the page of scheduled syncs.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		let orchestrator = SyncOrchestrator::new(
			self.store.clone(),
			self.providers.clone(),
			self.settings.sync_page_size,
		)
		.with_interval(self.settings.sync_interval)
		.with_clock(clock);
		self.orchestrator = Arc::new(orchestrator);
		self
	}

	pub fn resolver(&self) -> DecimalsResolver {
		self.resolver
	}

	// Registry

	pub async fn list_wallets(&self) -> Result<Vec<Wallet>, TrackerError> {
		self.auth.require_caller().await?;
		Ok(self.store.list_wallets().await?)
	}

	pub async fn list_tokens(&self) -> Result<Vec<Token>, TrackerError> {
		self.auth.require_caller().await?;
		Ok(self.store.list_tokens().await?)
	}

	pub async fn add_wallet(&self, wallet: NewWallet) -> Result<Wallet, TrackerError> {
		self.auth.require_admin("add wallet").await?;
		wallet.validate().map_err(TrackerError::Validation)?;
		let label = wallet
			.label
			.as_deref()
			.map(str::trim)
			.filter(|label| !label.is_empty());
		let created = self
			.store
			.insert_wallet(wallet.network, wallet.address.trim(), label)
			.await?;
		info!("Added {} wallet {}", created.network, created.address);
		Ok(created)
	}

	/// Register many addresses on one network at once.
	///
	/// Input is trimmed, blank lines dropped and repeats collapsed. Addresses already registered
	/// on `network` are skipped rather than rejected.
	pub async fn bulk_add_wallets(
		&self,
		network: Network,
		addresses: &[String],
	) -> Result<BulkImportReport, TrackerError> {
		self.auth.require_admin("bulk add wallets").await?;
		let clean: Vec<&str> = addresses
			.iter()
			.map(|address| address.trim())
			.filter(|address| !address.is_empty())
			.collect();
		if clean.is_empty() {
			return Err(TrackerError::Validation(
				"No valid addresses provided".to_string(),
			));
		}
		if clean.len() > MAX_BULK_WALLETS {
			return Err(TrackerError::Validation(format!(
				"Maximum {MAX_BULK_WALLETS} wallets allowed per batch"
			)));
		}

		let unique: Vec<&str> = clean.iter().copied().unique().collect();
		let wallets = self.store.list_wallets().await?;
		let existing: HashSet<&str> = wallets
			.iter()
			.filter(|wallet| wallet.network == network)
			.map(|wallet| wallet.address.as_str())
			.collect();

		let mut created = 0;
		for address in unique.iter().filter(|address| !existing.contains(*address)) {
			match self.store.insert_wallet(network, address, None).await {
				Ok(_) => created += 1,
				// Registered concurrently; counts as skipped.
				Err(StoreError::Duplicate(_)) => {}
				Err(e) => return Err(e.into()),
			}
		}

		let report = BulkImportReport {
			total: unique.len(),
			created,
			skipped: unique.len() - created,
			duplicates_in_input: clean.len() - unique.len(),
		};
		info!(
			"Bulk import on {}: {} created, {} skipped",
			network, report.created, report.skipped
		);
		Ok(report)
	}

	pub async fn set_wallet_label(
		&self,
		id: u64,
		label: Option<&str>,
	) -> Result<Wallet, TrackerError> {
		self.auth.require_admin("label wallet").await?;
		let label = label.map(str::trim).filter(|label| !label.is_empty());
		Ok(self.store.set_wallet_label(id, label).await?)
	}

	pub async fn remove_wallet(&self, id: u64) -> Result<Wallet, TrackerError> {
		self.auth.require_admin("remove wallet").await?;
		let wallet = self.store.delete_wallet(id).await?;
		info!("Removed {} wallet {}", wallet.network, wallet.address);
		Ok(wallet)
	}

	/// Register a token. Without explicit decimals the known-token table is consulted, then the
	/// generic default.
	pub async fn add_token(&self, token: NewToken) -> Result<Token, TrackerError> {
		self.auth.require_admin("add token").await?;
		token.validate().map_err(TrackerError::Validation)?;
		let contract = token.contract.trim();
		let decimals = self.resolver.for_new_token(contract, token.decimals);
		let created = self
			.store
			.insert_token(token.network, contract, token.symbol.trim(), decimals)
			.await?;
		info!(
			"Added {} token {} ({} decimals)",
			created.network, created.symbol, created.decimals
		);
		Ok(created)
	}

	pub async fn remove_token(&self, id: u64) -> Result<Token, TrackerError> {
		self.auth.require_admin("remove token").await?;
		Ok(self.store.delete_token(id).await?)
	}

	pub async fn set_token_decimals(&self, id: u64, decimals: u32) -> Result<Token, TrackerError> {
		self.auth.require_admin("set token decimals").await?;
		validate_decimals(decimals).map_err(TrackerError::Validation)?;
		Ok(self.store.set_token_decimals(id, decimals).await?)
	}

	/// Rewrite every registry precision that disagrees with the known-token table.
	pub async fn fix_token_decimals(&self) -> Result<DecimalsFixReport, TrackerError> {
		self.auth.require_admin("fix token decimals").await?;
		let tokens = self.store.list_tokens().await?;
		let corrections = self.resolver.corrections(&tokens);
		for correction in &corrections {
			warn!(
				"Correcting decimals of {} from {} to {}",
				correction.contract, correction.registry_decimals, correction.known_decimals
			);
			self.store
				.set_token_decimals(correction.token_id, correction.known_decimals)
				.await?;
		}
		Ok(DecimalsFixReport {
			fixed: corrections.len(),
			total: tokens.len(),
		})
	}

	// Sync

	pub async fn sync_page(&self, page: usize) -> Result<PageReport, TrackerError> {
		self.auth.require_admin("sync").await?;
		self.orchestrator.sync_page(page).await
	}

	/// Start a streamed sync of `page`; events arrive on the returned receiver.
	pub async fn stream_sync(
		&self,
		page: usize,
	) -> Result<mpsc::Receiver<SyncEvent>, TrackerError> {
		self.auth.require_admin("sync").await?;
		Ok(self
			.orchestrator
			.clone()
			.stream_page(page, self.settings.stream_buffer))
	}

	pub async fn sync_all(&self) -> Result<Vec<PageReport>, TrackerError> {
		self.auth.require_admin("sync").await?;
		self.orchestrator.sync_all().await
	}

	pub async fn sync_scheduled(&self) -> Result<PageReport, TrackerError> {
		self.auth.require_admin("sync").await?;
		self.orchestrator.sync_scheduled().await
	}

	// Balances and ledger

	pub async fn refresh_balances(&self, page: usize) -> Result<BalancePage, TrackerError> {
		self.auth.require_caller().await?;
		self.balances.refresh_page(page).await
	}

	pub async fn cached_balances(&self) -> Result<Vec<BalanceRow>, TrackerError> {
		self.auth.require_caller().await?;
		self.balances.cached().await
	}

	pub async fn list_transactions(
		&self,
		filter: TransactionFilter,
	) -> Result<Vec<LedgerTransaction>, TrackerError> {
		self.auth.require_caller().await?;
		Ok(self.store.list_transactions(&filter).await?)
	}

	// Reconciliation

	pub async fn run_reconciliation(&self) -> Result<ReconciliationReport, TrackerError> {
		self.auth.require_admin("reconcile").await?;
		self.reconciliation.run().await
	}

	pub async fn recent_reconciliations(
		&self,
		limit: Option<usize>,
	) -> Result<Vec<ReconciliationRecord>, TrackerError> {
		self.auth.require_caller().await?;
		self.reconciliation.recent(limit).await
	}

	/// Which provider credentials are present and whether the store answers.
	pub async fn health(&self) -> Health {
		let configured = self.providers.configured();
		let is_configured = |network| {
			configured
				.iter()
				.any(|(candidate, ok)| *candidate == network && *ok)
		};
		Health {
			store: self.store.ping().await.is_ok(),
			etherscan: is_configured(Network::Erc20),
			trongrid: is_configured(Network::Trc20),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::auth::{Role, StaticAuthGate};
	use crate::ledger::MemoryStore;
	use crate::registry::DEFAULT_DECIMALS;
	use crate::sync::testing::MockProvider;

	const USDT: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";

	struct Fixture {
		store: Arc<MemoryStore>,
		erc20: Arc<MockProvider>,
		tracker: Tracker,
	}

	fn fixture(role: Role) -> Fixture {
		let store = Arc::new(MemoryStore::new());
		let erc20 = Arc::new(MockProvider::new(Network::Erc20));
		let tracker = Tracker::new(
			store.clone(),
			ProviderSet::new(erc20.clone(), Arc::new(MockProvider::new(Network::Trc20))),
			Arc::new(StaticAuthGate::new(role)),
			TrackerSettings::default(),
		);
		Fixture {
			store,
			erc20,
			tracker,
		}
	}

	fn usdt(decimals: Option<u32>) -> NewToken {
		NewToken {
			network: Network::Erc20,
			contract: USDT.to_string(),
			symbol: "USDT".to_string(),
			decimals,
		}
	}

	#[tokio::test]
	async fn viewers_can_read_but_not_mutate() {
		let f = fixture(Role::Viewer);
		assert!(f.tracker.list_wallets().await.unwrap().is_empty());
		let err = f
			.tracker
			.add_wallet(NewWallet {
				network: Network::Erc20,
				address: "0xabc".to_string(),
				label: None,
			})
			.await
			.unwrap_err();
		assert!(matches!(err, TrackerError::Forbidden(_)));
		assert!(matches!(
			f.tracker.sync_page(0).await,
			Err(TrackerError::Forbidden(_))
		));
		assert!(matches!(
			f.tracker.run_reconciliation().await,
			Err(TrackerError::Forbidden(_))
		));
	}

	#[tokio::test]
	async fn anonymous_callers_cannot_read() {
		let store = Arc::new(MemoryStore::new());
		let tracker = Tracker::new(
			store,
			ProviderSet::new(
				Arc::new(MockProvider::new(Network::Erc20)),
				Arc::new(MockProvider::new(Network::Trc20)),
			),
			Arc::new(StaticAuthGate::anonymous()),
			TrackerSettings::default(),
		);
		assert!(matches!(
			tracker.list_tokens().await,
			Err(TrackerError::Unauthorized)
		));
	}

	#[tokio::test]
	async fn wallet_validation_and_duplicates() {
		let f = fixture(Role::Admin);
		let blank = f
			.tracker
			.add_wallet(NewWallet {
				network: Network::Erc20,
				address: "  ".to_string(),
				label: None,
			})
			.await;
		assert!(matches!(blank, Err(TrackerError::Validation(_))));

		let wallet = NewWallet {
			network: Network::Erc20,
			address: " 0xabc ".to_string(),
			label: Some("Treasury".to_string()),
		};
		let created = f.tracker.add_wallet(wallet.clone()).await.unwrap();
		assert_eq!(created.address, "0xabc");
		assert!(matches!(
			f.tracker.add_wallet(wallet).await,
			Err(TrackerError::Validation(_))
		));
	}

	#[tokio::test]
	async fn bulk_import_dedupes_and_skips_existing() {
		let f = fixture(Role::Admin);
		f.store
			.insert_wallet(Network::Erc20, "0xa", None)
			.await
			.unwrap();
		let input: Vec<String> = ["0xa", " 0xb ", "", "0xb", "0xc", "   "]
			.iter()
			.map(|s| s.to_string())
			.collect();

		let report = f
			.tracker
			.bulk_add_wallets(Network::Erc20, &input)
			.await
			.unwrap();
		assert_eq!(
			report,
			BulkImportReport {
				total: 3,
				created: 2,
				skipped: 1,
				duplicates_in_input: 1,
			}
		);
		assert_eq!(f.store.list_wallets().await.unwrap().len(), 3);
	}

	#[tokio::test]
	async fn bulk_import_limits() {
		let f = fixture(Role::Admin);
		let blanks = vec![" ".to_string(); 3];
		assert!(matches!(
			f.tracker.bulk_add_wallets(Network::Trc20, &blanks).await,
			Err(TrackerError::Validation(_))
		));

		let too_many: Vec<String> = (0..=MAX_BULK_WALLETS).map(|i| format!("T{i}")).collect();
		let err = f
			.tracker
			.bulk_add_wallets(Network::Trc20, &too_many)
			.await
			.unwrap_err();
		assert!(err.to_string().contains("Maximum 300"));
		assert!(f.store.list_wallets().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn token_precision_defaults() {
		let f = fixture(Role::Admin);
		assert_eq!(f.tracker.add_token(usdt(None)).await.unwrap().decimals, 6);

		let unknown = NewToken {
			contract: "0xfeed".to_string(),
			symbol: "FEED".to_string(),
			..usdt(None)
		};
		assert_eq!(
			f.tracker.add_token(unknown).await.unwrap().decimals,
			DEFAULT_DECIMALS
		);
	}

	#[tokio::test]
	async fn fix_decimals_applies_known_table() {
		let f = fixture(Role::Admin);
		f.tracker.add_token(usdt(Some(18))).await.unwrap();
		f.tracker
			.add_token(NewToken {
				contract: "0xfeed".to_string(),
				symbol: "FEED".to_string(),
				..usdt(Some(9))
			})
			.await
			.unwrap();

		let report = f.tracker.fix_token_decimals().await.unwrap();
		assert_eq!(report, DecimalsFixReport { fixed: 1, total: 2 });
		let tokens = f.tracker.list_tokens().await.unwrap();
		assert_eq!(tokens[0].decimals, 6);
		assert_eq!(tokens[1].decimals, 9);

		let again = f.tracker.fix_token_decimals().await.unwrap();
		assert_eq!(again.fixed, 0);
	}

	#[tokio::test]
	async fn oversized_precision_is_rejected() {
		let f = fixture(Role::Admin);
		assert!(matches!(
			f.tracker.add_token(usdt(Some(4_000_000_000))).await,
			Err(TrackerError::Validation(_))
		));
		let token = f.tracker.add_token(usdt(Some(6))).await.unwrap();
		assert!(matches!(
			f.tracker.set_token_decimals(token.id, 78).await,
			Err(TrackerError::Validation(_))
		));
		assert_eq!(f.tracker.list_tokens().await.unwrap()[0].decimals, 6);
	}

	#[tokio::test]
	async fn removing_unknown_ids_is_not_found() {
		let f = fixture(Role::Admin);
		assert!(matches!(
			f.tracker.remove_wallet(42).await,
			Err(TrackerError::NotFound(_))
		));
		assert!(matches!(
			f.tracker.set_token_decimals(42, 6).await,
			Err(TrackerError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn unavailable_store_degrades_reads() {
		let f = fixture(Role::Admin);
		f.store.set_available(false);
		assert!(matches!(
			f.tracker.list_wallets().await,
			Err(TrackerError::StoreUnavailable(_))
		));
		assert!(matches!(
			f.tracker.recent_reconciliations(None).await,
			Err(TrackerError::StoreUnavailable(_))
		));

		let health = f.tracker.health().await;
		assert!(!health.store);
		assert!(health.etherscan && health.trongrid);
	}

	#[tokio::test]
	async fn health_reports_missing_keys() {
		let f = fixture(Role::Viewer);
		f.erc20.set_configured(false);
		assert_eq!(
			f.tracker.health().await,
			Health {
				store: true,
				etherscan: false,
				trongrid: true,
			}
		);
	}

	#[tokio::test]
	async fn streamed_sync_ends_with_done() {
		let f = fixture(Role::Admin);
		let mut events = f.tracker.stream_sync(0).await.unwrap();
		let mut last = None;
		while let Some(event) = events.recv().await {
			last = Some(event);
		}
		match last {
			Some(SyncEvent::Done(report)) => assert!(report.done),
			other => panic!("expected done event, got {other:?}"),
		}
	}
}
