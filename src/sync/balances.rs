//! Paged on-chain balance refresh and the cached balance view.

use crate::error::TrackerError;
use crate::ledger::{BalanceSnapshot, BalanceStore, RegistryStore, Store};
use crate::provider::ProviderSet;
use crate::registry::{DecimalsResolver, Network, Wallet};
use crate::sync::paging;
use crate::sync::scheduler::{BatchScheduler, FetchTask, TaskOutcome, plan_pairs};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Balance marker for pairs whose fetch failed.
pub const ERROR_BALANCE: &str = "error";

/// One wallet/token balance as shown to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRow {
	pub wallet: String,
	pub wallet_label: Option<String>,
	pub network: Network,
	/// Token symbol
	pub token: String,
	pub contract: String,
	/// Resolved precision for display
	pub decimals: u32,
	/// Raw minor-unit balance, or [`ERROR_BALANCE`]
	pub balance: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
}

impl BalanceRow {
	pub fn is_error(&self) -> bool {
		self.balance == ERROR_BALANCE
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePage {
	pub results: Vec<BalanceRow>,
	pub page: usize,
	pub total_pages: usize,
	pub done: bool,
}

pub struct BalanceRefresher {
	store: Arc<dyn Store>,
	providers: ProviderSet,
	resolver: DecimalsResolver,
	page_size: usize,
}

impl BalanceRefresher {
	pub fn new(
		store: Arc<dyn Store>,
		providers: ProviderSet,
		resolver: DecimalsResolver,
		page_size: usize,
	) -> Self {
		Self {
			store,
			providers,
			resolver,
			page_size: page_size.max(1),
		}
	}

	/// Fetch live balances for every `(wallet, token)` pair on `page` and cache the successes.
	///
	/// A failed pair yields a row with the `"error"` balance; a cache write failure is logged and
	/// does not affect the returned row. A fatal error such as a missing API key aborts the page
	/// once the current batch settles.
	pub async fn refresh_page(&self, page: usize) -> Result<BalancePage, TrackerError> {
		let (wallets, tokens) =
			tokio::try_join!(self.store.list_wallets(), self.store.list_tokens())?;
		let total_pages = paging::total_pages(wallets.len(), self.page_size);
		let window = paging::page_window(page, self.page_size, wallets.len());
		let pairs = plan_pairs(&wallets[window], &tokens);

		for network in pairs.iter().map(|pair| pair.wallet.network).unique() {
			self.providers.for_network(network).ensure_configured()?;
		}
		info!(
			"Refreshing balances for page {}/{} ({} pairs)",
			page + 1,
			total_pages,
			pairs.len()
		);

		let mut results = Vec::with_capacity(pairs.len());
		for network in Network::ALL {
			let provider = self.providers.for_network(network);
			let scheduler = BatchScheduler::new(provider.batch_policy());
			let tasks: Vec<FetchTask<String>> = pairs
				.iter()
				.filter(|pair| pair.wallet.network == network)
				.map(|pair| {
					let provider = provider.clone();
					FetchTask::new(pair.clone(), move |pair| {
						async move {
							provider
								.fetch_balance(&pair.wallet.address, Some(&pair.token.contract))
								.await
								.map_err(TrackerError::from)
						}
						.boxed()
					})
				})
				.collect();

			for batch in scheduler.batches(tasks) {
				let mut fatal = None;
				for outcome in scheduler.run_batch(batch).await {
					match outcome.result {
						Err(e) if e.is_fatal() => {
							fatal.get_or_insert(e);
						}
						result => {
							let outcome = TaskOutcome {
								pair: outcome.pair,
								result,
							};
							results.push(self.settle(outcome).await);
						}
					}
				}
				if let Some(e) = fatal {
					error!("Balance refresh of page {} aborted: {}", page, e);
					return Err(e);
				}
				scheduler.pause().await;
			}
		}

		Ok(BalancePage {
			results,
			page,
			total_pages,
			done: paging::is_last_page(page, total_pages),
		})
	}

	async fn settle(&self, outcome: TaskOutcome<String>) -> BalanceRow {
		let TaskOutcome { pair, result } = outcome;
		let decimals = self.resolver.resolve(&pair.token.contract, pair.token.decimals);
		let mut row = BalanceRow {
			wallet: pair.wallet.address.clone(),
			wallet_label: pair.wallet.label.clone(),
			network: pair.wallet.network,
			token: pair.token.symbol.clone(),
			contract: pair.token.contract.clone(),
			decimals,
			balance: ERROR_BALANCE.to_string(),
			error: None,
			updated_at: None,
		};

		match result {
			Ok(balance) => {
				let snapshot = BalanceSnapshot {
					network: pair.wallet.network,
					wallet: pair.wallet.address.clone(),
					contract: pair.token.contract.clone(),
					symbol: pair.token.symbol.clone(),
					balance: balance.clone(),
					decimals,
					updated_at: Utc::now(),
				};
				row.updated_at = Some(snapshot.updated_at);
				if let Err(e) = self.store.upsert_balance(snapshot).await {
					warn!("Balance cache write failed for {}: {}", pair.label(), e);
				}
				row.balance = balance;
			}
			Err(e) => {
				warn!("Balance fetch failed for {}: {}", pair.label(), e);
				row.error = Some(e.to_string());
			}
		}
		row
	}

	/// Cached balances, most recently refreshed first, labelled from the registry.
	pub async fn cached(&self) -> Result<Vec<BalanceRow>, TrackerError> {
		let (snapshots, wallets) =
			tokio::try_join!(self.store.list_balances(), self.store.list_wallets())?;
		let labels: HashMap<(Network, &str), &Wallet> = wallets
			.iter()
			.map(|wallet| ((wallet.network, wallet.address.as_str()), wallet))
			.collect();

		Ok(snapshots
			.into_iter()
			.map(|snapshot| BalanceRow {
				wallet_label: labels
					.get(&(snapshot.network, snapshot.wallet.as_str()))
					.and_then(|wallet| wallet.label.clone()),
				wallet: snapshot.wallet,
				network: snapshot.network,
				token: snapshot.symbol,
				contract: snapshot.contract,
				decimals: snapshot.decimals,
				balance: snapshot.balance,
				error: None,
				updated_at: Some(snapshot.updated_at),
			})
			.collect())
	}
}
