use chrono::{TimeZone, Utc};
use std::sync::Arc;

use wallet_ledger_sync::auth::{Role, StaticAuthGate};
use wallet_ledger_sync::ledger::{
	Direction, MemoryStore, ReconciliationStatus, RegistryStore, TransactionFilter,
};
use wallet_ledger_sync::provider::{ProviderSet, RawTransaction};
use wallet_ledger_sync::registry::{DEFAULT_DECIMALS, NewWallet, Network};
use wallet_ledger_sync::sync::testing::MockProvider;
use wallet_ledger_sync::utils::format_token_amount;
use wallet_ledger_sync::{Tracker, TrackerSettings};

const WALLET: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";
const USDT: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";

fn deposit() -> RawTransaction {
	RawTransaction {
		hash: "0xdeposit".to_string(),
		from: "0x0000000000000000000000000000000000000001".to_string(),
		to: WALLET.to_lowercase(),
		value: "1000000".to_string(),
		timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
		block_number: 19_000_000,
		gas_used: Some("52000".to_string()),
		gas_price: Some("30000000000".to_string()),
		failed: false,
		contract: Some(USDT.to_lowercase()),
	}
}

#[tokio::test]
async fn sync_then_reconcile_a_corrected_stablecoin() {
	let store = Arc::new(MemoryStore::new());
	let erc20 = Arc::new(MockProvider::new(Network::Erc20));
	let tracker = Tracker::new(
		store.clone(),
		ProviderSet::new(erc20.clone(), Arc::new(MockProvider::new(Network::Trc20))),
		Arc::new(StaticAuthGate::new(Role::Admin)),
		TrackerSettings::default(),
	);

	tracker
		.add_wallet(NewWallet {
			network: Network::Erc20,
			address: WALLET.to_string(),
			label: Some("Exchange hot wallet".to_string()),
		})
		.await
		.unwrap();
	// Registered before precision correction existed, so it carries the generic default.
	let token = store
		.insert_token(Network::Erc20, USDT, "USDT", DEFAULT_DECIMALS)
		.await
		.unwrap();

	erc20.set_transactions(WALLET, Some(USDT), vec![deposit()]);
	erc20.set_balance(WALLET, Some(USDT), "1000000");

	let report = tracker.sync_page(0).await.unwrap();
	assert_eq!((report.synced, report.inserted), (1, 1));
	assert!(report.done);
	assert!(report.failures.is_empty());

	// Running the same page again adds nothing.
	let again = tracker.sync_page(0).await.unwrap();
	assert_eq!((again.synced, again.inserted), (1, 0));

	let ledger = tracker
		.list_transactions(TransactionFilter::default())
		.await
		.unwrap();
	assert_eq!(ledger.len(), 1);
	assert_eq!(ledger[0].direction, Direction::In);
	assert_eq!(ledger[0].amount, "1000000");
	assert_eq!(ledger[0].fee.as_deref(), Some("1560000000000000"));

	let decimals = tracker.resolver().resolve(&token.contract, token.decimals);
	assert_eq!(decimals, 6);

	let reconciliation = tracker.run_reconciliation().await.unwrap();
	let usdt = reconciliation
		.records
		.iter()
		.find(|record| record.symbol == "USDT")
		.unwrap();
	assert_eq!(usdt.expected_balance, "1000000");
	assert_eq!(usdt.actual_balance, "1000000");
	assert_eq!(usdt.difference, "0");
	assert_eq!(usdt.status, ReconciliationStatus::Ok);

	assert_eq!(format_token_amount(&usdt.actual_balance, decimals).unwrap(), "1");

	let balances = tracker.refresh_balances(0).await.unwrap();
	assert_eq!(balances.results.len(), 1);
	assert_eq!(balances.results[0].decimals, 6);
	assert_eq!(balances.results[0].balance, "1000000");

	let recent = tracker.recent_reconciliations(None).await.unwrap();
	assert_eq!(recent.len(), reconciliation.records.len());
}

#[tokio::test]
async fn every_page_is_visited_once() {
	let store = Arc::new(MemoryStore::new());
	let erc20 = Arc::new(MockProvider::new(Network::Erc20));
	let tracker = Tracker::new(
		store.clone(),
		ProviderSet::new(erc20.clone(), Arc::new(MockProvider::new(Network::Trc20))),
		Arc::new(StaticAuthGate::new(Role::Admin)),
		TrackerSettings::default(),
	);

	let addresses: Vec<String> = (0..7).map(|i| format!("0xwallet{i}")).collect();
	tracker
		.bulk_add_wallets(Network::Erc20, &addresses)
		.await
		.unwrap();
	store
		.insert_token(Network::Erc20, USDT, "USDT", 6)
		.await
		.unwrap();

	let reports = tracker.sync_all().await.unwrap();
	assert_eq!(reports.len(), 3);
	assert!(reports.iter().all(|r| r.total_pages == 3));
	assert_eq!(
		reports.iter().map(|r| r.done).collect::<Vec<_>>(),
		vec![false, false, true]
	);

	let mut calls = erc20.transaction_calls();
	calls.sort();
	assert_eq!(calls, addresses);
}
