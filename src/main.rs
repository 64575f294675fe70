use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wallet_ledger_sync::auth::StaticAuthGate;
use wallet_ledger_sync::config::Config;
use wallet_ledger_sync::ledger::{JsonFileStore, LedgerTransaction, TransactionFilter};
use wallet_ledger_sync::provider::ProviderSet;
use wallet_ledger_sync::registry::{Network, NewToken, NewWallet};
use wallet_ledger_sync::sync::{BalanceRow, SyncEvent};
use wallet_ledger_sync::utils::{format_token_amount, shorten_address, transaction_url};
use wallet_ledger_sync::Tracker;

#[derive(Parser)]
#[command(name = "wallet-ledger-sync", version, about = "Multi-chain wallet ledger sync and reconciliation")]
struct Cli {
	#[command(flatten)]
	config: Config,
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Manage tracked wallets
	#[command(subcommand)]
	Wallet(WalletCommand),
	/// Manage tracked tokens
	#[command(subcommand)]
	Token(TokenCommand),
	/// Sync transfers into the ledger
	Sync {
		#[arg(long, default_value_t = 0)]
		page: usize,
		/// Sync every page in order
		#[arg(long, conflicts_with_all = ["scheduled", "stream"])]
		all: bool,
		/// Pick the page from the clock
		#[arg(long, conflicts_with = "stream")]
		scheduled: bool,
		/// Print events as JSON lines while the page runs
		#[arg(long)]
		stream: bool,
	},
	/// Show balances
	Balances {
		/// Fetch live balances instead of reading the cache
		#[arg(long)]
		refresh: bool,
		#[arg(long, default_value_t = 0)]
		page: usize,
	},
	/// List ledger transactions, newest first
	Transactions {
		#[arg(long)]
		network: Option<Network>,
		#[arg(long)]
		wallet: Option<String>,
		#[arg(long)]
		limit: Option<usize>,
	},
	/// Reconcile ledger sums against live balances
	Reconcile {
		/// Show recent records instead of running
		#[arg(long)]
		history: bool,
		#[arg(long)]
		limit: Option<usize>,
	},
	/// Report provider credentials and store reachability
	Health,
}

#[derive(Subcommand)]
enum WalletCommand {
	List,
	Add {
		#[arg(long)]
		network: Network,
		#[arg(long)]
		address: String,
		#[arg(long)]
		label: Option<String>,
	},
	/// Import addresses from arguments or from a file with one address per line
	Bulk {
		#[arg(long)]
		network: Network,
		#[arg(long)]
		file: Option<PathBuf>,
		addresses: Vec<String>,
	},
	Label {
		id: u64,
		label: Option<String>,
	},
	Remove {
		id: u64,
	},
}

#[derive(Subcommand)]
enum TokenCommand {
	List,
	Add {
		#[arg(long)]
		network: Network,
		#[arg(long)]
		contract: String,
		#[arg(long)]
		symbol: String,
		#[arg(long)]
		decimals: Option<u32>,
	},
	Remove {
		id: u64,
	},
	/// Set a token's precision explicitly
	Decimals {
		id: u64,
		decimals: u32,
	},
	/// Apply the known-token precision table to the registry
	FixDecimals,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let cli = Cli::parse();
	let config = cli.config;

	let store = JsonFileStore::open(&config.data_dir)
		.await
		.with_context(|| format!("opening store in {}", config.data_dir.display()))?;
	let providers = ProviderSet::from_configs(config.etherscan(), config.trongrid())
		.context("building provider clients")?;
	let tracker = Tracker::new(
		Arc::new(store),
		providers,
		Arc::new(StaticAuthGate::new(config.role)),
		config.tracker_settings(),
	);
	info!("Tracker ready with data in {}", config.data_dir.display());

	match cli.command {
		Command::Wallet(command) => run_wallet(&tracker, command).await,
		Command::Token(command) => run_token(&tracker, command).await,
		Command::Sync {
			page,
			all,
			scheduled,
			stream,
		} => {
			if all {
				print_json(&tracker.sync_all().await?)
			} else if scheduled {
				print_json(&tracker.sync_scheduled().await?)
			} else if stream {
				let mut events = tracker.stream_sync(page).await?;
				while let Some(event) = events.recv().await {
					println!("{}", serde_json::to_string(&event)?);
					if matches!(event, SyncEvent::Done(_)) {
						break;
					}
				}
				Ok(())
			} else {
				print_json(&tracker.sync_page(page).await?)
			}
		}
		Command::Balances { refresh, page } => {
			if refresh {
				let balances = tracker.refresh_balances(page).await?;
				print_json(&json!({
					"results": balances.results.iter().map(balance_view).collect::<Vec<_>>(),
					"page": balances.page,
					"totalPages": balances.total_pages,
					"done": balances.done,
				}))
			} else {
				let rows = tracker.cached_balances().await?;
				print_json(&rows.iter().map(balance_view).collect::<Vec<_>>())
			}
		}
		Command::Transactions {
			network,
			wallet,
			limit,
		} => {
			let transactions = tracker
				.list_transactions(TransactionFilter {
					network,
					wallet,
					limit,
				})
				.await?;
			print_json(&transactions.iter().map(transaction_view).collect::<Vec<_>>())
		}
		Command::Reconcile { history, limit } => {
			if history {
				print_json(&tracker.recent_reconciliations(limit).await?)
			} else {
				print_json(&tracker.run_reconciliation().await?)
			}
		}
		Command::Health => print_json(&tracker.health().await),
	}
}

async fn run_wallet(tracker: &Tracker, command: WalletCommand) -> anyhow::Result<()> {
	match command {
		WalletCommand::List => print_json(&tracker.list_wallets().await?),
		WalletCommand::Add {
			network,
			address,
			label,
		} => print_json(
			&tracker
				.add_wallet(NewWallet {
					network,
					address,
					label,
				})
				.await?,
		),
		WalletCommand::Bulk {
			network,
			file,
			mut addresses,
		} => {
			if let Some(file) = file {
				let contents = tokio::fs::read_to_string(&file)
					.await
					.with_context(|| format!("reading {}", file.display()))?;
				addresses.extend(contents.lines().map(str::to_string));
			}
			print_json(&tracker.bulk_add_wallets(network, &addresses).await?)
		}
		WalletCommand::Label { id, label } => {
			print_json(&tracker.set_wallet_label(id, label.as_deref()).await?)
		}
		WalletCommand::Remove { id } => print_json(&tracker.remove_wallet(id).await?),
	}
}

async fn run_token(tracker: &Tracker, command: TokenCommand) -> anyhow::Result<()> {
	match command {
		TokenCommand::List => print_json(&tracker.list_tokens().await?),
		TokenCommand::Add {
			network,
			contract,
			symbol,
			decimals,
		} => print_json(
			&tracker
				.add_token(NewToken {
					network,
					contract,
					symbol,
					decimals,
				})
				.await?,
		),
		TokenCommand::Remove { id } => print_json(&tracker.remove_token(id).await?),
		TokenCommand::Decimals { id, decimals } => {
			print_json(&tracker.set_token_decimals(id, decimals).await?)
		}
		TokenCommand::FixDecimals => print_json(&tracker.fix_token_decimals().await?),
	}
}

/// Balance row plus a human-readable amount.
fn balance_view(row: &BalanceRow) -> Value {
	let mut view = serde_json::to_value(row).unwrap_or(Value::Null);
	if let Value::Object(fields) = &mut view {
		fields.insert(
			"short".to_string(),
			Value::String(shorten_address(&row.wallet, 6)),
		);
		if let Ok(formatted) = format_token_amount(&row.balance, row.decimals) {
			fields.insert("formatted".to_string(), Value::String(formatted));
		}
	}
	view
}

/// Ledger row plus its explorer link.
fn transaction_view(tx: &LedgerTransaction) -> Value {
	let mut view = serde_json::to_value(tx).unwrap_or(Value::Null);
	if let Value::Object(fields) = &mut view {
		fields.insert(
			"explorerUrl".to_string(),
			Value::String(transaction_url(tx.network, &tx.hash)),
		);
	}
	view
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
