//! Paginated sync orchestrator.
//!
//! This module defines the `SyncOrchestrator`, the top-level driver of a sync run. One invocation
//! handles one page of the wallet list:
//! - The wallet list, ordered by creation, is sliced into fixed-size pages.
//! - Every `(wallet, same-network token)` pair on the page becomes a fetch-and-record task.
//! - Tasks run through a `BatchScheduler` per network, honouring that provider's rate limit.
//! - Each finished task emits log and progress events; the page ends with a `done` event.
//!
//! Nothing is kept between invocations except the ledger itself. A caller wanting full coverage
//! loops pages until `done`, or lets `sync_scheduled` pick a page from the clock. Because ledger
//! writes are idempotent per key, abandoning a run between batches or pages leaves no partial
//! state to clean up.

use crate::error::TrackerError;
use crate::ledger::{LedgerWriter, RegistryStore, Store, WriteSummary};
use crate::provider::{ChainProvider, ProviderSet};
use crate::registry::Network;
use crate::sync::{
    events::{ChannelForwarder, EventDispatcher, SyncEvent, TracingHandler},
    paging::{self, Clock, SystemClock},
    progress_tracker::{PageProgressTracker, TaskFailure},
    scheduler::{BatchScheduler, FetchTask, TaskOutcome, TaskPair, plan_pairs},
};

use futures::FutureExt;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub const NO_WALLETS: &str = "No wallets found. Add wallets first.";
pub const NO_TOKENS: &str = "No tokens found. Add tokens (USDT, USDC) first.";

/// Result of one sync page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReport {
    /// Transfers recorded on this page, whether new or already in the ledger
    pub synced: usize,
    /// Transfers that created new ledger rows
    pub inserted: usize,
    pub page: usize,
    pub total_pages: usize,
    /// `page + 1 >= total_pages`
    pub done: bool,
    pub logs: Vec<String>,
    pub failures: Vec<TaskFailure>,
    /// Set when a fatal error aborted the page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageReport {
    fn empty(page: usize, total_pages: usize, logs: Vec<String>) -> Self {
        Self {
            synced: 0,
            inserted: 0,
            page,
            total_pages,
            done: true,
            logs,
            failures: Vec::new(),
            error: None,
        }
    }

    /// Terminal report of a page aborted by `error`.
    pub fn aborted(page: usize, error: &TrackerError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::empty(page, 0, vec![format!("FATAL ERROR: {error}")])
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Sync page {}/{}: {} transactions saved ({} new), {} failed tasks{}",
            self.page + 1,
            self.total_pages.max(1),
            self.synced,
            self.inserted,
            self.failures.len(),
            if self.done { ", done" } else { "" }
        )
    }
}

/// What a successful sync task produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTaskResult {
    /// Transfers the provider returned
    pub found: usize,
    pub written: WriteSummary,
}

/// Main sync orchestrator.
pub struct SyncOrchestrator {
    store: Arc<dyn Store>,
    providers: ProviderSet,
    writer: Arc<LedgerWriter>,
    page_size: usize,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl SyncOrchestrator {
    /// Create an orchestrator paging `page_size` wallets at a time.
    pub fn new(store: Arc<dyn Store>, providers: ProviderSet, page_size: usize) -> Self {
        Self {
            writer: Arc::new(LedgerWriter::new(store.clone())),
            store,
            providers,
            page_size: page_size.max(1),
            interval: Duration::from_secs(300),
            clock: Arc::new(SystemClock),
        }
    }

    /// Cron interval used by [`SyncOrchestrator::sync_scheduled`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Sync one page, buffering logs into the report.
    pub async fn sync_page(&self, page: usize) -> Result<PageReport, TrackerError> {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_handler(Box::new(TracingHandler));
        self.run_page(page, &mut dispatcher).await
    }

    /// Sync one page, additionally forwarding every event to `sender` as it happens.
    ///
    /// If the receiver is dropped the run stops at the next batch boundary with
    /// [`TrackerError::Cancelled`]; everything written up to then stays written.
    pub async fn sync_page_streaming(
        &self,
        page: usize,
        sender: mpsc::Sender<SyncEvent>,
    ) -> Result<PageReport, TrackerError> {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_handler(Box::new(TracingHandler));
        dispatcher.register_handler(Box::new(ChannelForwarder::new(sender)));
        self.run_page(page, &mut dispatcher).await
    }

    /// Spawn a producer task for `page` and hand back the event stream.
    ///
    /// The stream always ends with a `done` event unless the consumer leaves first. A fatal
    /// error produces a `FATAL ERROR:` log line and a `done` report carrying `error`.
    pub fn stream_page(self: Arc<Self>, page: usize, buffer: usize) -> mpsc::Receiver<SyncEvent> {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        tokio::spawn(async move {
            match self.sync_page_streaming(page, sender.clone()).await {
                Ok(_) => {}
                Err(TrackerError::Cancelled) => info!("Streamed sync of page {} abandoned", page),
                Err(e) => {
                    error!("Streamed sync of page {} failed: {}", page, e);
                    let report = PageReport::aborted(page, &e);
                    for line in &report.logs {
                        let _ = sender.send(SyncEvent::Log(line.clone())).await;
                    }
                    let _ = sender.send(SyncEvent::Done(report)).await;
                }
            }
        });
        receiver
    }

    /// Sync every page in order until the last one reports `done`.
    pub async fn sync_all(&self) -> Result<Vec<PageReport>, TrackerError> {
        let mut reports = Vec::new();
        let mut page = 0;
        loop {
            let report = self.sync_page(page).await?;
            let done = report.done;
            reports.push(report);
            if done {
                break;
            }
            page += 1;
        }
        Ok(reports)
    }

    /// Sync the page selected by the clock, for unattended periodic runs.
    pub async fn sync_scheduled(&self) -> Result<PageReport, TrackerError> {
        let wallets = self.store.list_wallets().await?;
        let total_pages = paging::total_pages(wallets.len(), self.page_size);
        let page = paging::page_for_timestamp(self.clock.now(), self.interval, total_pages);
        info!("Scheduled sync selected page {} of {}", page, total_pages);
        self.sync_page(page).await
    }

    async fn run_page(
        &self,
        page: usize,
        dispatcher: &mut EventDispatcher,
    ) -> Result<PageReport, TrackerError> {
        let (wallets, tokens) =
            tokio::try_join!(self.store.list_wallets(), self.store.list_tokens())?;

        if wallets.is_empty() || tokens.is_empty() {
            let reason = if wallets.is_empty() { NO_WALLETS } else { NO_TOKENS };
            let mut run = PageRun::new(dispatcher, 0);
            run.log(reason.to_string()).await;
            return Ok(run.finish(PageReport::empty(page, 0, Vec::new())).await);
        }

        let total_pages = paging::total_pages(wallets.len(), self.page_size);
        let window = paging::page_window(page, self.page_size, wallets.len());
        let pairs = plan_pairs(&wallets[window.clone()], &tokens);
        info!(
            "Sync page {}/{}: {} wallets, {} tasks",
            page + 1,
            total_pages,
            window.len(),
            pairs.len()
        );

        for network in pairs.iter().map(|pair| pair.wallet.network).unique() {
            self.providers.for_network(network).ensure_configured()?;
        }

        let mut run = PageRun::new(dispatcher, pairs.len());
        for network in Network::ALL {
            let provider = self.providers.for_network(network);
            let scheduler = BatchScheduler::new(provider.batch_policy());
            let tasks: Vec<_> = pairs
                .iter()
                .filter(|pair| pair.wallet.network == network)
                .map(|pair| self.sync_task(pair.clone(), provider.clone()))
                .collect();

            for batch in scheduler.batches(tasks) {
                if run.cancelled() {
                    warn!("Sync page {} cancelled between batches", page);
                    return Err(TrackerError::Cancelled);
                }
                let mut fatal = None;
                for outcome in scheduler.run_batch(batch).await {
                    match outcome.result {
                        Err(e) if e.is_fatal() => {
                            run.log(outcome.pair.label()).await;
                            run.log(format!("  ERROR: {e}")).await;
                            fatal.get_or_insert(e);
                        }
                        result => {
                            run.record(TaskOutcome {
                                pair: outcome.pair,
                                result,
                            })
                            .await
                        }
                    }
                }
                if let Some(e) = fatal {
                    error!("Sync page {} aborted: {}", page, e);
                    return Err(e);
                }
                scheduler.pause().await;
            }
        }

        let report = PageReport {
            done: paging::is_last_page(page, total_pages),
            ..PageReport::empty(page, total_pages, Vec::new())
        };
        Ok(run.finish(report).await)
    }

    fn sync_task(
        &self,
        pair: TaskPair,
        provider: Arc<dyn ChainProvider>,
    ) -> FetchTask<SyncTaskResult> {
        let writer = self.writer.clone();
        FetchTask::new(pair, move |pair| sync_pair(provider, writer, pair).boxed())
    }
}

/// Fetch the pair's transfers and record them in the ledger.
async fn sync_pair(
    provider: Arc<dyn ChainProvider>,
    writer: Arc<LedgerWriter>,
    pair: TaskPair,
) -> Result<SyncTaskResult, TrackerError> {
    let transfers = provider
        .fetch_transactions(&pair.wallet.address, Some(&pair.token.contract))
        .await?;
    let written = writer
        .record(&pair.wallet, Some(&pair.token), &transfers)
        .await?;
    Ok(SyncTaskResult {
        found: transfers.len(),
        written,
    })
}

/// Per-page bookkeeping: logs, progress and the event stream.
struct PageRun<'a> {
    dispatcher: &'a mut EventDispatcher,
    tracker: PageProgressTracker,
    logs: Vec<String>,
}

impl<'a> PageRun<'a> {
    fn new(dispatcher: &'a mut EventDispatcher, total_tasks: usize) -> Self {
        Self {
            dispatcher,
            tracker: PageProgressTracker::new(total_tasks),
            logs: Vec::new(),
        }
    }

    fn cancelled(&self) -> bool {
        self.dispatcher.is_cancelled()
    }

    async fn log(&mut self, line: String) {
        self.logs.push(line.clone());
        self.dispatcher.dispatch(&SyncEvent::Log(line)).await;
    }

    async fn record(&mut self, outcome: TaskOutcome<SyncTaskResult>) {
        let TaskOutcome { pair, result } = outcome;
        self.log(pair.label()).await;

        let progress = match result {
            Ok(result) => {
                self.log(format!(
                    "  Found {} {} transactions",
                    result.found, pair.token.symbol
                ))
                .await;
                self.log(format!("  Saved {} transactions", result.written.processed))
                    .await;
                self.tracker.record_success(result.written)
            }
            Err(e) => {
                self.log(format!("  ERROR: {e}")).await;
                self.tracker.record_failure(TaskFailure {
                    label: pair.label(),
                    wallet: pair.wallet.address.clone(),
                    contract: pair.token.contract.clone(),
                    error: e.to_string(),
                })
            }
        };
        self.dispatcher.dispatch(&SyncEvent::Progress(progress)).await;
    }

    /// Fill the report with this run's counts and logs and emit `done`.
    async fn finish(self, mut report: PageReport) -> PageReport {
        let stats = self.tracker.get_stats();
        report.synced = stats.processed;
        report.inserted = stats.inserted;
        report.logs = self.logs;
        report.failures = self.tracker.into_failures();
        self.dispatcher.dispatch(&SyncEvent::Done(report.clone())).await;
        report
    }
}
