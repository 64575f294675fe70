//! Synchronization Module
//!
//! This module drives every externally-rate-limited operation of the tracker:
//!
//! - `orchestrator`: paginated sync of transfers into the ledger, buffered or streamed.
//! - `scheduler`: builds the `(wallet, token)` task cross product and runs it in delayed batches.
//! - `balances`: paged on-chain balance refresh with an "error" sentinel per failed pair.
//! - `events`: typed log/progress/done events and the dispatcher that fans them out.
//! - `progress_tracker`: per-page counts and the list of failed pairs.
//! - `paging`: page windows, page-from-clock selection and the clock abstraction.

/// Paged balance refresh and cached balances
pub mod balances;
/// Event system for buffered and streamed sync output
pub mod events;
/// Main coordinator for paginated sync
pub mod orchestrator;
/// Page arithmetic and clocks
pub mod paging;
/// Tracks per-page progress and failures
pub mod progress_tracker;
/// Batched task execution
pub mod scheduler;
/// Scripted provider for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use balances::{BalancePage, BalanceRefresher, BalanceRow, ERROR_BALANCE};
pub use events::{Progress, SyncEvent};
pub use orchestrator::*;
pub use paging::{Clock, FixedClock, SystemClock, page_for_timestamp};
pub use progress_tracker::TaskFailure;
pub use scheduler::{BatchScheduler, FetchTask, TaskOutcome, TaskPair, plan_pairs};
