//! Progress tracking for a sync page.
//!
//! `PageProgressTracker` counts finished tasks against the planned total, accumulates how many
//! ledger rows were written, and keeps the failed pairs so the caller can retry just those.

use crate::ledger::WriteSummary;
use crate::sync::events::Progress;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A `(wallet, token)` task that failed, with enough context to retry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailure {
    /// Log heading of the pair
    pub label: String,
    pub wallet: String,
    pub contract: String,
    pub error: String,
}

/// Tracks task completion within one page.
#[derive(Debug, Clone)]
pub struct PageProgressTracker {
    total_tasks: usize,
    completed: usize,
    /// Transfers handed to the ledger
    processed: usize,
    /// Transfers that created new rows
    inserted: usize,
    /// Transfers dropped as malformed
    rejected: usize,
    failures: Vec<TaskFailure>,
}

impl PageProgressTracker {
    pub fn new(total_tasks: usize) -> Self {
        Self {
            total_tasks,
            completed: 0,
            processed: 0,
            inserted: 0,
            rejected: 0,
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self, summary: WriteSummary) -> Progress {
        self.processed += summary.processed;
        self.inserted += summary.inserted;
        self.rejected += summary.rejected;
        self.completed += 1;
        self.progress()
    }

    pub fn record_failure(&mut self, failure: TaskFailure) -> Progress {
        warn!("Task {} failed: {}", failure.label, failure.error);
        self.failures.push(failure);
        self.completed += 1;
        self.progress()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            current: self.completed,
            total: self.total_tasks,
        }
    }

    pub fn get_stats(&self) -> PageStats {
        PageStats {
            total_tasks: self.total_tasks,
            completed: self.completed,
            processed: self.processed,
            inserted: self.inserted,
            rejected: self.rejected,
            failed: self.failures.len(),
        }
    }

    pub fn into_failures(self) -> Vec<TaskFailure> {
        self.failures
    }
}

/// Counts for a finished (or abandoned) page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStats {
    pub total_tasks: usize,
    pub completed: usize,
    pub processed: usize,
    pub inserted: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl PageStats {
    pub fn summary(&self) -> String {
        format!(
            "{}/{} tasks: {} transactions saved ({} new){}{}",
            self.completed,
            self.total_tasks,
            self.processed,
            self.inserted,
            if self.rejected == 0 {
                String::new()
            } else {
                format!(", {} malformed", self.rejected)
            },
            if self.failed == 0 {
                String::new()
            } else {
                format!(", {} failed", self.failed)
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_successes_and_failures() {
        let mut tracker = PageProgressTracker::new(3);
        let progress = tracker.record_success(WriteSummary {
            processed: 4,
            inserted: 1,
            rejected: 0,
        });
        assert_eq!(progress, Progress { current: 1, total: 3 });

        tracker.record_failure(TaskFailure {
            label: "w - USDT (ERC20)".to_string(),
            wallet: "0xw".to_string(),
            contract: "0xc".to_string(),
            error: "Rate limit: Max calls per sec".to_string(),
        });

        let stats = tracker.get_stats();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.processed, 4);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.summary(), "2/3 tasks: 4 transactions saved (1 new), 1 failed");
        assert_eq!(tracker.into_failures().len(), 1);
    }
}
