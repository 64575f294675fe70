//! Batched fan-out of per-(wallet, token) provider calls.
//!
//! Tasks are executed in fixed-size batches. Every task in a batch runs concurrently, and the
//! scheduler pauses for the provider's delay window after each batch, so a run of `T` tasks with
//! batch size `B` and delay `D` takes at least `floor(T / B) × D`. A failing task only fails its
//! own outcome.

use crate::error::TrackerError;
use crate::provider::BatchPolicy;
use crate::registry::{Token, Wallet};
use futures::future::{BoxFuture, join_all};
use itertools::Itertools;
use tracing::debug;

/// The `(wallet, token)` a task is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPair {
	pub wallet: Wallet,
	pub token: Token,
}

impl TaskPair {
	/// Log heading for the pair, e.g. `Treasury - USDT (ERC20)`.
	pub fn label(&self) -> String {
		format!(
			"{} - {} ({})",
			self.wallet.display_label(),
			self.token.symbol,
			self.wallet.network
		)
	}
}

/// Cross product of wallets and tokens, keeping only same-network pairs.
/// Wallet order is preserved, then token order within each wallet.
pub fn plan_pairs(wallets: &[Wallet], tokens: &[Token]) -> Vec<TaskPair> {
	wallets
		.iter()
		.cartesian_product(tokens.iter())
		.filter(|(wallet, token)| wallet.network == token.network)
		.map(|(wallet, token)| TaskPair {
			wallet: wallet.clone(),
			token: token.clone(),
		})
		.collect()
}

type TaskFn<T> = Box<dyn FnOnce(TaskPair) -> BoxFuture<'static, Result<T, TrackerError>> + Send>;

/// A pair together with the deferred call to make for it.
pub struct FetchTask<T> {
	pub pair: TaskPair,
	run: TaskFn<T>,
}

impl<T> FetchTask<T> {
	pub fn new<F>(pair: TaskPair, run: F) -> Self
	where
		F: FnOnce(TaskPair) -> BoxFuture<'static, Result<T, TrackerError>> + Send + 'static,
	{
		Self {
			pair,
			run: Box::new(run),
		}
	}
}

/// What one task produced.
#[derive(Debug)]
pub struct TaskOutcome<T> {
	pub pair: TaskPair,
	pub result: Result<T, TrackerError>,
}

/// Executes tasks under one provider's [`BatchPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
	policy: BatchPolicy,
}

impl BatchScheduler {
	pub fn new(policy: BatchPolicy) -> Self {
		Self { policy }
	}

	pub fn policy(&self) -> BatchPolicy {
		self.policy
	}

	/// Split tasks into batches of at most `batch_size`, preserving order.
	pub fn batches<T>(&self, tasks: Vec<FetchTask<T>>) -> Vec<Vec<FetchTask<T>>> {
		let chunks = tasks.into_iter().chunks(self.policy.batch_size);
		let batches = chunks.into_iter().map(|chunk| chunk.collect()).collect();
		batches
	}

	/// Run one batch concurrently. Outcomes come back in task order.
	pub async fn run_batch<T>(&self, batch: Vec<FetchTask<T>>) -> Vec<TaskOutcome<T>> {
		let size = batch.len();
		let outcomes = join_all(batch.into_iter().map(|task| async move {
			let FetchTask { pair, run } = task;
			let result = run(pair.clone()).await;
			TaskOutcome { pair, result }
		}))
		.await;

		let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
		debug!("Batch of {} finished, {} failed", size, failed);
		outcomes
	}

	/// The delay window that follows every batch.
	pub async fn pause(&self) {
		if !self.policy.delay.is_zero() {
			tokio::time::sleep(self.policy.delay).await;
		}
	}

	/// Run every task, batch by batch.
	pub async fn run_all<T>(&self, tasks: Vec<FetchTask<T>>) -> Vec<TaskOutcome<T>> {
		let mut outcomes = Vec::with_capacity(tasks.len());
		for batch in self.batches(tasks) {
			outcomes.extend(self.run_batch(batch).await);
			self.pause().await;
		}
		outcomes
	}
}
