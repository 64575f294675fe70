//! Bounded linear retry shared by both indexer adapters.

use backoff::backoff::Backoff;
use backoff::future::retry_notify;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry settings: attempt `n` waits `n × base_delay`, for at most `max_retries` retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub base_delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_delay: Duration::from_millis(1000),
		}
	}
}

/// `backoff` schedule producing 1×, 2×, 3× ... the base delay, then giving up.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
	policy: RetryPolicy,
	attempt: u32,
}

impl LinearBackoff {
	pub fn new(policy: RetryPolicy) -> Self {
		Self { policy, attempt: 0 }
	}
}

impl Backoff for LinearBackoff {
	fn reset(&mut self) {
		self.attempt = 0;
	}

	fn next_backoff(&mut self) -> Option<Duration> {
		if self.attempt >= self.policy.max_retries {
			return None;
		}
		self.attempt += 1;
		Some(self.policy.base_delay * self.attempt)
	}
}

/// Run `operation` until it succeeds, fails with an error `is_retryable` rejects,
/// or the retry budget is spent. The last error is returned unchanged.
pub async fn retry_with_policy<T, E, F, Fut, P>(
	policy: RetryPolicy,
	is_retryable: P,
	mut operation: F,
) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	P: Fn(&E) -> bool,
	E: Display,
{
	let classify = &is_retryable;
	retry_notify(
		LinearBackoff::new(policy),
		move || {
			let attempt = operation();
			async move {
				attempt.await.map_err(|err| {
					if classify(&err) {
						backoff::Error::transient(err)
					} else {
						backoff::Error::permanent(err)
					}
				})
			}
		},
		|err: E, wait: Duration| {
			warn!("Retrying in {}ms after: {}", wait.as_millis(), err);
		},
	)
	.await
}
