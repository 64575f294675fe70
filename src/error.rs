//! Top-level error type returned by every tracker operation.

use crate::ledger::{AmountError, StoreError};
use crate::provider::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
	/// A required provider credential or setting is missing.
	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error("Provider error: {0}")]
	Provider(ProviderError),

	#[error("Store unavailable: {0}")]
	StoreUnavailable(String),

	#[error("Store error: {0}")]
	Store(StoreError),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Validation error: {0}")]
	Validation(String),

	#[error("Unauthorized")]
	Unauthorized,

	#[error("Forbidden: {0} requires the admin role")]
	Forbidden(&'static str),

	#[error(transparent)]
	InvalidAmount(#[from] AmountError),

	/// The consumer of a streamed run went away.
	#[error("Sync cancelled by consumer")]
	Cancelled,
}

impl TrackerError {
	/// Failures that abort a whole page or run rather than a single task.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			TrackerError::Configuration(_) | TrackerError::StoreUnavailable(_) | TrackerError::Cancelled
		)
	}
}

impl From<ProviderError> for TrackerError {
	fn from(err: ProviderError) -> Self {
		if err.is_configuration() {
			TrackerError::Configuration(err.to_string())
		} else {
			TrackerError::Provider(err)
		}
	}
}

impl From<StoreError> for TrackerError {
	fn from(err: StoreError) -> Self {
		match err {
			StoreError::Unavailable(msg) => TrackerError::StoreUnavailable(msg),
			StoreError::Duplicate(msg) => TrackerError::Validation(msg),
			StoreError::NotFound(msg) => TrackerError::NotFound(msg),
			other => TrackerError::Store(other),
		}
	}
}
