//! Transaction ledger, reconciliation log and balance cache.

/// Exact minor-unit arithmetic
pub mod amount;
mod file_store;
mod memory;
mod state;
/// Storage traits
pub mod store;
mod types;
/// Provider transfer normalization and idempotent writes
pub mod writer;

pub use amount::AmountError;
pub use file_store::JsonFileStore;
pub use memory::MemoryStore;
pub use store::*;
pub use types::*;
pub use writer::{LedgerWriter, WriteSummary};
