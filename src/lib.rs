//! Multi-chain wallet ledger sync and balance reconciliation.
//!
//! Tracked wallets on two token networks are synced page by page from external indexers into an
//! idempotent local ledger. The ledger's signed sums are then reconciled against live on-chain
//! balances.

pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod provider;
pub mod reconciliation;
pub mod registry;
pub mod service;
pub mod sync;
pub mod utils;

pub use error::TrackerError;
pub use service::{Tracker, TrackerSettings};
