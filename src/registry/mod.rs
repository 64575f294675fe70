//! Wallet and token registry types plus decimal precision resolution.

/// Precision correction for historically mis-registered tokens
pub mod decimals;
/// Wallet, token and network definitions
mod types;

pub use decimals::{
	DEFAULT_DECIMALS, DecimalsCorrection, DecimalsPolicy, DecimalsResolver, MAX_DECIMALS,
	validate_decimals,
};
pub use types::*;
