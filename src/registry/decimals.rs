//! Decimal precision resolution for registered tokens.
//!
//! Tokens registered without an explicit precision get the generic default of 18, which is wrong
//! for several widely held stablecoins. The curated table below corrects those at read time.

use super::types::Token;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Precision assumed when the registry has nothing better.
pub const DEFAULT_DECIMALS: u32 = 18;

/// Largest accepted precision; 10^77 is the largest power of ten below 2^256.
pub const MAX_DECIMALS: u32 = 77;

pub fn validate_decimals(decimals: u32) -> Result<(), String> {
	if decimals > MAX_DECIMALS {
		return Err(format!("decimals must be at most {MAX_DECIMALS}, got {decimals}"));
	}
	Ok(())
}

/// Lowercase contract identifier to decimal precision, both networks.
const KNOWN_DECIMALS: &[(&str, u32)] = &[
	// ERC20
	("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", 6), // USDC
	("0xdac17f958d2ee523a2206206994597c13d831ec7", 6), // USDT
	("0x6b175474e89094c44da98b954eedeac495271d0f", 18), // DAI
	("0x2260fac5e5542a773aa44fbcfedf7c193bc2c599", 8), // WBTC
	// TRC20
	("tr7nhqjekqxgtci8q8zy4pl8otszgjlj6t", 6), // USDT
	("teg2uynjbej5sqhahxmudag8fmtod7v8ss", 6), // USDC
];

/// Look up the curated precision for a contract, case-insensitively.
pub fn known_decimals(contract: &str) -> Option<u32> {
	let needle = contract.trim().to_lowercase();
	KNOWN_DECIMALS
		.iter()
		.find(|(known, _)| *known == needle)
		.map(|(_, decimals)| *decimals)
}

/// Whether read-time correction of registry precision is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecimalsPolicy {
	/// Replace the generic default with the curated value when they disagree.
	#[default]
	AutoCorrect,
	/// Always trust the registry.
	RegistryOnly,
}

impl FromStr for DecimalsPolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"auto-correct" => Ok(DecimalsPolicy::AutoCorrect),
			"registry-only" => Ok(DecimalsPolicy::RegistryOnly),
			other => Err(format!(
				"unknown decimals policy '{other}', expected auto-correct or registry-only"
			)),
		}
	}
}

/// A registry value that disagrees with the curated table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecimalsCorrection {
	pub token_id: u64,
	pub contract: String,
	pub registry_decimals: u32,
	pub known_decimals: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalsResolver {
	policy: DecimalsPolicy,
}

impl DecimalsResolver {
	pub fn new(policy: DecimalsPolicy) -> Self {
		Self { policy }
	}

	pub fn policy(&self) -> DecimalsPolicy {
		self.policy
	}

	/// Effective precision for a contract given what the registry holds.
	///
	/// The curated value only wins when the registry still carries the generic default.
	pub fn resolve(&self, contract: &str, registry_decimals: u32) -> u32 {
		if self.policy == DecimalsPolicy::RegistryOnly || registry_decimals != DEFAULT_DECIMALS {
			return registry_decimals;
		}
		match known_decimals(contract) {
			Some(known) if known != registry_decimals => known,
			_ => registry_decimals,
		}
	}

	/// Precision recorded when a token is created.
	pub fn for_new_token(&self, contract: &str, requested: Option<u32>) -> u32 {
		requested
			.or_else(|| known_decimals(contract))
			.unwrap_or(DEFAULT_DECIMALS)
	}

	/// Registry entries whose precision differs from the curated table.
	pub fn corrections(&self, tokens: &[Token]) -> Vec<DecimalsCorrection> {
		tokens
			.iter()
			.filter_map(|token| {
				let known = known_decimals(&token.contract)?;
				(known != token.decimals).then(|| DecimalsCorrection {
					token_id: token.id,
					contract: token.contract.clone(),
					registry_decimals: token.decimals,
					known_decimals: known,
				})
			})
			.collect()
	}
}
