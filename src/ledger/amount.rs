//! Exact integer arithmetic over minor-unit decimal strings.

use super::types::Direction;
use num_bigint::{BigInt, BigUint};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid amount: '{0}'")]
pub struct AmountError(pub String);

/// Parse an unsigned minor-unit amount. Signs, whitespace and fractions are rejected.
pub fn parse_unsigned(raw: &str) -> Result<BigUint, AmountError> {
	if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
		return Err(AmountError(raw.to_string()));
	}
	BigUint::parse_bytes(raw.as_bytes(), 10).ok_or_else(|| AmountError(raw.to_string()))
}

/// `+amount` for inbound transfers, `-amount` for outbound.
pub fn signed(direction: Direction, raw: &str) -> Result<BigInt, AmountError> {
	let magnitude = BigInt::from(parse_unsigned(raw)?);
	Ok(match direction {
		Direction::In => magnitude,
		Direction::Out => -magnitude,
	})
}

/// Sum signed ledger amounts.
pub fn signed_sum<'a, I>(entries: I) -> Result<BigInt, AmountError>
where
	I: IntoIterator<Item = (Direction, &'a str)>,
{
	entries
		.into_iter()
		.try_fold(BigInt::default(), |acc, (direction, raw)| {
			Ok(acc + signed(direction, raw)?)
		})
}

/// `gas_used × gas_price` when both are present.
pub fn fee(gas_used: Option<&str>, gas_price: Option<&str>) -> Result<Option<String>, AmountError> {
	match (gas_used, gas_price) {
		(Some(used), Some(price)) => {
			Ok(Some((parse_unsigned(used)? * parse_unsigned(price)?).to_string()))
		}
		_ => Ok(None),
	}
}

/// `actual - expected`.
pub fn difference(actual: &str, expected: &BigInt) -> Result<BigInt, AmountError> {
	Ok(BigInt::from(parse_unsigned(actual)?) - expected)
}
