use crate::ledger::{AmountError, amount};
use crate::registry::MAX_DECIMALS;

/// Render a raw minor-unit amount with `decimals` fractional digits, exactly.
///
/// Trailing fractional zeros are dropped, so `"1000000"` at 6 decimals is `"1"` and
/// `"1500000"` is `"1.5"`. Precisions above [`MAX_DECIMALS`] are rejected.
pub fn format_token_amount(raw: &str, decimals: u32) -> Result<String, AmountError> {
	if decimals > MAX_DECIMALS {
		return Err(AmountError(format!("{raw} at {decimals} decimals")));
	}
	let digits = amount::parse_unsigned(raw)?.to_string();
	let decimals = decimals as usize;
	if decimals == 0 {
		return Ok(digits);
	}

	let padded = format!("{digits:0>width$}", width = decimals + 1);
	let (whole, fraction) = padded.split_at(padded.len() - decimals);
	let fraction = fraction.trim_end_matches('0');
	if fraction.is_empty() {
		Ok(whole.to_string())
	} else {
		Ok(format!("{whole}.{fraction}"))
	}
}

/// Like [`format_token_amount`] but accepts a leading minus, as found in reconciliation differences.
pub fn format_signed_amount(raw: &str, decimals: u32) -> Result<String, AmountError> {
	match raw.strip_prefix('-') {
		Some(magnitude) => {
			let formatted = format_token_amount(magnitude, decimals)?;
			if formatted == "0" {
				Ok(formatted)
			} else {
				Ok(format!("-{formatted}"))
			}
		}
		None => format_token_amount(raw, decimals),
	}
}

/// `0x1234...cdef` style abbreviation keeping `prefix` leading characters and the last four.
pub fn shorten_address(address: &str, prefix: usize) -> String {
	let chars: Vec<char> = address.chars().collect();
	if chars.len() <= prefix + 4 {
		return address.to_string();
	}
	let head: String = chars[..prefix].iter().collect();
	let tail: String = chars[chars.len() - 4..].iter().collect();
	format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn formats_exactly() {
		assert_eq!(format_token_amount("1000000", 6).unwrap(), "1");
		assert_eq!(format_token_amount("1500000", 6).unwrap(), "1.5");
		assert_eq!(format_token_amount("1", 6).unwrap(), "0.000001");
		assert_eq!(format_token_amount("0", 18).unwrap(), "0");
		assert_eq!(format_token_amount("42", 0).unwrap(), "42");
		assert_eq!(
			format_token_amount("123456789012345678901234567890", 18).unwrap(),
			"123456789012.34567890123456789"
		);
	}

	#[test]
	fn rejects_non_numeric_input() {
		assert!(format_token_amount("1.5", 6).is_err());
		assert!(format_token_amount("error", 6).is_err());
	}

	#[test]
	fn rejects_unbounded_precision() {
		assert!(format_token_amount("1", 77).is_ok());
		assert!(format_token_amount("1", 78).is_err());
		assert!(format_signed_amount("-1", u32::MAX).is_err());
	}

	#[test]
	fn signed_amounts() {
		assert_eq!(format_signed_amount("-75", 1).unwrap(), "-7.5");
		assert_eq!(format_signed_amount("5", 0).unwrap(), "5");
		assert_eq!(format_signed_amount("-0", 6).unwrap(), "0");
	}

	#[test]
	fn shortens_long_addresses_only() {
		assert_eq!(
			shorten_address("0xdAC17F958D2ee523a2206206994597C13D831ec7", 6),
			"0xdAC1...1ec7"
		);
		assert_eq!(shorten_address("T123", 6), "T123");
	}
}
