//!
//! Presentation helpers.
//!
//! Exact amount formatting, address abbreviation and explorer links for CLI output.
/// Block explorer links
pub mod explorer;
/// Amount and address formatting
pub mod format;

pub use explorer::{address_url, transaction_url};
pub use format::{format_signed_amount, format_token_amount, shorten_address};
