use crate::registry::Network;

/// Public block explorer page for a transaction.
pub fn transaction_url(network: Network, hash: &str) -> String {
	match network {
		Network::Erc20 => format!("https://etherscan.io/tx/{hash}"),
		Network::Trc20 => format!("https://tronscan.org/#/transaction/{hash}"),
	}
}

/// Public block explorer page for an address.
pub fn address_url(network: Network, address: &str) -> String {
	match network {
		Network::Erc20 => format!("https://etherscan.io/address/{address}"),
		Network::Trc20 => format!("https://tronscan.org/#/address/{address}"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn links_per_network() {
		assert_eq!(
			transaction_url(Network::Erc20, "0xabc"),
			"https://etherscan.io/tx/0xabc"
		);
		assert_eq!(
			address_url(Network::Trc20, "TXYZ"),
			"https://tronscan.org/#/address/TXYZ"
		);
	}
}
