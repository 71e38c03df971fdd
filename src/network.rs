//! Network identification from a server's genesis hash

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::ConfigError;

/// Genesis block hash of Bitcoin mainnet (display order)
pub const MAINNET_GENESIS_HASH: &str =
    "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
/// Genesis block hash of testnet3
pub const TESTNET_GENESIS_HASH: &str =
    "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943";
/// Genesis block hash of testnet4
pub const TESTNET4_GENESIS_HASH: &str =
    "00000000da84f2bafbbc53dee25a72ae507ff4914b867c565be350b0da8bf043";

/// Bitcoin network a server serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Unknown,
}

impl Network {
    /// Map a display-order genesis hash to a network
    pub fn from_genesis_hash(genesis_hash: &str) -> Self {
        let hash = genesis_hash.trim().to_ascii_lowercase();
        match hash.as_str() {
            MAINNET_GENESIS_HASH => Network::Mainnet,
            TESTNET_GENESIS_HASH | TESTNET4_GENESIS_HASH => Network::Testnet,
            _ => Network::Unknown,
        }
    }

    /// Network used for address validation, if this one is known
    pub fn bitcoin_network(&self) -> Option<bitcoin::Network> {
        match self {
            Network::Mainnet => Some(bitcoin::Network::Bitcoin),
            Network::Testnet => Some(bitcoin::Network::Testnet),
            Network::Unknown => None,
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            _ => Err(ConfigError::InvalidValue(
                "ELECTRUM_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_mapping() {
        assert_eq!(Network::from_genesis_hash(MAINNET_GENESIS_HASH), Network::Mainnet);
        assert_eq!(Network::from_genesis_hash(TESTNET_GENESIS_HASH), Network::Testnet);
        assert_eq!(Network::from_genesis_hash(TESTNET4_GENESIS_HASH), Network::Testnet);
        assert_eq!(
            Network::from_genesis_hash(&MAINNET_GENESIS_HASH.to_uppercase()),
            Network::Mainnet
        );
        assert_eq!(Network::from_genesis_hash("00ff"), Network::Unknown);
    }

    #[test]
    fn test_network_parsing() {
        assert!(matches!("mainnet".parse::<Network>(), Ok(Network::Mainnet)));
        assert!(matches!("testnet".parse::<Network>(), Ok(Network::Testnet)));
        assert!("regtest".parse::<Network>().is_err());
    }

    #[test]
    fn test_unknown_has_no_bitcoin_network() {
        assert_eq!(Network::Unknown.bitcoin_network(), None);
        assert_eq!(Network::Mainnet.bitcoin_network(), Some(bitcoin::Network::Bitcoin));
    }
}
