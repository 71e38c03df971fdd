//! Script Hash Index Key
//!
//! Electrum indexes activity by "script hash": the SHA-256 of a locking
//! script, byte-reversed, hex-encoded.
//!
//! # Footgun
//!
//! The reversal is mandated by the protocol and has nothing to do with
//! transaction hash display order. Skipping it (or reversing twice) does not
//! produce an error: the server simply reports an empty history, which looks
//! exactly like an unused script.

use std::str::FromStr;

use bitcoin::{Address, ScriptBuf};
use sha2::{Digest, Sha256};

use crate::error::{ElectrumError, Result};
use crate::network::Network;

/// Electrum query key for a locking script
pub fn script_hash(script: &[u8]) -> String {
    let mut digest: [u8; 32] = Sha256::digest(script).into();
    digest.reverse();
    hex::encode(digest)
}

/// Locking script paying to `address` on `network`
pub fn address_to_script(address: &str, network: Network) -> Result<ScriptBuf> {
    let bitcoin_network = network
        .bitcoin_network()
        .ok_or_else(|| ElectrumError::UnsupportedNetwork(network.to_string()))?;

    let address = Address::from_str(address.trim())
        .map_err(|e| ElectrumError::invalid_input(format!("invalid address {}: {}", address, e)))?
        .require_network(bitcoin_network)
        .map_err(|e| {
            ElectrumError::invalid_input(format!(
                "address {} is not valid on {}: {}",
                address, network, e
            ))
        })?;

    Ok(address.script_pubkey())
}

/// Electrum query key for the script paying to `address`
pub fn address_script_hash(address: &str, network: Network) -> Result<String> {
    let script = address_to_script(address, network)?;
    Ok(script_hash(script.as_bytes()))
}
