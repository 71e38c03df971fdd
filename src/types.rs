//! Domain Types
//!
//! Normalized forms of the data Electrum servers return: transaction hashes,
//! unspent outputs, decoded transactions and history entries.

use std::fmt;
use std::str::FromStr;

use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use serde::{Serialize, Serializer};

use crate::error::ElectrumError;

// ============================================================================
// Transaction Hash
// ============================================================================

/// 32-byte transaction identifier stored in wire (internal) byte order
///
/// Electrum, block explorers and most tooling show the hash byte-reversed
/// ("display order"). The two orders are only ever converted through the
/// named constructors and accessors below.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash([u8; 32]);

impl TxHash {
    /// Wrap bytes already in wire order
    pub const fn from_wire_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse display-order hex, as shown by explorers and Electrum
    pub fn from_display_hex(hex_str: &str) -> Result<Self, ElectrumError> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| ElectrumError::invalid_input(format!("invalid tx hash hex: {}", e)))?;

        let mut wire: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            ElectrumError::invalid_input(format!("invalid tx hash length: {} bytes", b.len()))
        })?;
        wire.reverse();
        Ok(Self(wire))
    }

    /// Bytes in wire order
    pub fn wire_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Bytes in display order
    pub fn display_bytes(&self) -> [u8; 32] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }

    pub fn to_display_hex(&self) -> String {
        hex::encode(self.display_bytes())
    }
}

impl From<bitcoin::Txid> for TxHash {
    fn from(txid: bitcoin::Txid) -> Self {
        Self(txid.to_byte_array())
    }
}

impl FromStr for TxHash {
    type Err = ElectrumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_display_hex(s)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.to_display_hex())
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_display_hex())
    }
}

// ============================================================================
// Outputs, Transactions, History
// ============================================================================

/// Unspent transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utxo {
    pub tx_hash: TxHash,
    pub output_index: u32,
    /// Value in satoshis
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxInput {
    pub prev_tx_hash: TxHash,
    pub prev_index: u32,
    #[serde(with = "hex")]
    pub unlocking_script: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxOutput {
    pub index: u32,
    /// Value in satoshis
    pub value: u64,
    #[serde(with = "hex")]
    pub locking_script: Vec<u8>,
}

/// Decoded transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tx {
    pub tx_hash: TxHash,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl From<&bitcoin::Transaction> for Tx {
    fn from(tx: &bitcoin::Transaction) -> Self {
        let inputs = tx
            .input
            .iter()
            .map(|input| TxInput {
                prev_tx_hash: input.previous_output.txid.into(),
                prev_index: input.previous_output.vout,
                unlocking_script: input.script_sig.to_bytes(),
            })
            .collect();

        let outputs = tx
            .output
            .iter()
            .enumerate()
            .map(|(index, output)| TxOutput {
                index: index as u32,
                value: output.value.to_sat(),
                locking_script: output.script_pubkey.to_bytes(),
            })
            .collect();

        Self {
            tx_hash: tx.compute_txid().into(),
            inputs,
            outputs,
        }
    }
}

/// Serialized transaction exactly as the server returned it
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RawTx(#[serde(with = "hex")] Vec<u8>);

impl RawTx {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(hex_str.trim()).map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Decode into the domain transaction structure
    pub fn decode(&self) -> Result<Tx, encode::Error> {
        let tx: bitcoin::Transaction = encode::deserialize(&self.0)?;
        Ok(Tx::from(&tx))
    }
}

impl fmt::Debug for RawTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawTx({} bytes)", self.0.len())
    }
}

/// One entry of a script hash's history
///
/// Heights of zero or below denote mempool transactions (negative when a
/// parent is itself unconfirmed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub tx_hash: TxHash,
    pub height: i64,
}

impl HistoryEntry {
    pub fn is_confirmed(&self) -> bool {
        self.height > 0
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};

    use super::*;

    /// Version 2 transaction spending `[0x11; 32]:1` into the given scripts
    pub fn transaction(scripts: &[Vec<u8>]) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: bitcoin::Txid::from_byte_array([0x11; 32]),
                    vout: 1,
                },
                script_sig: ScriptBuf::from_bytes(vec![0x51]),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: scripts
                .iter()
                .enumerate()
                .map(|(i, script)| TxOut {
                    value: Amount::from_sat(10_000 * (i as u64 + 1)),
                    script_pubkey: ScriptBuf::from_bytes(script.clone()),
                })
                .collect(),
        }
    }

    pub fn raw(tx: &Transaction) -> RawTx {
        RawTx::new(encode::serialize(tx))
    }
}
