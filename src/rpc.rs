//! Typed Electrum calls on a live connection
//!
//! Each method issues one protocol call and normalizes the wire response into
//! domain types. Malformed responses become `ActionFailure`s naming the method.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::connection::Connection;
use crate::error::{ElectrumError, Result};
use crate::network::Network;
use crate::proof::{HeadersChain, MerkleBranch, HEADER_SIZE};
use crate::types::{HistoryEntry, RawTx, Tx, TxHash, Utxo};

const FEATURES: &str = "server.features";
const LIST_UNSPENT: &str = "blockchain.scripthash.listunspent";
const GET_HISTORY: &str = "blockchain.scripthash.get_history";
const GET_TRANSACTION: &str = "blockchain.transaction.get";
const HEADERS_SUBSCRIBE: &str = "blockchain.headers.subscribe";
const BLOCK_HEADERS: &str = "blockchain.block.headers";
const GET_MERKLE: &str = "blockchain.transaction.get_merkle";
const BROADCAST: &str = "blockchain.transaction.broadcast";

impl Connection<'_> {
    /// Network identified by the server's genesis hash
    pub async fn network(&self) -> Result<Network> {
        let features: WireFeatures = parse(FEATURES, self.call(FEATURES, Vec::new()).await?)?;
        let genesis_hash = features
            .genesis_hash
            .ok_or_else(|| ElectrumError::action(FEATURES, "response has no genesis_hash"))?;
        Ok(Network::from_genesis_hash(&genesis_hash))
    }

    /// Unspent outputs of a script hash, in server order
    pub async fn list_unspent(&self, script_hash: &str) -> Result<Vec<Utxo>> {
        let entries: Vec<WireUnspent> =
            parse(LIST_UNSPENT, self.call(LIST_UNSPENT, vec![json!(script_hash)]).await?)?;

        entries
            .into_iter()
            .map(|entry| {
                Ok(Utxo {
                    tx_hash: wire_hash(LIST_UNSPENT, &entry.tx_hash)?,
                    output_index: entry.tx_pos,
                    value: entry.value,
                })
            })
            .collect()
    }

    /// History of a script hash, confirmed and mempool, in server order
    pub async fn script_history(&self, script_hash: &str) -> Result<Vec<HistoryEntry>> {
        let entries: Vec<WireHistory> =
            parse(GET_HISTORY, self.call(GET_HISTORY, vec![json!(script_hash)]).await?)?;

        entries
            .into_iter()
            .map(|entry| {
                Ok(HistoryEntry {
                    tx_hash: wire_hash(GET_HISTORY, &entry.tx_hash)?,
                    height: entry.height,
                })
            })
            .collect()
    }

    /// Serialized transaction; an empty answer is `NotFound`
    pub async fn raw_transaction(&self, tx_hash: &TxHash) -> Result<RawTx> {
        let value = self
            .call(GET_TRANSACTION, vec![json!(tx_hash.to_display_hex())])
            .await?;

        let hex_str = match value {
            Value::Null => "",
            Value::String(ref s) => s.as_str(),
            _ => {
                return Err(ElectrumError::action(
                    GET_TRANSACTION,
                    "expected a hex string",
                ))
            }
        };
        if hex_str.trim().is_empty() {
            return Err(ElectrumError::not_found(format!("transaction {}", tx_hash)));
        }

        RawTx::from_hex(hex_str)
            .map_err(|e| ElectrumError::action(GET_TRANSACTION, format!("invalid hex: {}", e)))
    }

    /// Decoded transaction, checked against the requested hash
    pub async fn transaction(&self, tx_hash: &TxHash) -> Result<Tx> {
        let raw = self.raw_transaction(tx_hash).await?;
        decode_checked(&raw, tx_hash)
    }

    /// Height of the current chain tip
    pub async fn tip_height(&self) -> Result<u32> {
        let tip: WireTip = parse(
            HEADERS_SUBSCRIBE,
            self.call(HEADERS_SUBSCRIBE, Vec::new()).await?,
        )?;
        Ok(tip.height)
    }

    /// Exactly `count` consecutive headers starting at `start_height`
    pub async fn block_headers(&self, start_height: u32, count: u32) -> Result<HeadersChain> {
        let headers: WireHeaders = parse(
            BLOCK_HEADERS,
            self.call(BLOCK_HEADERS, vec![json!(start_height), json!(count)])
                .await?,
        )?;

        if headers.count != count {
            return Err(ElectrumError::action(
                BLOCK_HEADERS,
                format!(
                    "requested {} headers from height {}, server returned {}",
                    count, start_height, headers.count
                ),
            ));
        }

        let raw = hex::decode(headers.hex.trim())
            .map_err(|e| ElectrumError::action(BLOCK_HEADERS, format!("invalid hex: {}", e)))?;
        if raw.len() != count as usize * HEADER_SIZE {
            return Err(ElectrumError::action(
                BLOCK_HEADERS,
                format!(
                    "expected {} bytes for {} headers, got {}",
                    count as usize * HEADER_SIZE,
                    count,
                    raw.len()
                ),
            ));
        }

        Ok(HeadersChain::new(start_height, raw))
    }

    /// Merkle branch proving `tx_hash` is in the block at `block_height`
    pub async fn merkle_branch(&self, tx_hash: &TxHash, block_height: u32) -> Result<MerkleBranch> {
        let merkle: WireMerkle = parse(
            GET_MERKLE,
            self.call(
                GET_MERKLE,
                vec![json!(tx_hash.to_display_hex()), json!(block_height)],
            )
            .await?,
        )?;

        let siblings = merkle
            .merkle
            .iter()
            .map(|sibling| wire_hash(GET_MERKLE, sibling).map(|hash| *hash.wire_bytes()))
            .collect::<Result<Vec<_>>>()?;

        Ok(MerkleBranch {
            block_height: merkle.block_height,
            siblings,
            position: merkle.pos,
        })
    }

    /// Submit a transaction; server rejections come back verbatim
    pub async fn broadcast(&self, raw_tx: &RawTx) -> Result<TxHash> {
        let value = self.call(BROADCAST, vec![json!(raw_tx.to_hex())]).await?;
        let txid = value
            .as_str()
            .ok_or_else(|| ElectrumError::action(BROADCAST, format!("unexpected response: {}", value)))?;
        wire_hash(BROADCAST, txid)
    }
}

/// Decode `raw` and make sure it is the transaction that was asked for
pub(crate) fn decode_checked(raw: &RawTx, expected: &TxHash) -> Result<Tx> {
    let tx = raw
        .decode()
        .map_err(|e| ElectrumError::action(GET_TRANSACTION, format!("undecodable transaction: {}", e)))?;

    if tx.tx_hash != *expected {
        return Err(ElectrumError::action(
            GET_TRANSACTION,
            format!("server returned transaction {} for {}", tx.tx_hash, expected),
        ));
    }
    Ok(tx)
}

fn parse<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ElectrumError::action(method, format!("unexpected response: {}", e)))
}

fn wire_hash(method: &str, display_hex: &str) -> Result<TxHash> {
    TxHash::from_display_hex(display_hex)
        .map_err(|e| ElectrumError::action(method, format!("bad hash in response: {}", e)))
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireFeatures {
    genesis_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUnspent {
    tx_hash: String,
    tx_pos: u32,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct WireHistory {
    tx_hash: String,
    height: i64,
}

#[derive(Debug, Deserialize)]
struct WireTip {
    height: u32,
}

#[derive(Debug, Deserialize)]
struct WireHeaders {
    count: u32,
    hex: String,
}

#[derive(Debug, Deserialize)]
struct WireMerkle {
    block_height: u32,
    merkle: Vec<String>,
    pos: u32,
}
