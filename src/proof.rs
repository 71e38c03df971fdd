//! Bitcoin SPV Proof Material
//!
//! Block headers, merkle branches and the assembled proof handed to an
//! external relay. Both payloads are verified locally before they leave the
//! client: the branch must hash to the first header's merkle root and the
//! headers must form a linked chain.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::client::ElectrumClient;
use crate::confirmations::Depth;
use crate::connection::Connector;
use crate::error::{ElectrumError, Result};
use crate::rpc::decode_checked;
use crate::types::{RawTx, Tx, TxHash};

/// Size of a serialized block header
pub const HEADER_SIZE: usize = 80;

// ============================================================================
// Block Headers
// ============================================================================

/// Bitcoin block header (80 bytes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockHeader {
    pub version: i32,
    #[serde(with = "hex")]
    pub prev_block_hash: [u8; 32],
    #[serde(with = "hex")]
    pub merkle_root: [u8; 32],
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
    pub height: u32,
}

impl BlockHeader {
    /// Serialize to raw 80-byte format (little-endian)
    pub fn to_raw(&self) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];

        raw[0..4].copy_from_slice(&self.version.to_le_bytes());
        raw[4..36].copy_from_slice(&self.prev_block_hash);
        raw[36..68].copy_from_slice(&self.merkle_root);
        raw[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        raw[72..76].copy_from_slice(&self.bits.to_le_bytes());
        raw[76..80].copy_from_slice(&self.nonce.to_le_bytes());

        raw
    }

    /// Parse from raw 80-byte format
    pub fn from_raw(raw: &[u8; HEADER_SIZE], height: u32) -> Self {
        let word = |at: usize| [raw[at], raw[at + 1], raw[at + 2], raw[at + 3]];
        let mut prev_block_hash = [0u8; 32];
        prev_block_hash.copy_from_slice(&raw[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&raw[36..68]);

        Self {
            version: i32::from_le_bytes(word(0)),
            prev_block_hash,
            merkle_root,
            timestamp: u32::from_le_bytes(word(68)),
            bits: u32::from_le_bytes(word(72)),
            nonce: u32::from_le_bytes(word(76)),
            height,
        }
    }

    /// Block hash in wire order (double SHA256 of the raw header)
    pub fn block_hash(&self) -> [u8; 32] {
        double_sha256(&self.to_raw())
    }
}

/// Consecutive serialized headers starting at `start_height`
///
/// The raw bytes are kept exactly as the server sent them so a relay can
/// recompute difficulty and hashes without any re-framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersChain {
    start_height: u32,
    raw: Vec<u8>,
}

impl HeadersChain {
    /// `raw` must be a whole number of 80-byte headers
    pub(crate) fn new(start_height: u32, raw: Vec<u8>) -> Self {
        debug_assert_eq!(raw.len() % HEADER_SIZE, 0);
        Self { start_height, raw }
    }

    pub fn start_height(&self) -> u32 {
        self.start_height
    }

    pub fn len(&self) -> usize {
        self.raw.len() / HEADER_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.raw)
    }

    /// Parsed headers, heights assigned from `start_height`
    pub fn headers(&self) -> Vec<BlockHeader> {
        self.raw
            .chunks_exact(HEADER_SIZE)
            .zip(self.start_height..)
            .map(|(chunk, height)| {
                let mut raw = [0u8; HEADER_SIZE];
                raw.copy_from_slice(chunk);
                BlockHeader::from_raw(&raw, height)
            })
            .collect()
    }

    /// Check every header commits to the hash of the one before it
    pub fn is_linked(&self) -> bool {
        self.headers()
            .windows(2)
            .all(|pair| pair[1].prev_block_hash == pair[0].block_hash())
    }
}

impl Serialize for HeadersChain {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("HeadersChain", 3)?;
        state.serialize_field("start_height", &self.start_height)?;
        state.serialize_field("count", &self.len())?;
        state.serialize_field("hex", &self.to_hex())?;
        state.end()
    }
}

// ============================================================================
// Merkle Branch
// ============================================================================

/// Merkle inclusion proof for one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBranch {
    pub block_height: u32,
    /// Sibling hashes from leaf to root, wire order
    pub siblings: Vec<[u8; 32]>,
    /// Leaf position of the transaction in the block
    pub position: u32,
}

impl MerkleBranch {
    /// Verify that `tx_hash` at `position` hashes up to `merkle_root`
    pub fn verify(&self, tx_hash: &TxHash, merkle_root: &[u8; 32]) -> bool {
        let mut current = *tx_hash.wire_bytes();
        let mut index = self.position;

        for sibling in &self.siblings {
            current = if index % 2 == 1 {
                double_sha256_pair(sibling, &current)
            } else {
                double_sha256_pair(&current, sibling)
            };
            index /= 2;
        }

        current == *merkle_root
    }

    /// Siblings concatenated in wire order, no framing
    pub fn proof_bytes(&self) -> Vec<u8> {
        self.siblings.concat()
    }
}

impl Serialize for MerkleBranch {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let siblings: Vec<String> = self
            .siblings
            .iter()
            .map(|sibling| TxHash::from_wire_bytes(*sibling).to_display_hex())
            .collect();

        let mut state = serializer.serialize_struct("MerkleBranch", 4)?;
        state.serialize_field("block_height", &self.block_height)?;
        state.serialize_field("position", &self.position)?;
        state.serialize_field("siblings", &siblings)?;
        state.serialize_field("proof", &hex::encode(self.proof_bytes()))?;
        state.end()
    }
}

// ============================================================================
// Proof Assembly
// ============================================================================

/// Complete SPV proof for one transaction
#[derive(Debug, Clone, Serialize)]
pub struct SpvProof {
    pub tx: Tx,
    pub raw_tx: RawTx,
    pub merkle: MerkleBranch,
    /// Headers starting at the block containing the transaction
    pub headers: HeadersChain,
    pub confirmations: u32,
}

impl<C: Connector> ElectrumClient<C> {
    /// Assemble an SPV proof for `tx_hash`
    ///
    /// Fails with `InsufficientConfirmations` while the transaction is
    /// buried less than `required_confirmations` deep.
    pub async fn assemble_proof(
        &self,
        tx_hash: &TxHash,
        required_confirmations: u32,
    ) -> Result<SpvProof> {
        let connection = self.connect().await?;

        let result = async {
            let raw_tx = connection.raw_transaction(tx_hash).await?;
            let tx = decode_checked(&raw_tx, tx_hash)?;

            let required = required_confirmations.max(1);
            let Depth {
                height,
                confirmations,
            } = connection.depth_of(&tx).await?;
            if confirmations < required {
                return Err(ElectrumError::InsufficientConfirmations {
                    required,
                    actual: confirmations,
                });
            }
            let block_height = u32::try_from(height).map_err(|_| {
                ElectrumError::action("blockchain.scripthash.get_history", "height out of range")
            })?;

            let merkle = connection.merkle_branch(tx_hash, block_height).await?;
            let headers = connection.block_headers(block_height, required).await?;
            debug!(tx = %tx_hash, block_height, headers = headers.len(), "fetched proof material");

            let first = headers.headers().into_iter().next().ok_or_else(|| {
                ElectrumError::action("blockchain.block.headers", "no headers returned")
            })?;
            if !merkle.verify(tx_hash, &first.merkle_root) {
                return Err(ElectrumError::action(
                    "blockchain.transaction.get_merkle",
                    format!("branch does not match merkle root of block {}", block_height),
                ));
            }
            if !headers.is_linked() {
                return Err(ElectrumError::action(
                    "blockchain.block.headers",
                    format!("headers from {} do not form a chain", block_height),
                ));
            }

            Ok(SpvProof {
                tx,
                raw_tx,
                merkle,
                headers,
                confirmations,
            })
        }
        .await;

        connection.close().await;

        if let Ok(proof) = &result {
            info!(
                tx = %tx_hash,
                block_height = proof.merkle.block_height,
                confirmations = proof.confirmations,
                "assembled spv proof"
            );
        }
        result
    }
}

/// Double SHA256 hash (Bitcoin standard)
fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// Double SHA256 hash of two 32-byte values concatenated
fn double_sha256_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut combined = [0u8; 64];
    combined[0..32].copy_from_slice(left);
    combined[32..64].copy_from_slice(right);
    double_sha256(&combined)
}
