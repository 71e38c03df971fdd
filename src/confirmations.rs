//! Confirmation Reconstructor
//!
//! Electrum has no call returning a transaction's confirmation depth, so it is
//! derived: find the transaction in the history of one of its own output
//! scripts, read the block height from that entry and compare it with the tip.
//!
//! Servers do not index every script, so each output is tried in turn until
//! one history mentions the transaction. When none does the depth is
//! undeterminable, which is reported as an error and never as zero.

use futures_util::pin_mut;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::error::{ElectrumError, Result};
use crate::script_hash::script_hash;
use crate::types::{HistoryEntry, Tx, TxHash};

/// Position of a transaction relative to the chain tip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Depth {
    /// Height reported by the history entry; zero or below while in the mempool
    pub height: i64,
    pub confirmations: u32,
}

/// Height of `tx_hash` in a script history, if it appears there
pub fn find_history_height(history: &[HistoryEntry], tx_hash: &TxHash) -> Option<i64> {
    history
        .iter()
        .find(|entry| entry.tx_hash == *tx_hash)
        .map(|entry| entry.height)
}

/// Confirmations of a transaction mined at `height` with the tip at `tip`
///
/// The tip block itself counts as one confirmation. Mempool heights and
/// heights above the tip yield zero.
pub fn confirmations_at(tip: u32, height: i64) -> u32 {
    if height <= 0 {
        return 0;
    }
    let depth = i64::from(tip) - height + 1;
    u32::try_from(depth.max(0)).unwrap_or(u32::MAX)
}

impl Connection<'_> {
    /// Height of `tx` found through the histories of its outputs
    ///
    /// Outputs are queried in order and the search stops at the first history
    /// containing the transaction. `None` when no history mentions it.
    pub async fn locate_height(&self, tx: &Tx) -> Result<Option<i64>> {
        let heights = stream::iter(&tx.outputs)
            .then(|output| async move {
                let key = script_hash(&output.locking_script);
                let history = self.script_history(&key).await?;
                trace!(
                    tx = %tx.tx_hash,
                    output = output.index,
                    entries = history.len(),
                    "scanned output history"
                );
                Ok::<_, ElectrumError>(find_history_height(&history, &tx.tx_hash))
            })
            .try_filter_map(|height| async move { Ok(height) });
        pin_mut!(heights);

        heights.try_next().await
    }

    /// Reconstruct the depth of an already decoded transaction
    pub async fn depth_of(&self, tx: &Tx) -> Result<Depth> {
        let height = self
            .locate_height(tx)
            .await?
            .ok_or(ElectrumError::ConfirmationUndeterminable(tx.tx_hash))?;

        let confirmations = if height > 0 {
            confirmations_at(self.tip_height().await?, height)
        } else {
            0
        };
        debug!(tx = %tx.tx_hash, height, confirmations, "reconstructed confirmation depth");

        Ok(Depth {
            height,
            confirmations,
        })
    }
}
