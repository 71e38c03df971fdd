//! Electrum SPV Client - Bitcoin Chain Queries over Public Electrum Servers
//!
//! Fault-tolerant client used to observe Bitcoin chain state and assemble
//! SPV proof material for a relay that verifies Bitcoin payments without a
//! full node.
//!
//! ## Components
//!
//! 1. **Connection Manager** - failover across an ordered server pool
//! 2. **Retrier** - bounded exponential backoff around connects and calls
//! 3. **Chain Queries** - UTXOs, history, transactions, tip, headers, merkle
//!    branches and broadcast
//! 4. **Confirmation Reconstructor** - confirmation depth without a
//!    dedicated server call
//! 5. **Proof Assembly** - verified merkle branch plus linked headers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use electrum_spv::{ElectrumClient, TxHash};
//!
//! # async fn run() -> electrum_spv::Result<()> {
//! let client = ElectrumClient::from_urls(["ssl://electrum.blockstream.info:50002"])?;
//! let hash: TxHash = "0e3e2357e806b6cdb1f70b54c3a3a17b6714ee1f0e68bebb44a74b1efd512098".parse()?;
//! let confirmations = client.get_confirmations(&hash).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod confirmations;
pub mod connection;
pub mod error;
pub mod logging;
pub mod network;
pub mod proof;
pub mod retry;
mod rpc;
pub mod script_hash;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports: client and configuration
pub use client::ElectrumClient;
pub use config::{ClientConfig, ConfigError, Protocol, ServerConfig, TransportOptions};
pub use retry::RetryConfig;

// Re-exports: connections
pub use connection::{first_success, Connection, Connector, ElectrumConnector};
pub use transport::Transport;

// Re-exports: errors
pub use error::{ElectrumError, ErrorKind, Result};

// Re-exports: domain types
pub use confirmations::Depth;
pub use network::Network;
pub use proof::{BlockHeader, HeadersChain, MerkleBranch, SpvProof};
pub use script_hash::{address_script_hash, script_hash};
pub use types::{HistoryEntry, RawTx, Tx, TxHash, TxInput, TxOutput, Utxo};
