//! Electrum Chain Query Client
//!
//! Stateless facade over an immutable server pool and retry settings. Every
//! operation opens its own connection, runs its calls through the retry
//! policy and releases the connection before returning, on success and on
//! error alike.

use tracing::{debug, info};

use crate::config::{ClientConfig, ServerConfig};
use crate::connection::{self, Connection, ConnectionSettings, Connector, ElectrumConnector};
use crate::error::{ElectrumError, Result};
use crate::network::Network;
use crate::proof::{HeadersChain, MerkleBranch};
use crate::rpc::decode_checked;
use crate::script_hash::address_script_hash;
use crate::types::{RawTx, Tx, TxHash, Utxo};

/// Electrum client over a failover pool
#[derive(Debug, Clone)]
pub struct ElectrumClient<C = ElectrumConnector> {
    servers: Vec<ServerConfig>,
    connector: C,
    settings: ConnectionSettings,
}

impl ElectrumClient<ElectrumConnector> {
    /// Create a client from a validated configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let connector = ElectrumConnector::new(config.transport.clone());
        Self::with_connector(config, connector)
    }

    /// Create a client with default settings over server URLs such as
    /// `ssl://electrum.blockstream.info:50002`
    pub fn from_urls<I, S>(urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let servers = urls
            .into_iter()
            .map(|url| ServerConfig::parse(url.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::new(ClientConfig::new(servers))
    }
}

impl<C: Connector> ElectrumClient<C> {
    /// Create a client opening transports through `connector`
    pub fn with_connector(config: ClientConfig, connector: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            servers: config.servers,
            connector,
            settings: ConnectionSettings {
                retry: config.retry,
                connection_timeout: config.connection_timeout,
                request_timeout: config.request_timeout,
            },
        })
    }

    /// Server pool in preference order
    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    /// Open a connection to the first reachable server
    pub async fn connect(&self) -> Result<Connection<'_>> {
        connection::connect(&self.connector, &self.servers, self.settings).await
    }

    /// Network served by the first reachable server
    pub async fn get_network(&self) -> Result<Network> {
        let connection = self.connect().await?;
        let result = connection.network().await;
        connection.close().await;
        result
    }

    /// Unspent outputs paying to `address`
    ///
    /// Returned in the reverse of the order the server reports; no stronger
    /// ordering is guaranteed.
    pub async fn find_unspent_outputs(&self, address: &str) -> Result<Vec<Utxo>> {
        let connection = self.connect().await?;

        let result = async {
            let network = connection.network().await?;
            let script_hash = address_script_hash(address, network)?;
            let mut utxos = connection.list_unspent(&script_hash).await?;
            utxos.reverse();
            debug!(address, count = utxos.len(), "listed unspent outputs");
            Ok(utxos)
        }
        .await;

        connection.close().await;
        result
    }

    /// Confirmed transactions of `address`, oldest first
    ///
    /// With a `limit`, only the most recent `limit` transactions are fetched.
    pub async fn get_transaction_history(
        &self,
        address: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Tx>> {
        let connection = self.connect().await?;

        let result = async {
            let network = connection.network().await?;
            let script_hash = address_script_hash(address, network)?;

            let mut confirmed: Vec<_> = connection
                .script_history(&script_hash)
                .await?
                .into_iter()
                .filter(|entry| entry.is_confirmed())
                .collect();
            confirmed.sort_by_key(|entry| entry.height);

            let skip = limit.map_or(0, |limit| confirmed.len().saturating_sub(limit));

            let mut transactions = Vec::with_capacity(confirmed.len() - skip);
            for entry in &confirmed[skip..] {
                transactions.push(connection.transaction(&entry.tx_hash).await?);
            }
            debug!(address, count = transactions.len(), "fetched transaction history");
            Ok(transactions)
        }
        .await;

        connection.close().await;
        result
    }

    /// Decoded transaction
    pub async fn get_transaction(&self, tx_hash: &TxHash) -> Result<Tx> {
        let connection = self.connect().await?;
        let result = connection.transaction(tx_hash).await;
        connection.close().await;
        result
    }

    /// Serialized transaction as the server returned it
    pub async fn get_raw_transaction(&self, tx_hash: &TxHash) -> Result<RawTx> {
        let connection = self.connect().await?;
        let result = connection.raw_transaction(tx_hash).await;
        connection.close().await;
        result
    }

    /// Confirmation depth of `tx_hash`
    ///
    /// Zero for a mempool transaction. Fails with `ConfirmationUndeterminable`
    /// when no output history of the transaction mentions it.
    pub async fn get_confirmations(&self, tx_hash: &TxHash) -> Result<u32> {
        let connection = self.connect().await?;

        let result = async {
            let raw = connection.raw_transaction(tx_hash).await?;
            let tx = decode_checked(&raw, tx_hash)?;
            Ok(connection.depth_of(&tx).await?.confirmations)
        }
        .await;

        connection.close().await;
        result
    }

    /// Height of the current chain tip
    pub async fn latest_height(&self) -> Result<u32> {
        let connection = self.connect().await?;
        let result = connection.tip_height().await;
        connection.close().await;
        result
    }

    /// `length + 1` consecutive headers starting at `from_height`
    pub async fn get_headers_chain(&self, from_height: u32, length: u32) -> Result<HeadersChain> {
        let count = length.checked_add(1).ok_or_else(|| {
            ElectrumError::invalid_input(format!("headers chain length {} too large", length))
        })?;

        let connection = self.connect().await?;
        let result = connection.block_headers(from_height, count).await;
        connection.close().await;
        result
    }

    /// Merkle branch proving `tx_hash` is in the block at `block_height`
    pub async fn get_transaction_merkle(
        &self,
        tx_hash: &TxHash,
        block_height: u32,
    ) -> Result<MerkleBranch> {
        let connection = self.connect().await?;
        let result = connection.merkle_branch(tx_hash, block_height).await;
        connection.close().await;
        result
    }

    /// Submit a raw transaction
    ///
    /// A server rejection is returned as `Rejected` carrying the server's own
    /// message.
    pub async fn broadcast(&self, raw_tx: &RawTx) -> Result<TxHash> {
        let connection = self.connect().await?;
        let result = connection.broadcast(raw_tx).await;
        let server = connection.server().to_string();
        connection.close().await;

        match &result {
            Ok(tx_hash) => info!(tx = %tx_hash, %server, "broadcast transaction"),
            Err(err) => info!(error = %err, %server, "broadcast failed"),
        }
        result
    }
}
