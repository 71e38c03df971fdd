//! Connection Manager
//!
//! Opens a connection to the first reachable server of the pool. Each server
//! gets the full retry budget, every attempt is bounded by the connection
//! timeout, and every failed attempt is logged before moving on.
//!
//! A fresh connection is opened per operation and released when the
//! operation ends, whatever its outcome.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{Protocol, ServerConfig, TransportOptions};
use crate::error::{ElectrumError, Result};
use crate::retry::RetryConfig;
use crate::transport::{line, Transport, WebSocketTransport};

/// Client name announced in `server.version`
pub const CLIENT_NAME: &str = concat!("electrum-spv/", env!("CARGO_PKG_VERSION"));

/// Electrum protocol version requested in `server.version`
pub const PROTOCOL_VERSION: &str = "1.4";

/// Opens raw transports to individual servers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `server`; no handshake is performed
    async fn open(&self, server: &ServerConfig) -> Result<Box<dyn Transport>>;
}

/// Connector for tcp, ssl, ws and wss endpoints
#[derive(Debug, Clone, Default)]
pub struct ElectrumConnector {
    options: TransportOptions,
}

impl ElectrumConnector {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for ElectrumConnector {
    async fn open(&self, server: &ServerConfig) -> Result<Box<dyn Transport>> {
        let transport: Box<dyn Transport> = match server.protocol {
            Protocol::Tcp => Box::new(line::connect_tcp(server).await?),
            Protocol::Ssl => Box::new(line::connect_tls(server, &self.options).await?),
            Protocol::Ws | Protocol::Wss => {
                Box::new(WebSocketTransport::connect(server, &self.options).await?)
            }
        };
        Ok(transport)
    }
}

/// Try `attempt` on each candidate in order
///
/// Returns the first success, or every candidate paired with its error when
/// all of them fail.
pub async fn first_success<C, T, E, F, Fut>(
    candidates: impl IntoIterator<Item = C>,
    mut attempt: F,
) -> std::result::Result<T, Vec<(C, E)>>
where
    C: Copy,
    F: FnMut(C) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut failures = Vec::new();
    for candidate in candidates {
        match attempt(candidate).await {
            Ok(value) => return Ok(value),
            Err(err) => failures.push((candidate, err)),
        }
    }
    Err(failures)
}

/// Settings shared by every connection a client opens
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionSettings {
    pub retry: RetryConfig,
    pub connection_timeout: Duration,
    pub request_timeout: Option<Duration>,
}

/// Connect to the first server of `servers` that completes the handshake
pub(crate) async fn connect<'a, C>(
    connector: &C,
    servers: &'a [ServerConfig],
    settings: ConnectionSettings,
) -> Result<Connection<'a>>
where
    C: Connector + ?Sized,
{
    if servers.is_empty() {
        return Err(ElectrumError::connection("server pool is empty"));
    }

    let retry = &settings.retry;
    let connection_timeout = settings.connection_timeout;

    let outcome = first_success(servers, |server| async move {
        debug!(%server, "connecting to electrum server");
        let result = retry
            .retry("connect", || async move {
                timeout(connection_timeout, open_and_handshake(connector, server))
                    .await
                    .map_err(|_| {
                        ElectrumError::connection(format!(
                            "{}: no handshake within {:?}",
                            server, connection_timeout
                        ))
                    })?
            })
            .await;

        if let Err(err) = &result {
            warn!(%server, error = %err, "failed to connect to electrum server");
        }
        result
    })
    .await;

    match outcome {
        Ok((server, transport)) => {
            debug!(%server, "connected to electrum server");
            Ok(Connection {
                transport,
                server,
                settings,
            })
        }
        Err(failures) => {
            let details = failures
                .iter()
                .map(|(server, err)| format!("[{}: {}]", server, err))
                .collect::<Vec<_>>()
                .join(", ");
            Err(ElectrumError::connection(format!(
                "failed to connect to any of {} electrum servers: {}",
                failures.len(),
                details
            )))
        }
    }
}

/// Open a transport, negotiate the protocol version and check liveness
async fn open_and_handshake<'a, C>(
    connector: &C,
    server: &'a ServerConfig,
) -> Result<(&'a ServerConfig, Box<dyn Transport>)>
where
    C: Connector + ?Sized,
{
    let transport = connector.open(server).await?;

    let handshake = async {
        transport
            .request("server.version", vec![json!(CLIENT_NAME), json!(PROTOCOL_VERSION)])
            .await?;
        transport.request("server.ping", Vec::new()).await
    }
    .await;

    match handshake {
        Ok(_) => Ok((server, transport)),
        Err(err) => {
            transport.close().await;
            Err(ElectrumError::connection(format!(
                "{}: handshake failed: {}",
                server, err
            )))
        }
    }
}

/// Live, handshaken connection to one server
///
/// Every call goes through the retry policy. Call [`Connection::close`] when
/// done; dropping the value also closes the underlying socket.
pub struct Connection<'a> {
    transport: Box<dyn Transport>,
    server: &'a ServerConfig,
    settings: ConnectionSettings,
}

impl Connection<'_> {
    pub fn server(&self) -> &ServerConfig {
        self.server
    }

    /// Issue one RPC with retries
    pub(crate) async fn call(&self, method: &'static str, params: Vec<Value>) -> Result<Value> {
        let params = &params;
        self.settings
            .retry
            .retry(method, || async move {
                let request = self.transport.request(method, params.clone());
                match self.settings.request_timeout {
                    Some(limit) => timeout(limit, request).await.map_err(|_| {
                        ElectrumError::action(method, format!("no response within {:?}", limit))
                    })?,
                    None => request.await,
                }
            })
            .await
    }

    /// Release the connection
    pub async fn close(self) {
        self.transport.close().await;
        debug!(server = %self.server, "released electrum connection");
    }
}
