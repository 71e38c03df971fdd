//! Newline-delimited JSON-RPC over TCP, optionally wrapped in TLS

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_native_tls::TlsStream;
use tracing::trace;

use super::{decode_response, encode_request, Transport};
use crate::config::{ServerConfig, TransportOptions};
use crate::error::{ElectrumError, Result};

/// Transport exchanging one JSON document per line
pub struct LineTransport<S> {
    state: Mutex<LineState<S>>,
    next_id: AtomicU64,
    server: String,
}

struct LineState<S> {
    stream: BufReader<S>,
    /// Bytes of a line not yet terminated; survives a cancelled request
    pending: Vec<u8>,
}

impl<S> LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, server: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(LineState {
                stream: BufReader::new(stream),
                pending: Vec::new(),
            }),
            next_id: AtomicU64::new(1),
            server: server.into(),
        }
    }
}

/// Open a plaintext TCP transport
pub async fn connect_tcp(server: &ServerConfig) -> Result<LineTransport<TcpStream>> {
    let stream = open_socket(server).await?;
    Ok(LineTransport::new(stream, server.to_string()))
}

/// Open a TLS transport
pub async fn connect_tls(
    server: &ServerConfig,
    options: &TransportOptions,
) -> Result<LineTransport<TlsStream<TcpStream>>> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(options.accept_invalid_certs)
        .danger_accept_invalid_hostnames(options.accept_invalid_certs)
        .build()
        .map_err(|e| ElectrumError::connection(format!("{}: tls setup failed: {}", server, e)))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let socket = open_socket(server).await?;
    let stream = connector
        .connect(&server.host, socket)
        .await
        .map_err(|e| ElectrumError::connection(format!("{}: tls handshake failed: {}", server, e)))?;

    Ok(LineTransport::new(stream, server.to_string()))
}

async fn open_socket(server: &ServerConfig) -> Result<TcpStream> {
    TcpStream::connect((server.host.as_str(), server.port))
        .await
        .map_err(|e| ElectrumError::connection(format!("{}: {}", server, e)))
}

#[async_trait]
impl<S> Transport for LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = encode_request(id, method, &params)?;
        line.push('\n');

        let io_error = |e: std::io::Error| ElectrumError::action(method, format!("{}: {}", self.server, e));

        let mut state = self.state.lock().await;
        let LineState { stream, pending } = &mut *state;
        stream.write_all(line.as_bytes()).await.map_err(io_error)?;
        stream.flush().await.map_err(io_error)?;

        loop {
            let read = stream.read_until(b'\n', pending).await.map_err(io_error)?;
            if read == 0 {
                return Err(ElectrumError::action(
                    method,
                    format!("{}: connection closed by server", self.server),
                ));
            }
            if pending.last() != Some(&b'\n') {
                continue;
            }

            let incoming = std::mem::take(pending);
            let message = String::from_utf8_lossy(&incoming);
            let message = message.trim();
            if message.is_empty() {
                continue;
            }
            trace!(server = %self.server, method, message, "received");

            if let Some(result) = decode_response(method, id, message)? {
                return Ok(result);
            }
        }
    }

    async fn close(&self) {
        let mut state = self.state.lock().await;
        let _ = state.stream.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::io::duplex;
    use tokio::net::TcpListener;

    use super::*;
    use crate::config::Protocol;

    #[tokio::test]
    async fn test_request_round_trip_skips_notifications() {
        let (client, server) = duplex(4096);
        let transport = LineTransport::new(client, "test");

        let responder = tokio::spawn(async move {
            let mut server = BufReader::new(server);
            let mut line = String::new();
            server.read_line(&mut line).await.unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(request["method"], "blockchain.headers.subscribe");

            let notification = json!({"jsonrpc": "2.0", "method": "blockchain.headers.subscribe", "params": [{"height": 1}]});
            let response = json!({"jsonrpc": "2.0", "id": request["id"], "result": {"height": 840000, "hex": "00"}});
            server
                .write_all(format!("{}\n{}\n", notification, response).as_bytes())
                .await
                .unwrap();
        });

        let result = transport
            .request("blockchain.headers.subscribe", vec![])
            .await
            .unwrap();
        assert_eq!(result["height"], 840000);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_hangup_is_action_failure() {
        let (client, server) = duplex(4096);
        let transport = LineTransport::new(client, "test");
        drop(server);

        let err = transport.request("server.ping", vec![]).await.unwrap_err();
        assert!(matches!(err, ElectrumError::ActionFailure { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_keeps_partial_line() {
        let (client, server) = duplex(4096);
        let transport = LineTransport::new(client, "test");

        let responder = tokio::spawn(async move {
            let mut server = BufReader::new(server);
            let mut line = String::new();
            server.read_line(&mut line).await.unwrap();
            server
                .write_all(br#"{"jsonrpc":"2.0","id":1,"res"#)
                .await
                .unwrap();

            // the second request arrives once the first was abandoned
            line.clear();
            server.read_line(&mut line).await.unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            let response = json!({"jsonrpc": "2.0", "id": request["id"], "result": 840000});
            server
                .write_all(format!("ult\":1}}\n{}\n", response).as_bytes())
                .await
                .unwrap();
        });

        let first = tokio::time::timeout(
            Duration::from_secs(1),
            transport.request("blockchain.headers.subscribe", vec![]),
        )
        .await;
        assert!(first.is_err());

        let result = transport
            .request("blockchain.headers.subscribe", vec![])
            .await
            .unwrap();
        assert_eq!(result, json!(840000));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_connects_to_ipv6_literal() {
        // hosts without IPv6 loopback have nothing to check
        let Ok(listener) = TcpListener::bind("[::1]:0").await else {
            return;
        };
        let port = listener.local_addr().unwrap().port();

        let responder = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            let mut line = String::new();
            socket.read_line(&mut line).await.unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            let response = json!({"jsonrpc": "2.0", "id": request["id"], "result": null});
            socket
                .write_all(format!("{}\n", response).as_bytes())
                .await
                .unwrap();
        });

        let server = ServerConfig::parse(&format!("tcp://[::1]:{}", port)).unwrap();
        assert_eq!(server.protocol, Protocol::Tcp);
        let transport = connect_tcp(&server).await.unwrap();

        let result = transport.request("server.ping", vec![]).await.unwrap();
        assert_eq!(result, Value::Null);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_tls_handshake_with_plain_server_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = socket.write_all(b"not a tls server\n").await;
        });

        let server = ServerConfig::new("127.0.0.1", port, Protocol::Ssl);
        let err = connect_tls(&server, &TransportOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ElectrumError::ConnectionFailure(_)));
        assert!(err.to_string().contains("tls handshake failed"));
    }
}
