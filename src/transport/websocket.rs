//! JSON-RPC over WebSocket, one message per text frame

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{
    connect_async, connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::trace;

use super::{decode_response, encode_request, Transport};
use crate::config::{ServerConfig, TransportOptions};
use crate::error::{ElectrumError, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    socket: Mutex<Socket>,
    next_id: AtomicU64,
    server: String,
}

impl WebSocketTransport {
    /// Open a `ws` or `wss` connection
    pub async fn connect(server: &ServerConfig, options: &TransportOptions) -> Result<Self> {
        let url = server.url();
        let connect_error = |e: tokio_tungstenite::tungstenite::Error| {
            ElectrumError::connection(format!("{}: {}", server, e))
        };

        let (socket, _response) = if server.protocol.is_tls() {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(options.accept_invalid_certs)
                .danger_accept_invalid_hostnames(options.accept_invalid_certs)
                .build()
                .map_err(|e| {
                    ElectrumError::connection(format!("{}: tls setup failed: {}", server, e))
                })?;
            connect_async_tls_with_config(url.as_str(), None, false, Some(Connector::NativeTls(tls)))
                .await
                .map_err(connect_error)?
        } else {
            connect_async(url.as_str()).await.map_err(connect_error)?
        };

        Ok(Self {
            socket: Mutex::new(socket),
            next_id: AtomicU64::new(1),
            server: server.to_string(),
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = encode_request(id, method, &params)?;

        let ws_error = |e: tokio_tungstenite::tungstenite::Error| {
            ElectrumError::action(method, format!("{}: {}", self.server, e))
        };

        let mut socket = self.socket.lock().await;
        socket.send(Message::Text(payload)).await.map_err(ws_error)?;

        loop {
            let frame = match socket.next().await {
                Some(frame) => frame.map_err(ws_error)?,
                None => {
                    return Err(ElectrumError::action(
                        method,
                        format!("{}: connection closed by server", self.server),
                    ))
                }
            };

            let text = match frame {
                Message::Text(text) => text,
                Message::Binary(bytes) => String::from_utf8(bytes).map_err(|e| {
                    ElectrumError::action(method, format!("non-utf8 frame: {}", e))
                })?,
                Message::Close(_) => {
                    return Err(ElectrumError::action(
                        method,
                        format!("{}: connection closed by server", self.server),
                    ))
                }
                _ => continue,
            };
            trace!(server = %self.server, method, message = %text, "received");

            if let Some(result) = decode_response(method, id, &text)? {
                return Ok(result);
            }
        }
    }

    async fn close(&self) {
        let mut socket = self.socket.lock().await;
        let _ = socket.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;
    use crate::config::Protocol;

    /// Accept one WebSocket client and answer its first request with `reply`
    async fn serve_once<F>(reply: F) -> ServerConfig
    where
        F: FnOnce(Value) -> Vec<Message> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let request = match ws.next().await {
                Some(Ok(Message::Text(text))) => serde_json::from_str::<Value>(&text).unwrap(),
                other => panic!("unexpected frame: {:?}", other),
            };
            for message in reply(request) {
                if ws.send(message).await.is_err() {
                    return;
                }
            }
            // drain until the client hangs up
            while let Some(Ok(_)) = ws.next().await {}
        });

        ServerConfig::new("127.0.0.1", port, Protocol::Ws)
    }

    #[tokio::test]
    async fn test_round_trip_skips_notifications_and_control_frames() {
        let server = serve_once(|request| {
            assert_eq!(request["method"], "blockchain.headers.subscribe");
            let notification = json!({"jsonrpc": "2.0", "method": "blockchain.headers.subscribe", "params": [{"height": 1}]});
            let response = json!({"jsonrpc": "2.0", "id": request["id"], "result": {"height": 840000, "hex": "00"}});
            vec![
                Message::Text(notification.to_string()),
                Message::Ping(vec![1, 2, 3]),
                Message::Binary(response.to_string().into_bytes()),
            ]
        })
        .await;

        let transport = WebSocketTransport::connect(&server, &TransportOptions::default())
            .await
            .unwrap();
        let result = transport
            .request("blockchain.headers.subscribe", vec![])
            .await
            .unwrap();
        assert_eq!(result["height"], 840000);
        transport.close().await;
    }

    #[tokio::test]
    async fn test_server_close_is_action_failure() {
        let server = serve_once(|_| vec![Message::Close(None)]).await;

        let transport = WebSocketTransport::connect(&server, &TransportOptions::default())
            .await
            .unwrap();
        let err = transport.request("server.ping", vec![]).await.unwrap_err();
        assert!(matches!(err, ElectrumError::ActionFailure { .. }));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_rejection_is_verbatim() {
        let server = serve_once(|request| {
            let response = json!({"jsonrpc": "2.0", "id": request["id"], "error": {"code": 2, "message": "unknown method"}});
            vec![Message::Text(response.to_string())]
        })
        .await;

        let transport = WebSocketTransport::connect(&server, &TransportOptions::default())
            .await
            .unwrap();
        let err = transport.request("server.banner", vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            ElectrumError::Rejected { code: 2, ref message, .. } if message == "unknown method"
        ));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let server = ServerConfig::new("127.0.0.1", port, Protocol::Ws);
        let err = WebSocketTransport::connect(&server, &TransportOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ElectrumError::ConnectionFailure(_)));
    }
}
