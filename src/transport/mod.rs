//! Electrum Transports
//!
//! JSON-RPC 2.0 framing shared by every transport, and the [`Transport`]
//! trait the connection manager drives:
//! - `line` - newline-delimited JSON over TCP or TLS
//! - `websocket` - one JSON message per text frame over ws or wss

pub mod line;
pub mod websocket;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ElectrumError, Result};

pub use line::LineTransport;
pub use websocket::WebSocketTransport;

/// An open connection to one Electrum server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for the response carrying the same id
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value>;

    /// Release the connection; errors while closing are ignored
    async fn close(&self);
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Serialize a request into a single-line JSON string
pub(crate) fn encode_request(id: u64, method: &str, params: &[Value]) -> Result<String> {
    let request = Request {
        jsonrpc: "2.0",
        id,
        method,
        params,
    };
    serde_json::to_string(&request)
        .map_err(|e| ElectrumError::action(method, format!("failed to serialize request: {}", e)))
}

/// Interpret one incoming message
///
/// Returns `Ok(None)` for messages that do not answer request `id`, such as
/// subscription notifications. An error carrying a null id answers the
/// request in flight.
pub(crate) fn decode_response(method: &str, id: u64, message: &str) -> Result<Option<Value>> {
    let response: Response = serde_json::from_str(message)
        .map_err(|e| ElectrumError::action(method, format!("malformed response: {}", e)))?;

    let error = response.error.filter(|error| !error.is_null());

    let matches = match &response.id {
        Some(Value::Number(n)) => n.as_u64() == Some(id),
        Some(Value::String(s)) => s.parse::<u64>().ok() == Some(id),
        // the server could not read the request back, so it cannot echo the id
        None => error.is_some(),
        _ => false,
    };
    if !matches {
        return Ok(None);
    }

    match error {
        None => Ok(Some(response.result.unwrap_or(Value::Null))),
        Some(error) => Err(rejection(method, error)),
    }
}

fn rejection(method: &str, error: Value) -> ElectrumError {
    let (code, message) = match &error {
        Value::Object(fields) => (
            fields.get("code").and_then(Value::as_i64).unwrap_or(0),
            fields
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        ),
        Value::String(message) => (0, message.clone()),
        other => (0, other.to_string()),
    };

    ElectrumError::Rejected {
        method: method.to_string(),
        code,
        message,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_encode_request() {
        let line = encode_request(7, "server.version", &[json!("electrum-spv"), json!("1.4")])
            .unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "server.version");
        assert_eq!(value["params"][1], "1.4");
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_decode_result() {
        let result = decode_response("server.ping", 3, r#"{"jsonrpc":"2.0","id":3,"result":null}"#)
            .unwrap();
        assert_eq!(result, Some(Value::Null));
    }

    #[test]
    fn test_decode_skips_notifications_and_other_ids() {
        let notification =
            r#"{"jsonrpc":"2.0","method":"blockchain.headers.subscribe","params":[{"height":1}]}"#;
        assert_eq!(decode_response("server.ping", 3, notification).unwrap(), None);

        let other = r#"{"jsonrpc":"2.0","id":2,"result":1}"#;
        assert_eq!(decode_response("server.ping", 3, other).unwrap(), None);
    }

    #[test]
    fn test_decode_error_is_verbatim() {
        let message = r#"{"jsonrpc":"2.0","id":1,"error":{"code":1,"message":"the transaction was rejected by network rules.\n\nmin relay fee not met"}}"#;
        let err = decode_response("blockchain.transaction.broadcast", 1, message).unwrap_err();

        match err {
            ElectrumError::Rejected { code, message, .. } => {
                assert_eq!(code, 1);
                assert_eq!(
                    message,
                    "the transaction was rejected by network rules.\n\nmin relay fee not met"
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_null_id_error_rejects_request() {
        let message = r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"invalid JSON"}}"#;
        let err = decode_response("server.ping", 4, message).unwrap_err();
        assert!(matches!(
            err,
            ElectrumError::Rejected { code: -32700, ref message, .. } if message == "invalid JSON"
        ));

        // a null id without an error is still not an answer
        let stray = r#"{"jsonrpc":"2.0","id":null,"result":1}"#;
        assert_eq!(decode_response("server.ping", 4, stray).unwrap(), None);
    }

    #[test]
    fn test_decode_string_error() {
        let err = decode_response("x", 1, r#"{"id":1,"error":"bad request"}"#).unwrap_err();
        assert!(matches!(err, ElectrumError::Rejected { code: 0, ref message, .. } if message == "bad request"));
    }

    #[test]
    fn test_decode_malformed() {
        let err = decode_response("x", 1, "not json").unwrap_err();
        assert!(matches!(err, ElectrumError::ActionFailure { .. }));
    }
}
