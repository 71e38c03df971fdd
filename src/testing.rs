//! Scripted in-memory Electrum server for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ServerConfig;
use crate::connection::Connector;
use crate::error::{ElectrumError, Result};
use crate::transport::Transport;

type Reply = std::result::Result<Value, (i64, String)>;

/// Server answering from a table of `(method, params) -> reply`
#[derive(Debug, Default)]
pub(crate) struct FakeServer {
    replies: Mutex<HashMap<String, Reply>>,
    failures: Mutex<HashMap<String, u32>>,
    stalled: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    closed: AtomicUsize,
}

fn key(method: &str, params: &[Value]) -> String {
    format!("{}{}", method, Value::Array(params.to_vec()))
}

fn params_of(params: Value) -> Vec<Value> {
    match params {
        Value::Array(items) => items,
        other => vec![other],
    }
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(self: Arc<Self>, method: &str, params: Value, result: Value) -> Arc<Self> {
        self.replies
            .lock()
            .unwrap()
            .insert(key(method, &params_of(params)), Ok(result));
        self
    }

    pub fn reject(self: Arc<Self>, method: &str, params: Value, code: i64, message: &str) -> Arc<Self> {
        self.replies
            .lock()
            .unwrap()
            .insert(key(method, &params_of(params)), Err((code, message.to_string())));
        self
    }

    /// Answer `server.features` with the given genesis hash
    pub fn genesis(self: Arc<Self>, genesis_hash: &str) -> Arc<Self> {
        self.respond(
            "server.features",
            json!([]),
            json!({"genesis_hash": genesis_hash, "protocol_max": "1.4"}),
        )
    }

    /// Fail the next `times` calls of `method` with a transient error
    pub fn fail_times(self: Arc<Self>, method: &str, times: u32) -> Arc<Self> {
        self.failures
            .lock()
            .unwrap()
            .insert(method.to_string(), times);
        self
    }

    /// Never answer `method`
    pub fn stall(self: Arc<Self>, method: &str) -> Arc<Self> {
        self.stalled.lock().unwrap().insert(method.to_string());
        self
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|called| called.as_str() == method)
            .count()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    async fn handle(&self, method: &str, params: &[Value]) -> Result<Value> {
        self.calls.lock().unwrap().push(method.to_string());

        let stalled = self.stalled.lock().unwrap().contains(method);
        if stalled {
            std::future::pending::<()>().await;
        }

        if let Some(remaining) = self.failures.lock().unwrap().get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ElectrumError::action(method, "injected failure"));
            }
        }

        let reply = self.replies.lock().unwrap().get(&key(method, params)).cloned();
        match (reply, method) {
            (Some(Ok(value)), _) => Ok(value),
            (Some(Err((code, message))), _) => Err(ElectrumError::Rejected {
                method: method.to_string(),
                code,
                message,
            }),
            (None, "server.version") => Ok(json!(["FakeElectrum 1.0", "1.4"])),
            (None, "server.ping") => Ok(Value::Null),
            (None, _) => Err(ElectrumError::Rejected {
                method: method.to_string(),
                code: -32601,
                message: format!("unscripted request {}", key(method, params)),
            }),
        }
    }
}

struct FakeTransport {
    server: Arc<FakeServer>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.server.handle(method, &params).await
    }

    async fn close(&self) {
        self.server.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector resolving hosts to fake servers; unknown hosts refuse connections
#[derive(Debug, Default)]
pub(crate) struct FakeConnector {
    servers: HashMap<String, Arc<FakeServer>>,
    opens: Mutex<HashMap<String, usize>>,
    hanging: bool,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, host: &str, server: Arc<FakeServer>) -> Self {
        self.servers.insert(host.to_string(), server);
        self
    }

    /// Never complete any connection attempt
    pub fn hanging(mut self) -> Self {
        self.hanging = true;
        self
    }

    pub fn open_attempts(&self, host: &str) -> usize {
        self.opens.lock().unwrap().get(host).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, server: &ServerConfig) -> Result<Box<dyn Transport>> {
        *self
            .opens
            .lock()
            .unwrap()
            .entry(server.host.clone())
            .or_insert(0) += 1;

        if self.hanging {
            std::future::pending::<()>().await;
        }

        match self.servers.get(&server.host) {
            Some(fake) => Ok(Box::new(FakeTransport {
                server: Arc::clone(fake),
            })),
            None => Err(ElectrumError::connection(format!(
                "{}: connection refused",
                server
            ))),
        }
    }
}
