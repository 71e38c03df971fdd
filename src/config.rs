//! Environment-based Configuration
//!
//! The client is a stateless facade over the values defined here; they are
//! fixed at construction and never mutated by calls.
//!
//! # Environment Variables
//!
//! - `ELECTRUM_NETWORK` - "mainnet" or "testnet", selects default servers (default: "mainnet")
//! - `ELECTRUM_SERVERS` - Comma-separated server URLs, e.g. `ssl://host:50002,tcp://host:50001`
//! - `ELECTRUM_RETRY_ATTEMPTS` - Attempts per connection and per call (default: 3)
//! - `ELECTRUM_RETRY_BACKOFF_MS` - Backoff step in milliseconds (default: 1000)
//! - `ELECTRUM_CONNECTION_TIMEOUT_MS` - Per-attempt connect + handshake deadline (default: 20000)
//! - `ELECTRUM_REQUEST_TIMEOUT_MS` - Optional per-attempt RPC deadline (default: none)
//! - `ELECTRUM_ACCEPT_INVALID_CERTS` - Set to "1" to accept self-signed TLS certificates
//! - `ELECTRUM_LOG_LEVEL` - Logging level (default: "info")

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::{Host, Url};

use crate::network::Network;
use crate::retry::{RetryConfig, DEFAULT_BACKOFF_STEP, DEFAULT_RETRY_ATTEMPTS};

/// Default connect + handshake deadline per attempt
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(20);

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("invalid server url {0}: {1}")]
    InvalidServerUrl(String, String),

    #[error("server pool is empty")]
    EmptyServerPool,

    #[error("retry attempts must be at least 1")]
    ZeroAttempts,
}

// ============================================================================
// Endpoints
// ============================================================================

/// Transport scheme of an Electrum endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Newline-delimited JSON over plain TCP
    Tcp,
    /// Newline-delimited JSON over TLS
    Ssl,
    Ws,
    Wss,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Ssl => "ssl",
            Protocol::Ws => "ws",
            Protocol::Wss => "wss",
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Protocol::Ssl | Protocol::Wss)
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "ssl" | "tls" => Ok(Protocol::Ssl),
            "ws" => Ok(Protocol::Ws),
            "wss" => Ok(Protocol::Wss),
            _ => Err(ConfigError::InvalidValue(
                "protocol".to_string(),
                format!("unknown protocol: {}", s),
            )),
        }
    }
}

/// Endpoint credentials of one Electrum server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
        }
    }

    /// Parse `scheme://host:port`
    ///
    /// `tcp` and `ssl` have no well-known port, so one must be given.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let input = input.trim();
        let invalid =
            |reason: &str| ConfigError::InvalidServerUrl(input.to_string(), reason.to_string());

        let url = Url::parse(input).map_err(|e| invalid(&e.to_string()))?;
        let protocol: Protocol = url.scheme().parse().map_err(|_| invalid("unsupported scheme"))?;
        // IPv6 literals are stored without brackets so they resolve as addresses
        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(invalid("missing host")),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;

        Ok(Self::new(host, port, protocol))
    }

    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", self.protocol.scheme(), self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", self.protocol.scheme(), self.host, self.port)
        }
    }
}

/// Parse a comma-separated list of server URLs, keeping order
pub fn parse_server_list(list: &str) -> Result<Vec<ServerConfig>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ServerConfig::parse)
        .collect()
}

/// Public servers used when no pool is configured
pub fn default_servers(network: Network) -> Vec<ServerConfig> {
    match network {
        Network::Mainnet => vec![
            ServerConfig::new("electrum.blockstream.info", 50002, Protocol::Ssl),
            ServerConfig::new("electrum.blockstream.info", 50001, Protocol::Tcp),
            ServerConfig::new("bitcoin.aranguren.org", 50002, Protocol::Ssl),
        ],
        Network::Testnet => vec![
            ServerConfig::new("electrum.blockstream.info", 60002, Protocol::Ssl),
            ServerConfig::new("electrum.blockstream.info", 60001, Protocol::Tcp),
        ],
        Network::Unknown => Vec::new(),
    }
}

// ============================================================================
// Client Configuration
// ============================================================================

/// Options applied when opening transports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOptions {
    /// Accept self-signed or otherwise unverifiable TLS certificates
    pub accept_invalid_certs: bool,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Ordered server pool; earlier entries are preferred
    pub servers: Vec<ServerConfig>,

    pub transport: TransportOptions,

    pub retry: RetryConfig,

    /// Deadline for each connect + handshake attempt
    pub connection_timeout: Duration,

    /// Deadline for each RPC attempt; `None` bounds calls by retry attempts only
    pub request_timeout: Option<Duration>,

    pub log_level: String,
}

impl ClientConfig {
    /// Configuration with default settings over the given pool
    pub fn new(servers: Vec<ServerConfig>) -> Self {
        Self {
            servers,
            transport: TransportOptions::default(),
            retry: RetryConfig::default(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            request_timeout: None,
            log_level: "info".to_string(),
        }
    }

    /// Default configuration over the public servers of `network`
    pub fn for_network(network: Network) -> Self {
        Self::new(default_servers(network))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let network: Network = env::var("ELECTRUM_NETWORK")
            .unwrap_or_else(|_| "mainnet".to_string())
            .parse()?;

        let servers = match env::var("ELECTRUM_SERVERS") {
            Ok(list) => parse_server_list(&list)?,
            Err(_) => default_servers(network),
        };

        let attempts = parse_env("ELECTRUM_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS)?;
        let backoff_ms = parse_env(
            "ELECTRUM_RETRY_BACKOFF_MS",
            DEFAULT_BACKOFF_STEP.as_millis() as u64,
        )?;
        let connection_timeout_ms = parse_env(
            "ELECTRUM_CONNECTION_TIMEOUT_MS",
            DEFAULT_CONNECTION_TIMEOUT.as_millis() as u64,
        )?;

        let request_timeout = match env::var("ELECTRUM_REQUEST_TIMEOUT_MS") {
            Ok(value) => Some(Duration::from_millis(parse_value(
                "ELECTRUM_REQUEST_TIMEOUT_MS",
                &value,
            )?)),
            Err(_) => None,
        };

        let accept_invalid_certs = env::var("ELECTRUM_ACCEPT_INVALID_CERTS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let log_level = env::var("ELECTRUM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let config = Self {
            servers,
            transport: TransportOptions {
                accept_invalid_certs,
            },
            retry: RetryConfig::new(attempts, Duration::from_millis(backoff_ms)),
            connection_timeout: Duration::from_millis(connection_timeout_ms),
            request_timeout,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::EmptyServerPool);
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var_name) {
        Ok(value) => parse_value(var_name, &value),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(var_name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::InvalidValue(var_name.to_string(), format!("not a number: {}", value))
    })
}
