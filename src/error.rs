//! Error Types for the Electrum SPV Client
//!
//! Every failure surfaces as a distinct, inspectable variant. Callers such as
//! a deposit monitor or a proof assembler branch on [`ElectrumError::kind`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::types::TxHash;

/// Root error type for the client
#[derive(Debug, Error)]
pub enum ElectrumError {
    /// No server in the pool could be reached, or a single connect attempt failed
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// Server was reachable but the call failed or returned malformed data
    #[error("{method} failed: {reason}")]
    ActionFailure { method: String, reason: String },

    /// Server answered with a JSON-RPC error; `message` is the server's text, untouched
    #[error("{method} rejected by server: {message}")]
    Rejected {
        method: String,
        code: i64,
        message: String,
    },

    /// Transaction or history absent
    #[error("not found: {0}")]
    NotFound(String),

    /// None of the transaction's outputs led to a history entry for it
    #[error("confirmations of transaction {0} could not be determined")]
    ConfirmationUndeterminable(TxHash),

    /// Server serves a chain whose genesis hash is not recognised
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// Transaction is not yet buried deep enough for a proof
    #[error("transaction has {actual} confirmations, {required} required")]
    InsufficientConfirmations { required: u32, actual: u32 },

    /// Caller supplied a malformed address or hash
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Coarse error classification callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Action,
    NotFound,
    ConfirmationUndeterminable,
    UnsupportedNetwork,
    InsufficientConfirmations,
    InvalidInput,
}

impl ElectrumError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionFailure(msg.into())
    }

    /// Create an action error for `method`
    pub fn action(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActionFailure {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ElectrumError::ConnectionFailure(_) => ErrorKind::Connection,
            ElectrumError::ActionFailure { .. } | ElectrumError::Rejected { .. } => {
                ErrorKind::Action
            }
            ElectrumError::NotFound(_) => ErrorKind::NotFound,
            ElectrumError::ConfirmationUndeterminable(_) => ErrorKind::ConfirmationUndeterminable,
            ElectrumError::UnsupportedNetwork(_) => ErrorKind::UnsupportedNetwork,
            ElectrumError::InsufficientConfirmations { .. } => {
                ErrorKind::InsufficientConfirmations
            }
            ElectrumError::InvalidInput(_) | ElectrumError::Config(_) => ErrorKind::InvalidInput,
        }
    }

    /// Check if another attempt could succeed
    ///
    /// A server rejection is a definite answer and is not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ElectrumError::ConnectionFailure(_) | ElectrumError::ActionFailure { .. }
        )
    }

    /// Stable error code for logs and CLI output
    pub fn error_code(&self) -> &'static str {
        match self {
            ElectrumError::ConnectionFailure(_) => "CONNECTION_FAILURE",
            ElectrumError::ActionFailure { .. } => "ACTION_FAILURE",
            ElectrumError::Rejected { .. } => "SERVER_REJECTED",
            ElectrumError::NotFound(_) => "NOT_FOUND",
            ElectrumError::ConfirmationUndeterminable(_) => "CONFIRMATION_UNDETERMINABLE",
            ElectrumError::UnsupportedNetwork(_) => "UNSUPPORTED_NETWORK",
            ElectrumError::InsufficientConfirmations { .. } => "INSUFFICIENT_CONFIRMATIONS",
            ElectrumError::InvalidInput(_) => "INVALID_INPUT",
            ElectrumError::Config(_) => "CONFIG_ERROR",
        }
    }
}

/// Result type alias using ElectrumError
pub type Result<T> = std::result::Result<T, ElectrumError>;
