//! Error types for db-connector.
//!
//! Every adapter operation surfaces one of these variants to the caller.

use thiserror::Error;

/// Main error type for connector operations.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// The backend could not be reached: the client process failed to spawn or
    /// exited non-zero, or a transport call to the execution API failed.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The remote submission call failed. Never retried automatically.
    #[error("Submission error: {0}")]
    Submission(String),

    /// The backend reported a definitive failure or cancellation for a submitted query.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The poll budget or caller deadline ran out while the query was still pending.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The caller cancelled the query.
    #[error("Query cancelled")]
    Cancelled,

    /// Tabular text could not be interpreted as a rectangular dataset.
    #[error("Decode error: {message}{}", offset_suffix(.offset))]
    Decode {
        message: String,
        offset: Option<u64>,
    },

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectorError {
    /// Creates a backend-unavailable error with the given message.
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Creates a submission error with the given message.
    pub fn submission(msg: impl Into<String>) -> Self {
        Self::Submission(msg.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates a timeout error with the given message.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a decode error, optionally pinned to a byte offset.
    pub fn decode(msg: impl Into<String>, offset: Option<u64>) -> Self {
        Self::Decode {
            message: msg.into(),
            offset,
        }
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::BackendUnavailable(_) => "Backend Unavailable",
            Self::Submission(_) => "Submission Error",
            Self::Execution(_) => "Execution Error",
            Self::Timeout(_) => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::Decode { .. } => "Decode Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns true for errors that end a query without a definitive backend verdict.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Cancelled)
    }
}

fn offset_suffix(offset: &Option<u64>) -> String {
    match offset {
        Some(byte) => format!(" (at byte {byte})"),
        None => String::new(),
    }
}

/// Result type alias using ConnectorError.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Replaces every occurrence of `secret` in backend-provided text.
///
/// Client processes and remote APIs may echo their input back in error output;
/// anything that ends up in an error message or log line goes through here first.
pub fn redact_secret(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, "[REDACTED]")
}
