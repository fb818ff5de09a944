//! Error types for cellbox.
//!
//! Only sandbox *infrastructure* failures live here. Anything the payload
//! does on its own — nonzero exit, crash, timeout, runaway output — is
//! reported as data in an `ExecutionResult`, never as an `Error`.

use thiserror::Error;

/// Result type alias using cellbox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure error type for cellbox.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Unknown sandbox backend: {0}")]
    UnknownBackend(String),

    #[error("Sandbox backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Sandbox setup failed: {0}")]
    Setup(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a backend unavailable error.
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create a setup error.
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
