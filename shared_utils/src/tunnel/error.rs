//! Error types for the tunnel module.

use std::io;
use thiserror::Error;

/// Result type for tunnel operations.
pub type TunnelResult<T> = Result<T, TunnelError>;

/// Error types that can occur while constructing or running a client instance.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration rejected by the service
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Login rejected by the server
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Control connection closed by the server
    #[error("Tunnel closed")]
    Closed,

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl From<&str> for TunnelError {
    fn from(s: &str) -> Self {
        TunnelError::Other(s.to_string())
    }
}

impl From<String> for TunnelError {
    fn from(s: String) -> Self {
        TunnelError::Other(s)
    }
}
