//! Errors surfaced by the launcher when resolving or running a configuration.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::bootstrap::DecodeError;
use crate::config::ConfigError;
use crate::tunnel::TunnelError;

/// Failure of one configuration source, or of the launcher itself.
///
/// Variants tied to a configuration source carry its display form (path, URL
/// or empty for the default source) in `source_id`.
#[derive(Debug, Error)]
pub enum LauncherError {
    /// Bootstrap payload could not be decoded
    #[error("invalid bootstrap payload: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration source could not be read or parsed
    #[error("failed to parse config {source_id:?}: {error}")]
    Parse {
        source_id: String,
        #[source]
        error: ConfigError,
    },

    /// Resolved configuration is invalid
    #[error("invalid config {source_id:?}: {error}")]
    Validation {
        source_id: String,
        #[source]
        error: ConfigError,
    },

    /// Default configuration used without a server address override
    #[error("no server address: pass --server_addr or a config file")]
    MissingServerAddr,

    /// Instance failed to start or terminated with an error
    #[error("service for config {source_id:?} failed: {error}")]
    Startup {
        source_id: String,
        #[source]
        error: TunnelError,
    },

    /// Filesystem error outside of config parsing
    #[error("I/O error on {}: {error}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    /// Directory-mode worker that did not complete normally
    #[error("worker for {source_id:?} aborted: {message}")]
    Worker { source_id: String, message: String },
}

impl LauncherError {
    /// Identifier of the configuration source this error belongs to, if any.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            LauncherError::Parse { source_id, .. }
            | LauncherError::Validation { source_id, .. }
            | LauncherError::Startup { source_id, .. }
            | LauncherError::Worker { source_id, .. } => Some(source_id),
            LauncherError::Decode(_)
            | LauncherError::MissingServerAddr
            | LauncherError::Io { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id() {
        let err = LauncherError::Startup {
            source_id: "conf/a.toml".to_string(),
            error: TunnelError::Closed,
        };
        assert_eq!(err.source_id(), Some("conf/a.toml"));
        assert!(err.to_string().contains("conf/a.toml"));

        assert_eq!(LauncherError::MissingServerAddr.source_id(), None);
    }

    #[test]
    fn test_io_error_names_path() {
        let err = LauncherError::Io {
            path: PathBuf::from("/missing/dir"),
            error: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("/missing/dir"));
    }
}
