//! Where a client configuration comes from.

use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

use super::ConfigError;

/// Origin of one client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    /// No file: the built-in default configuration
    #[default]
    Default,
    /// A file on the local filesystem
    Local(PathBuf),
    /// An `http://` or `https://` URL
    Remote(Url),
}

impl ConfigSource {
    /// Classify a `--config` argument. An empty argument selects the default source.
    pub fn from_arg(arg: &str) -> Result<Self, ConfigError> {
        if arg.is_empty() {
            return Ok(ConfigSource::Default);
        }

        if arg.starts_with("http://") || arg.starts_with("https://") {
            let url = Url::parse(arg).map_err(|e| ConfigError::invalid("config", e.to_string()))?;
            return Ok(ConfigSource::Remote(url));
        }

        Ok(ConfigSource::Local(PathBuf::from(arg)))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default)
    }

    /// Path of a local source; `None` for remote and default sources.
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Local(path) => Some(path),
            _ => None,
        }
    }

    /// Human-readable kind, used in start/stop log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigSource::Default => "default",
            ConfigSource::Local(_) => "local",
            ConfigSource::Remote(_) => "remote",
        }
    }
}

/// Renders the path or URL; the default source renders as an empty string.
impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Default => Ok(()),
            ConfigSource::Local(path) => write!(f, "{}", path.display()),
            ConfigSource::Remote(url) => write!(f, "{}", url),
        }
    }
}
