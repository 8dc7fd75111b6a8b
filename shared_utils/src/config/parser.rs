//! Parsing of client configuration sources.
//!
//! Files are TOML with a `[common]` table and `[proxies.<name>]` /
//! `[visitors.<name>]` tables:
//!
//! ```toml
//! [common]
//! server_addr = "tunnel.example.com"
//! server_port = 7000
//! token = "secret"
//!
//! [proxies.ssh]
//! type = "tcp"
//! local_port = 22
//! remote_port = 6000
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use tracing::debug;
use url::Url;

use super::{
    ClientCommonConfig, ConfigError, ConfigSource, ProxyConfig, ProxyConfigSet, ProxyKind,
    VisitorConfigSet,
};

/// Name of the proxy entry that carries anonymous socks5 access.
pub const ANONYMOUS_SOCKS_PROXY: &str = "socks5";

/// Structured settings produced from one configuration source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedConfig {
    pub common: ClientCommonConfig,
    pub proxies: ProxyConfigSet,
    pub visitors: VisitorConfigSet,
}

/// Turns a configuration source into structured settings.
#[async_trait]
pub trait ConfigParser: Send + Sync {
    /// Parse `source`. `aux_port` comes from the bootstrap payload (0 when
    /// there is none) and only matters for the default source.
    async fn parse(&self, source: &ConfigSource, aux_port: u16)
    -> Result<ParsedConfig, ConfigError>;
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default)]
    common: ClientCommonConfig,
    #[serde(default)]
    proxies: ProxyConfigSet,
    #[serde(default)]
    visitors: VisitorConfigSet,
}

/// Parser for TOML files on disk or behind an http(s) URL.
#[derive(Debug, Clone, Default)]
pub struct TomlConfigParser {
    http: reqwest::Client,
}

impl TomlConfigParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML content and validate every proxy and visitor entry.
    pub fn parse_str(content: &str) -> Result<ParsedConfig, ConfigError> {
        let file: FileConfig = toml::from_str(content)?;

        for (name, proxy) in &file.proxies {
            proxy.validate(name)?;
        }
        for (name, visitor) in &file.visitors {
            visitor.validate(name)?;
        }

        Ok(ParsedConfig {
            common: file.common,
            proxies: file.proxies,
            visitors: file.visitors,
        })
    }

    /// Built-in configuration used when no file is given: no server address
    /// and a single anonymous socks5 proxy listening on `aux_port` server side.
    pub fn default_config(aux_port: u16) -> ParsedConfig {
        let socks = ProxyConfig {
            kind: ProxyKind::Tcp,
            remote_port: aux_port,
            plugin: "socks5".to_string(),
            ..Default::default()
        };

        ParsedConfig {
            common: ClientCommonConfig {
                server_addr: String::new(),
                ..Default::default()
            },
            proxies: HashMap::from([(ANONYMOUS_SOCKS_PROXY.to_string(), socks)]),
            visitors: VisitorConfigSet::new(),
        }
    }

    async fn read_local(path: &Path) -> Result<String, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ConfigError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => Err(ConfigError::IoError(e)),
        }
    }

    async fn fetch_remote(&self, url: &Url) -> Result<String, ConfigError> {
        let remote_err = |e: reqwest::Error| ConfigError::Remote {
            url: url.to_string(),
            message: e.to_string(),
        };

        self.http
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(remote_err)?
            .text()
            .await
            .map_err(remote_err)
    }
}

#[async_trait]
impl ConfigParser for TomlConfigParser {
    async fn parse(
        &self,
        source: &ConfigSource,
        aux_port: u16,
    ) -> Result<ParsedConfig, ConfigError> {
        let content = match source {
            ConfigSource::Default => return Ok(Self::default_config(aux_port)),
            ConfigSource::Local(path) => Self::read_local(path).await?,
            ConfigSource::Remote(url) => self.fetch_remote(url).await?,
        };
        debug!(source = %source, bytes = content.len(), "Read config source");

        Self::parse_str(&content)
    }
}
