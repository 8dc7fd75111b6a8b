//! Configuration management for the tunnel client.
//!
//! This module provides the structured representation of a client
//! configuration: the common settings shared by every proxy, the proxy and
//! visitor tables, and the [`RunContext`] bundle handed to one running
//! instance. Parsing of the on-disk format lives in [`parser`].

mod parser;
mod proxy;
mod source;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub use parser::{ANONYMOUS_SOCKS_PROXY, ConfigParser, ParsedConfig, TomlConfigParser};
pub use proxy::{
    ProxyConfig, ProxyConfigSet, ProxyKind, VisitorConfig, VisitorConfigSet, VisitorKind,
};
pub use source::ConfigSource;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] io::Error),

    /// Error parsing TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Error fetching a remote configuration
    #[error("Failed to fetch remote config {url}: {message}")]
    Remote { url: String, message: String },

    /// Missing required configuration value
    #[error("Missing required configuration value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Transport used for the control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Kcp,
    Quic,
    Websocket,
    Wss,
}

impl Protocol {
    /// Connectionless and session-oriented transports must be torn down
    /// explicitly or the server keeps the session around until it times out.
    pub fn requires_graceful_close(self) -> bool {
        matches!(self, Protocol::Kcp | Protocol::Quic)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Kcp => "kcp",
            Protocol::Quic => "quic",
            Protocol::Websocket => "websocket",
            Protocol::Wss => "wss",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "kcp" => Ok(Protocol::Kcp),
            "quic" => Ok(Protocol::Quic),
            "websocket" => Ok(Protocol::Websocket),
            "wss" => Ok(Protocol::Wss),
            other => Err(ConfigError::invalid(
                "common.protocol",
                format!(
                    "unsupported protocol {:?}, expected tcp, kcp, quic, websocket or wss",
                    other
                ),
            )),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Settings shared by every proxy of one client instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientCommonConfig {
    /// Server address to connect to (default: "0.0.0.0")
    pub server_addr: String,

    /// Server control port (default: 7000)
    pub server_port: u16,

    /// Prefix applied to proxy names on the server side
    pub user: String,

    /// Control connection transport (default: tcp)
    pub protocol: Protocol,

    /// Shared authentication token, passed through unchanged
    pub token: String,

    /// Wrap the control connection in TLS (default: true)
    pub tls_enable: bool,

    /// Custom server name for TLS certificate verification
    pub tls_server_name: String,

    /// "console" or a file path (default: "console")
    pub log_file: String,

    /// Log level (default: "info")
    pub log_level: String,

    /// Days of rotated log files to keep (default: 3)
    pub log_max_days: u32,

    /// Disable ANSI colors on console output
    pub disable_log_color: bool,

    /// DNS server used instead of the system resolver
    pub dns_server: String,

    /// Seconds between heartbeats; 0 disables them (default: 30)
    pub heartbeat_interval: u64,

    /// Seconds without server traffic before the connection is considered dead (default: 90)
    pub heartbeat_timeout: u64,

    /// Exit instead of retrying when the first login fails (default: true)
    pub login_fail_exit: bool,
}

impl Default for ClientCommonConfig {
    fn default() -> Self {
        ClientCommonConfig {
            server_addr: "0.0.0.0".to_string(),
            server_port: 7000,
            user: String::new(),
            protocol: Protocol::default(),
            token: String::new(),
            tls_enable: true,
            tls_server_name: String::new(),
            log_file: "console".to_string(),
            log_level: "info".to_string(),
            log_max_days: 3,
            disable_log_color: false,
            dns_server: String::new(),
            heartbeat_interval: 30,
            heartbeat_timeout: 90,
            login_fail_exit: true,
        }
    }
}

impl ClientCommonConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_addr.is_empty() {
            return Err(ConfigError::MissingValue("common.server_addr".to_string()));
        }

        if self.server_addr.parse::<IpAddr>().is_err() {
            url::Host::parse(&self.server_addr)
                .map_err(|e| ConfigError::invalid("common.server_addr", e.to_string()))?;
        }

        if self.server_port == 0 {
            return Err(ConfigError::invalid(
                "common.server_port",
                "port must be in the range 1-65535",
            ));
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::invalid(
                "common.log_level",
                format!("unknown level {:?}", self.log_level),
            ));
        }

        if self.log_file.is_empty() {
            return Err(ConfigError::MissingValue("common.log_file".to_string()));
        }

        if !self.dns_server.is_empty() && self.dns_server_addr().is_none() {
            return Err(ConfigError::invalid(
                "common.dns_server",
                format!("{:?} is not an IP address", self.dns_server),
            ));
        }

        if self.heartbeat_interval > 0 && self.heartbeat_timeout < self.heartbeat_interval {
            return Err(ConfigError::invalid(
                "common.heartbeat_timeout",
                "heartbeat_timeout is less than heartbeat_interval",
            ));
        }

        Ok(())
    }

    /// The DNS override as a socket address, defaulting to port 53.
    pub fn dns_server_addr(&self) -> Option<SocketAddr> {
        if self.dns_server.is_empty() {
            return None;
        }
        self.dns_server
            .parse::<SocketAddr>()
            .ok()
            .or_else(|| self.dns_server.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, 53)))
    }

    /// `address:port` of the server, bracketing IPv6 literals.
    pub fn server_endpoint(&self) -> String {
        match self.server_addr.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.server_port),
            _ => format!("{}:{}", self.server_addr, self.server_port),
        }
    }
}

/// Resolved, immutable configuration bundle for one client instance.
///
/// Every instance owns its own `RunContext`; nothing inside it is shared with
/// another instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub common: ClientCommonConfig,
    pub proxies: ProxyConfigSet,
    pub visitors: VisitorConfigSet,
    pub source: ConfigSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ClientCommonConfig {
        ClientCommonConfig {
            server_addr: "203.0.113.5".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = ClientCommonConfig::default();
        assert_eq!(config.server_addr, "0.0.0.0");
        assert_eq!(config.server_port, 7000);
        assert_eq!(config.protocol, Protocol::Tcp);
        assert_eq!(config.log_file, "console");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_max_days, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_protocol_parsing() {
        assert_eq!("QUIC".parse::<Protocol>().unwrap(), Protocol::Quic);
        assert_eq!("wss".parse::<Protocol>().unwrap(), Protocol::Wss);
        assert!("udp".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_graceful_close_protocols() {
        assert!(Protocol::Kcp.requires_graceful_close());
        assert!(Protocol::Quic.requires_graceful_close());
        assert!(!Protocol::Tcp.requires_graceful_close());
        assert!(!Protocol::Websocket.requires_graceful_close());
        assert!(!Protocol::Wss.requires_graceful_close());
    }

    #[test]
    fn test_validation() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        config.server_addr = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::MissingValue(_))));

        config.server_addr = "bad host name".to_string();
        assert!(config.validate().is_err());

        config.server_addr = "tunnel.example.com".to_string();
        assert!(config.validate().is_ok());

        config.server_port = 0;
        assert!(config.validate().is_err());
        config.server_port = 7000;

        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
        config.log_level = "debug".to_string();

        config.dns_server = "8.8.8.8".to_string();
        assert!(config.validate().is_ok());
        config.dns_server = "dns.example.com".to_string();
        assert!(config.validate().is_err());
        config.dns_server = String::new();

        config.heartbeat_timeout = 10;
        assert!(config.validate().is_err());
        config.heartbeat_interval = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dns_server_default_port() {
        let mut config = valid_config();
        config.dns_server = "1.1.1.1".to_string();
        assert_eq!(config.dns_server_addr(), Some("1.1.1.1:53".parse().unwrap()));

        config.dns_server = "1.1.1.1:5353".to_string();
        assert_eq!(config.dns_server_addr(), Some("1.1.1.1:5353".parse().unwrap()));
    }

    #[test]
    fn test_server_endpoint() {
        let mut config = valid_config();
        assert_eq!(config.server_endpoint(), "203.0.113.5:7000");

        config.server_addr = "::1".to_string();
        assert_eq!(config.server_endpoint(), "[::1]:7000");
    }
}
