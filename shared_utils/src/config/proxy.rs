//! Proxy and visitor configuration entries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ConfigError;

/// Proxies keyed by their unique name.
pub type ProxyConfigSet = HashMap<String, ProxyConfig>;

/// Visitors keyed by their unique name.
pub type VisitorConfigSet = HashMap<String, VisitorConfig>;

/// Kind of a proxy entry, the `type` key in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    #[default]
    Tcp,
    Udp,
    Http,
    Https,
    Stcp,
    Xtcp,
}

/// One proxy exposed through the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    #[serde(rename = "type")]
    pub kind: ProxyKind,

    /// Local service address (default: "127.0.0.1")
    pub local_ip: String,

    /// Local service port; unused when a plugin serves the traffic
    pub local_port: u16,

    /// Port the server listens on for tcp/udp proxies, 0 lets the server pick
    pub remote_port: u16,

    pub use_encryption: bool,
    pub use_compression: bool,

    /// Domains routed to this proxy (http/https)
    pub custom_domains: Vec<String>,

    /// Subdomain under the server's root domain (http/https)
    pub subdomain: String,

    /// Shared secret for stcp/xtcp
    pub sk: String,

    /// Built-in plugin serving this proxy, e.g. "socks5"
    pub plugin: String,

    /// Plugin parameters such as `plugin_user` / `plugin_passwd`
    pub plugin_params: HashMap<String, String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            kind: ProxyKind::default(),
            local_ip: "127.0.0.1".to_string(),
            local_port: 0,
            remote_port: 0,
            use_encryption: false,
            use_compression: false,
            custom_domains: Vec::new(),
            subdomain: String::new(),
            sk: String::new(),
            plugin: String::new(),
            plugin_params: HashMap::new(),
        }
    }
}

impl ProxyConfig {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let key = |field: &str| format!("proxies.{}.{}", name, field);

        if self.plugin.is_empty() && self.local_port == 0 {
            return Err(ConfigError::MissingValue(key("local_port")));
        }

        match self.kind {
            ProxyKind::Http | ProxyKind::Https => {
                if self.custom_domains.is_empty() && self.subdomain.is_empty() {
                    return Err(ConfigError::invalid(
                        &key("custom_domains"),
                        "custom_domains and subdomain should set at least one of them",
                    ));
                }
            }
            ProxyKind::Stcp | ProxyKind::Xtcp => {
                if self.sk.is_empty() {
                    return Err(ConfigError::MissingValue(key("sk")));
                }
            }
            ProxyKind::Tcp | ProxyKind::Udp => {}
        }

        Ok(())
    }
}

/// Kind of a visitor entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisitorKind {
    #[default]
    Stcp,
    Xtcp,
}

/// Local entry point to another client's stcp/xtcp proxy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct VisitorConfig {
    #[serde(rename = "type")]
    pub kind: VisitorKind,

    /// Name of the proxy being visited
    pub server_name: String,

    /// Shared secret, must match the proxy's `sk`
    pub sk: String,

    /// Local bind address (default: "127.0.0.1")
    pub bind_addr: String,

    pub bind_port: u16,

    pub use_encryption: bool,
    pub use_compression: bool,
}

impl Default for VisitorConfig {
    fn default() -> Self {
        VisitorConfig {
            kind: VisitorKind::default(),
            server_name: String::new(),
            sk: String::new(),
            bind_addr: "127.0.0.1".to_string(),
            bind_port: 0,
            use_encryption: false,
            use_compression: false,
        }
    }
}

impl VisitorConfig {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.server_name.is_empty() {
            return Err(ConfigError::MissingValue(format!("visitors.{}.server_name", name)));
        }
        if self.bind_port == 0 {
            return Err(ConfigError::MissingValue(format!("visitors.{}.bind_port", name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_proxy_requires_local_port_or_plugin() {
        let mut proxy = ProxyConfig::default();
        assert!(proxy.validate("ssh").is_err());

        proxy.local_port = 22;
        assert!(proxy.validate("ssh").is_ok());

        let socks = ProxyConfig {
            plugin: "socks5".to_string(),
            ..Default::default()
        };
        assert!(socks.validate("socks5").is_ok());
    }

    #[test]
    fn test_http_proxy_requires_domain() {
        let mut proxy = ProxyConfig {
            kind: ProxyKind::Http,
            local_port: 80,
            ..Default::default()
        };
        let err = proxy.validate("web").unwrap_err();
        assert!(err.to_string().contains("proxies.web.custom_domains"));

        proxy.subdomain = "web".to_string();
        assert!(proxy.validate("web").is_ok());
    }

    #[test]
    fn test_visitor_validation() {
        let mut visitor = VisitorConfig {
            server_name: "secret_ssh".to_string(),
            ..Default::default()
        };
        assert!(visitor.validate("secret_ssh_visitor").is_err());

        visitor.bind_port = 6000;
        assert!(visitor.validate("secret_ssh_visitor").is_ok());
    }
}
