//! Resolution of one configuration source into a [`RunContext`].
//!
//! Settings are layered in this order, later layers winning:
//!
//! 1. what the [`ConfigParser`] produces for the source (built-in defaults
//!    for the default source, file contents otherwise);
//! 2. command-level overrides the operator explicitly set;
//! 3. for the default source only, the server address override, either plain
//!    `host:port` or a bootstrap payload.
//!
//! The default source additionally gets freshly generated anonymous
//! credentials on its `socks5` proxy when authentication is enabled.

use rand::Rng;
use rand::distributions::Alphanumeric;
use std::sync::Arc;
use tracing::debug;

use crate::bootstrap::{BootstrapDecoder, BootstrapTarget, DecodeError};
use crate::config::{
    ANONYMOUS_SOCKS_PROXY, ClientCommonConfig, ConfigError, ConfigParser, ConfigSource,
    Protocol, ProxyConfigSet, RunContext,
};
use crate::crypto::CipherKey;
use crate::error::LauncherError;

/// Length of the generated socks5 user name.
pub const PLUGIN_USER_LEN: usize = 6;
/// Length of the generated socks5 password.
pub const PLUGIN_PASSWD_LEN: usize = 12;

/// Common settings set explicitly on the command line. `None` keeps the value
/// from the configuration source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonOverrides {
    pub protocol: Option<String>,
    pub token: Option<String>,
    pub user: Option<String>,
    pub tls_enable: Option<bool>,
    pub tls_server_name: Option<String>,
    pub log_file: Option<String>,
    pub log_level: Option<String>,
    pub log_max_days: Option<u32>,
    pub disable_log_color: Option<bool>,
    pub dns_server: Option<String>,
}

impl CommonOverrides {
    /// Overwrite every explicitly set field of `common`.
    pub fn apply(&self, common: &mut ClientCommonConfig) -> Result<(), ConfigError> {
        if let Some(protocol) = &self.protocol {
            common.protocol = protocol.parse::<Protocol>()?;
        }
        if let Some(token) = &self.token {
            common.token = token.clone();
        }
        if let Some(user) = &self.user {
            common.user = user.clone();
        }
        if let Some(tls_enable) = self.tls_enable {
            common.tls_enable = tls_enable;
        }
        if let Some(name) = &self.tls_server_name {
            common.tls_server_name = name.clone();
        }
        if let Some(log_file) = &self.log_file {
            common.log_file = log_file.clone();
        }
        if let Some(log_level) = &self.log_level {
            common.log_level = log_level.to_ascii_lowercase();
        }
        if let Some(days) = self.log_max_days {
            common.log_max_days = days;
        }
        if let Some(disable) = self.disable_log_color {
            common.disable_log_color = disable;
        }
        if let Some(dns) = &self.dns_server {
            common.dns_server = dns.clone();
        }
        Ok(())
    }
}

/// Value of `--server_addr`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ServerOverride {
    #[default]
    None,
    /// Clear-text `host:port`
    Plain { host: String, port: u16 },
    /// Bootstrap payload, decoded at resolve time
    Encrypted(String),
}

impl ServerOverride {
    /// Classify a `--server_addr` argument. Anything that is not
    /// `host:port` with a numeric port is treated as a bootstrap payload.
    pub fn from_arg(arg: &str) -> Self {
        let arg = arg.trim();
        if arg.is_empty() {
            return ServerOverride::None;
        }

        if let Some((host, port)) = arg.rsplit_once(':') {
            let host = host.trim_start_matches('[').trim_end_matches(']');
            match port.parse::<u16>() {
                Ok(port) if !host.is_empty() => {
                    return ServerOverride::Plain {
                        host: host.to_string(),
                        port,
                    };
                }
                _ => {}
            }
        }

        ServerOverride::Encrypted(arg.to_string())
    }
}

/// Everything the operator asked for on the command line, built once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOptions {
    pub server: ServerOverride,
    pub overrides: CommonOverrides,
    /// Generate anonymous socks5 credentials for the default source
    pub enable_auth: bool,
    /// Delete a local configuration file once it has been read
    pub remove_after_use: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        BootstrapOptions {
            server: ServerOverride::None,
            overrides: CommonOverrides::default(),
            enable_auth: true,
            remove_after_use: false,
        }
    }
}

/// Turns configuration sources into [`RunContext`]s.
pub struct Resolver {
    options: BootstrapOptions,
    decoder: BootstrapDecoder,
    parser: Arc<dyn ConfigParser>,
}

impl Resolver {
    pub fn new(options: BootstrapOptions, key: CipherKey, parser: Arc<dyn ConfigParser>) -> Self {
        Resolver {
            options,
            decoder: BootstrapDecoder::new(key),
            parser,
        }
    }

    pub fn options(&self) -> &BootstrapOptions {
        &self.options
    }

    /// The server address override, decoding the payload if there is one.
    pub fn server_target(&self) -> Result<Option<BootstrapTarget>, DecodeError> {
        match &self.options.server {
            ServerOverride::None => Ok(None),
            ServerOverride::Plain { host, port } => {
                Ok(Some(BootstrapTarget::new(host.clone(), *port, 0)))
            }
            ServerOverride::Encrypted(payload) => self.decoder.decode(payload),
        }
    }

    /// Resolve `source` into a validated, self-contained [`RunContext`].
    pub async fn resolve(&self, source: &ConfigSource) -> Result<RunContext, LauncherError> {
        let target = self.server_target()?;
        let aux_port = target.as_ref().map_or(0, |t| t.aux_port);
        let source_id = source.to_string();

        let parsed = self
            .parser
            .parse(source, aux_port)
            .await
            .map_err(|error| LauncherError::Parse {
                source_id: source_id.clone(),
                error,
            })?;

        let mut common = parsed.common;
        let validation = |error| LauncherError::Validation {
            source_id: source_id.clone(),
            error,
        };
        self.options.overrides.apply(&mut common).map_err(validation)?;

        if source.is_default() {
            let target = target.ok_or(LauncherError::MissingServerAddr)?;
            common.server_addr = target.address;
            common.server_port = target.port;
        } else if target.is_some() {
            debug!(
                source = %source,
                "Server address override only applies to the default config, ignoring it"
            );
        }

        common.validate().map_err(validation)?;

        let mut proxies = parsed.proxies;
        if source.is_default()
            && self.options.enable_auth
            && inject_anonymous_credentials(&mut proxies)
        {
            debug!(proxy = ANONYMOUS_SOCKS_PROXY, "Generated anonymous proxy credentials");
        }

        Ok(RunContext {
            common,
            proxies,
            visitors: parsed.visitors,
            source: source.clone(),
        })
    }
}

/// Set fresh `plugin_user` / `plugin_passwd` params on the anonymous socks5
/// proxy. Returns whether the proxy exists.
pub fn inject_anonymous_credentials(proxies: &mut ProxyConfigSet) -> bool {
    let Some(proxy) = proxies.get_mut(ANONYMOUS_SOCKS_PROXY) else {
        return false;
    };

    proxy
        .plugin_params
        .insert("plugin_user".to_string(), random_token(PLUGIN_USER_LEN));
    proxy
        .plugin_params
        .insert("plugin_passwd".to_string(), random_token(PLUGIN_PASSWD_LEN));
    true
}

/// Random alphanumeric string of `len` characters.
pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
