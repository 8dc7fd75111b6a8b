//! Command-line interface of the tunnel launcher.
//!
//! Parses the flags into one [`BootstrapOptions`] value, then runs either a
//! single configuration source or every file of a configuration directory.

use clap::{ArgAction, Parser};
use shared_utils::bootstrap::{BootstrapTarget, DecodeError, encrypt_target};
use shared_utils::config::{ConfigError, ConfigSource, TomlConfigParser};
use shared_utils::crypto::CipherKey;
use shared_utils::error::LauncherError;
use shared_utils::resolver::{BootstrapOptions, CommonOverrides, Resolver, ServerOverride};
use shared_utils::supervisor::{DirectoryReport, Supervisor};
use shared_utils::tunnel::ControlClientFactory;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Tunnel client launcher
#[derive(Parser, Debug)]
#[command(name = "tunnel-launcher", author, about, long_about = None, disable_version_flag = true)]
pub struct Cli {
    /// Config file: a local path or an http(s) URL; empty uses the built-in default
    #[arg(short = 'c', long = "config", value_name = "FILE", default_value = "")]
    config: String,

    /// Config directory, runs one client for each file in it
    #[arg(long = "config_dir", value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Print the version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Server address: plain host:port or an encrypted bootstrap payload
    #[arg(short = 's', long = "server_addr", value_name = "ADDR", default_value = "")]
    server_addr: String,

    /// Remove the config file after reading it
    #[arg(long = "remove")]
    remove: bool,

    /// Auth token
    #[arg(short = 't', long = "token")]
    token: Option<String>,

    /// Enable socks auth for the default config
    #[arg(
        long = "auth",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    auth: bool,

    /// User, prefixed to proxy names
    #[arg(short = 'u', long = "user")]
    user: Option<String>,

    /// tcp, kcp, quic, websocket, wss
    #[arg(short = 'p', long = "protocol")]
    protocol: Option<String>,

    /// Log level
    #[arg(long = "log_level")]
    log_level: Option<String>,

    /// "console" or a file path
    #[arg(long = "log_file")]
    log_file: Option<String>,

    /// Days of log files to keep
    #[arg(long = "log_max_days")]
    log_max_days: Option<u32>,

    /// Disable log colors on the console
    #[arg(long = "disable_log_color")]
    disable_log_color: bool,

    /// Enable TLS to the server
    #[arg(
        long = "tls_enable",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    tls_enable: Option<bool>,

    /// Custom server name of the TLS certificate
    #[arg(long = "tls_server_name")]
    tls_server_name: Option<String>,

    /// DNS server to use instead of the system default
    #[arg(long = "dns_server")]
    dns_server: Option<String>,

    /// Print the bootstrap payload for ADDR:PORT:AUX and exit
    #[arg(long = "encrypt", value_name = "ADDR:PORT:AUX")]
    encrypt: Option<String>,
}

impl Cli {
    /// Bundle everything that shapes configuration resolution.
    pub fn bootstrap_options(&self) -> BootstrapOptions {
        BootstrapOptions {
            server: ServerOverride::from_arg(&self.server_addr),
            overrides: CommonOverrides {
                protocol: self.protocol.clone(),
                token: self.token.clone(),
                user: self.user.clone(),
                tls_enable: self.tls_enable,
                tls_server_name: self.tls_server_name.clone(),
                log_file: self.log_file.clone(),
                log_level: self.log_level.clone(),
                log_max_days: self.log_max_days,
                disable_log_color: self.disable_log_color.then_some(true),
                dns_server: self.dns_server.clone(),
            },
            enable_auth: self.auth,
            remove_after_use: self.remove,
        }
    }
}

/// Error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Invalid command-line argument
    #[error("Invalid argument: {0}")]
    Argument(#[from] ConfigError),

    /// Malformed --encrypt input
    #[error("Invalid bootstrap target: {0}")]
    Target(#[from] DecodeError),

    /// A client failed to start or stopped with an error
    #[error(transparent)]
    Launcher(#[from] LauncherError),

    /// Some clients of a config directory failed, each one logged when it stopped
    #[error("{failed} of {attempted} config files failed")]
    Directory { failed: usize, attempted: usize },
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Run the CLI application
pub async fn run() -> CliResult<()> {
    execute(Cli::parse()).await
}

async fn execute(cli: Cli) -> CliResult<()> {
    if cli.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if let Some(target) = &cli.encrypt {
        let target: BootstrapTarget = target.parse()?;
        println!("{}", encrypt_target(&target, &CipherKey::default()));
        return Ok(());
    }

    let resolver = Resolver::new(
        cli.bootstrap_options(),
        CipherKey::default(),
        Arc::new(TomlConfigParser::new()),
    );
    let supervisor = Supervisor::new(resolver, Arc::new(ControlClientFactory));

    if let Some(dir) = &cli.config_dir {
        let report = supervisor.run_directory(dir).await?;
        return directory_outcome(&report);
    }

    let source = ConfigSource::from_arg(&cli.config)?;
    supervisor.run_single(source).await?;
    Ok(())
}

fn directory_outcome(report: &DirectoryReport) -> CliResult<()> {
    info!(
        attempted = report.attempted,
        succeeded = report.succeeded(),
        "Config directory finished"
    );
    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::Directory {
            failed: report.failures.len(),
            attempted: report.attempted,
        })
    }
}
