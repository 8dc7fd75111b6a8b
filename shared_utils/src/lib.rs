//! Client bootstrap and lifecycle supervision for the tunnel launcher.
//!
//! This crate turns a configuration source (the built-in default, a local
//! file or a remote URL), plus optional command-line overrides and an
//! encrypted bootstrap payload, into a running tunneling client instance,
//! and supervises one or many such instances until they stop.

pub mod bootstrap;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod resolver;
pub mod supervisor;
pub mod tunnel;

// Re-export commonly used types for convenience
pub use bootstrap::{BootstrapDecoder, BootstrapTarget, DecodeError, decode_target, encrypt_target};
pub use config::{ClientCommonConfig, ConfigSource, Protocol, RunContext};
pub use crypto::CipherKey;
pub use error::LauncherError;
pub use resolver::{BootstrapOptions, CommonOverrides, Resolver, ServerOverride};
pub use supervisor::{DirectoryReport, Supervisor};
