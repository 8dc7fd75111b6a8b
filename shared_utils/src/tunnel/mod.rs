//! Client instance abstractions.
//!
//! A [`ServiceFactory`] builds a [`TunnelService`] from a resolved
//! [`RunContext`](crate::config::RunContext); the [`LifecycleController`]
//! owns that service from construction to termination. [`ControlClient`] is
//! the built-in service speaking a line-delimited JSON control protocol.

mod control;
mod error;
pub mod lifecycle;
mod service;
pub mod types;

pub use control::{ControlClient, ControlClientFactory};
pub use error::{TunnelError, TunnelResult};
pub use lifecycle::{
    GRACEFUL_CLOSE_TIMEOUT, LifecycleController, ShutdownTrigger, TriggerFactory,
    termination_signal,
};
pub use service::{ServiceFactory, TunnelService};
pub use types::{LifecycleState, TunnelId};
