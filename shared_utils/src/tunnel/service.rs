//! Seams between the lifecycle controller and the tunneling client.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RunContext;
use crate::tunnel::error::TunnelResult;
use crate::tunnel::types::TunnelId;

/// One running tunneling client bound to a single [`RunContext`].
#[async_trait]
pub trait TunnelService: Send + Sync {
    fn id(&self) -> &TunnelId;

    /// Serve until the instance terminates. Blocks for the whole lifetime of
    /// the instance; the initial connection has no timeout.
    async fn run(&self) -> TunnelResult<()>;

    /// Ask the run loop to stop accepting work, drain in-flight sessions
    /// within `timeout` and force-terminate whatever remains.
    async fn graceful_close(&self, timeout: Duration);
}

/// Builds a [`TunnelService`] from a resolved context.
#[async_trait]
pub trait ServiceFactory: Send + Sync {
    async fn create(&self, ctx: &RunContext) -> TunnelResult<Arc<dyn TunnelService>>;
}
