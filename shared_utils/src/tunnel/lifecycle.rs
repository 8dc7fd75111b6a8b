//! Lifecycle control for one client instance.
//!
//! ```text
//! Created → Starting → Running → GracefulClosing → Stopped
//!                 │          └───────────────────────▲
//!                 └── construction failure ─────────┘
//! ```
//!
//! Only kcp and quic instances watch for termination signals. On SIGINT or
//! SIGTERM the instance gets a bounded graceful close; if its run loop has
//! not returned once the budget elapses it is dropped.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::RunContext;
use crate::tunnel::error::TunnelResult;
use crate::tunnel::service::ServiceFactory;
use crate::tunnel::types::LifecycleState;

/// Budget given to an instance to close after a termination signal.
pub const GRACEFUL_CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Slack on top of the close budget before the run loop is dropped.
const FORCE_CLOSE_MARGIN: Duration = Duration::from_millis(50);

/// Future resolving when the instance should shut down.
pub type ShutdownTrigger = BoxFuture<'static, ()>;

/// Produces a fresh [`ShutdownTrigger`] for every controller run.
pub type TriggerFactory = Arc<dyn Fn() -> ShutdownTrigger + Send + Sync>;

/// Resolves on SIGINT or SIGTERM (Ctrl-C outside unix).
pub fn termination_signal() -> ShutdownTrigger {
    Box::pin(async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigint, mut sigterm) =
                match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                    (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                    (Err(e), _) | (_, Err(e)) => {
                        error!(error = %e, "Failed to register termination signal handlers");
                        return std::future::pending().await;
                    }
                };

            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                return std::future::pending().await;
            }
            info!("Received Ctrl-C");
        }
    })
}

/// Owns one instance from construction to termination.
pub struct LifecycleController {
    ctx: RunContext,
    factory: Arc<dyn ServiceFactory>,
    shutdown_trigger: TriggerFactory,
    state: watch::Sender<LifecycleState>,
}

impl LifecycleController {
    pub fn new(ctx: RunContext, factory: Arc<dyn ServiceFactory>) -> Self {
        let (state, _) = watch::channel(LifecycleState::Created);
        LifecycleController {
            ctx,
            factory,
            shutdown_trigger: Arc::new(termination_signal),
            state,
        }
    }

    /// Replace the OS termination signal, e.g. with a channel in tests.
    pub fn with_shutdown_trigger(mut self, trigger: TriggerFactory) -> Self {
        self.shutdown_trigger = trigger;
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Whether this instance's protocol needs the termination-signal watcher.
    pub fn watches_signals(&self) -> bool {
        self.ctx.common.protocol.requires_graceful_close()
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        info!(source = %self.ctx.source, from = %previous, to = %next, "Lifecycle transition");
    }

    /// Construct the instance and block until its run loop returns.
    ///
    /// The instance's terminal error is returned unchanged.
    pub async fn run(&self) -> TunnelResult<()> {
        let source = &self.ctx.source;
        if source.is_default() {
            info!("Start service for default config");
        } else {
            info!(source = %source, "Start service for {} config file", source.kind());
        }

        self.transition(LifecycleState::Starting);
        let service = match self.factory.create(&self.ctx).await {
            Ok(service) => service,
            Err(e) => {
                error!(source = %source, error = %e, "Failed to construct service");
                self.transition(LifecycleState::Stopped);
                return Err(e);
            }
        };

        self.transition(LifecycleState::Running);

        let trigger: ShutdownTrigger = if self.watches_signals() {
            info!(
                tunnel_id = %service.id(),
                protocol = %self.ctx.common.protocol,
                "Watching termination signals"
            );
            (self.shutdown_trigger)()
        } else {
            Box::pin(std::future::pending())
        };

        let run = service.run();
        tokio::pin!(run);

        let result = tokio::select! {
            result = &mut run => result,
            _ = trigger => {
                self.transition(LifecycleState::GracefulClosing);
                service.graceful_close(GRACEFUL_CLOSE_TIMEOUT).await;

                let budget = GRACEFUL_CLOSE_TIMEOUT + FORCE_CLOSE_MARGIN;
                match tokio::time::timeout(budget, &mut run).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            tunnel_id = %service.id(),
                            "Service did not stop within the close budget, terminating it"
                        );
                        Ok(())
                    }
                }
            }
        };

        self.transition(LifecycleState::Stopped);
        if source.is_default() {
            info!("Service for default config stopped");
        } else {
            info!(source = %source, "Service for {} config file stopped", source.kind());
        }

        result
    }
}
