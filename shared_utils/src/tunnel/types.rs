//! Type definitions for the tunnel module.

use std::fmt;

/// Unique identifier for a client instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TunnelId(pub String);

impl TunnelId {
    /// A fresh random identifier, also used as the login run id.
    pub fn generate() -> Self {
        TunnelId(format!("client-{}", uuid::Uuid::new_v4()))
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TunnelId {
    fn from(s: String) -> Self {
        TunnelId(s)
    }
}

impl From<&str> for TunnelId {
    fn from(s: &str) -> Self {
        TunnelId(s.to_string())
    }
}

/// Lifecycle state of one client instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Controller built, service not constructed yet
    Created,
    /// Service being constructed
    Starting,
    /// Service run loop active
    Running,
    /// Termination signal received, bounded shutdown in progress
    GracefulClosing,
    /// Run loop returned; terminal
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::GracefulClosing => "graceful-closing",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = TunnelId::generate();
        let b = TunnelId::generate();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("client-"));
    }
}
