//! External collaborator interfaces for the save queue.
//!
//! The queue never talks to the backend directly; it goes through two traits
//! the host application implements:
//!
//! - [`RemotePersist`] — ships one project's diff to the remote store.
//! - [`HealthGate`] — a pre-flight probe consulted before each processing
//!   pass, and notified after a failed write so the queue avoids hammering a
//!   known-bad backend.
//!
//! Transport timeouts are the transport's concern; any transport-level
//! failure surfaces here as a [`PersistError`] and takes the same retry path
//! as an explicit rejection.

use async_trait::async_trait;
use uuid::Uuid;

use crate::diff::StateMap;

/// Failure of a remote persist attempt.
#[derive(Debug, Clone)]
pub enum PersistError {
    /// The remote store rejected the write.
    Rejected(String),
    /// The write never reached the remote store (connection reset, timeout).
    Transport(String),
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistError::Rejected(e) => write!(f, "Persist rejected: {e}"),
            PersistError::Transport(e) => write!(f, "Persist transport error: {e}"),
        }
    }
}

impl std::error::Error for PersistError {}

/// Remote persistence API for project diffs.
///
/// A failed attempt is retried verbatim, so implementations must tolerate
/// receiving the same diff for the same project more than once. Last-write-
/// wins semantics on the remote side are sufficient.
#[async_trait]
pub trait RemotePersist: Send + Sync {
    /// Apply `diff` to the remote copy of `project_id`.
    async fn persist(&self, project_id: Uuid, diff: &StateMap) -> Result<(), PersistError>;
}

/// Backend health probe consulted before each processing pass.
#[async_trait]
pub trait HealthGate: Send + Sync {
    /// Whether the backend is believed reachable right now.
    async fn ensure_healthy(&self) -> bool;

    /// Record that a write just failed and the connection may be bad.
    fn mark_unhealthy(&self);
}

/// Health gate that always reports healthy, for hosts without a probe.
pub struct AlwaysHealthy;

#[async_trait]
impl HealthGate for AlwaysHealthy {
    async fn ensure_healthy(&self) -> bool {
        true
    }

    fn mark_unhealthy(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_error_display() {
        let err = PersistError::Rejected("quota exceeded".into());
        assert!(err.to_string().contains("rejected"));
        assert!(err.to_string().contains("quota exceeded"));

        let err = PersistError::Transport("connection reset".into());
        assert!(err.to_string().contains("transport"));
    }

    #[tokio::test]
    async fn test_always_healthy() {
        let gate = AlwaysHealthy;
        assert!(gate.ensure_healthy().await);
        gate.mark_unhealthy(); // no-op
        assert!(gate.ensure_healthy().await);
    }
}
