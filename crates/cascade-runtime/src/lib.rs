//! Execution-layer collaborator interface for Cascade.
//!
//! The engine drives phases and dependencies; the actual workload
//! deployment (rendering deploy items, pulling artifacts, applying
//! infrastructure) happens behind the [`ExecutionBackend`] trait. The
//! crate ships a scriptable [`MockBackend`] so the engine can be tested
//! without any deployment machinery.

pub mod backend;
pub mod mock;

pub use backend::ExecutionBackend;
pub use mock::MockBackend;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("reconcile failed: {0}")]
    ReconcileFailed(String),
    #[error("delete failed: {0}")]
    DeleteFailed(String),
    #[error("deploy item check failed: {0}")]
    DeployItemCheck(String),
    #[error("operation cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = RuntimeError::ReconcileFailed("chart render broke".to_owned());
        assert!(e.to_string().contains("chart render broke"));
        assert!(RuntimeError::Cancelled.to_string().contains("cancelled"));
    }
}
