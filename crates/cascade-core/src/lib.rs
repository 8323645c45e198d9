//! The Cascade engine: dependency-ordered phase orchestration.
//!
//! Three pieces cooperate per invocation. The [`imports`] resolver decides
//! whether a unit's data dependencies have settled and gates forward
//! progress. The [`controller::ExecutionController`] state machine drives
//! the unit through its lifecycle phases, delegating the substantive work
//! to an `ExecutionBackend`. The [`exports::Constructor`] merges the unit's
//! own workload output with completed sibling exports into the export set
//! the next level consumes as imports.

pub mod controller;
pub mod exports;
pub mod imports;
pub mod installations;

pub use controller::ExecutionController;
pub use exports::{config_generation_for, persist_exports, Constructor};
pub use imports::{dependencies_satisfied, outdated_imports};

pub use cascade_api::CancelToken;

use cascade_api::{ExportKey, LastError, ObjectRef};
use cascade_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invocation cancelled")]
    Cancelled,
    #[error("reconcile ended with recorded error: {0}")]
    Reconcile(LastError),
    #[error("{installation} declares export '{key}' more than once")]
    DuplicateExportKey {
        installation: ObjectRef,
        key: ExportKey,
    },
    #[error("export '{key}' of {installation} has no source: no execution output and no completed sibling provides it")]
    ExportSourceMissing {
        installation: ObjectRef,
        key: ExportKey,
    },
    #[error("export '{key}' is provided by both {first} and {second}")]
    AmbiguousExportSource {
        key: ExportKey,
        first: ObjectRef,
        second: ObjectRef,
    },
}

impl CoreError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }

    /// Integrity errors indicate a configuration defect rather than a
    /// timing issue; waiting will not fix them.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            CoreError::DuplicateExportKey { .. }
                | CoreError::ExportSourceMissing { .. }
                | CoreError::AmbiguousExportSource { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_classification() {
        let err = CoreError::ExportSourceMissing {
            installation: ObjectRef::new("test1", "root"),
            key: ExportKey::new("root.q"),
        };
        assert!(err.is_integrity());
        assert!(!err.is_cancelled());
        assert!(!CoreError::Cancelled.is_integrity());
    }

    #[test]
    fn store_error_conversion() {
        let store = StoreError::NotFound {
            kind: "executions",
            name: "test1/root".to_owned(),
        };
        let err: CoreError = store.into();
        assert!(matches!(err, CoreError::Store(e) if e.is_not_found()));
    }
}
