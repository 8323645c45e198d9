//! Declarative resource store for Cascade.
//!
//! This crate persists `Installation`, `Execution`, and `DataObject`
//! resources as JSON files with atomic writes and optimistic concurrency:
//! every write bumps a resource version, and a write against a stale version
//! is rejected as a conflict rather than silently overwritten. It also
//! provides the `EventRecorder` sink consumed by the reconcile controller
//! and an fs2-based store lock for cross-process exclusivity.

pub mod data_objects;
pub mod events;
pub mod layout;
pub mod lock;
pub mod resources;

pub use data_objects::DataObjectStore;
pub use events::{Event, EventRecorder, EventType, LogRecorder, MemoryRecorder};
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use lock::StoreLock;
pub use resources::ResourceStore;

use cascade_api::{DataObject, Execution, Installation};
use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },
    #[error("conflict writing {kind} '{name}': resource version {expected} expected, store has {found}")]
    Conflict {
        kind: &'static str,
        name: String,
        expected: u64,
        found: u64,
    },
    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: &'static str, name: String },
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
}

impl StoreError {
    /// The object vanished between enqueue and processing; callers treat
    /// this as success-no-op.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Concurrent modification; callers end the invocation and rely on the
    /// watch re-trigger instead of retrying in-process.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Bundle of the typed stores over one store root.
#[derive(Debug, Clone)]
pub struct Client {
    installations: ResourceStore<Installation>,
    executions: ResourceStore<Execution>,
    data_objects: DataObjectStore,
}

impl Client {
    /// Open (and initialize if necessary) the store rooted at `root`.
    pub fn open(root: impl Into<std::path::PathBuf>) -> Result<Self, StoreError> {
        let layout = StoreLayout::new(root);
        layout.initialize()?;
        Ok(Self {
            installations: ResourceStore::new(layout.clone()),
            executions: ResourceStore::new(layout.clone()),
            data_objects: DataObjectStore::new(ResourceStore::new(layout)),
        })
    }

    pub fn installations(&self) -> &ResourceStore<Installation> {
        &self.installations
    }

    pub fn executions(&self) -> &ResourceStore<Execution> {
        &self.executions
    }

    pub fn data_objects(&self) -> &DataObjectStore {
        &self.data_objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_open_initializes_store() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::open(dir.path()).unwrap();
        assert!(client.installations().list("any").unwrap().is_empty());
    }

    #[test]
    fn error_display_conflict() {
        let e = StoreError::Conflict {
            kind: "executions",
            name: "test1/root".to_owned(),
            expected: 2,
            found: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains("conflict"));
        assert!(msg.contains("test1/root"));
        assert!(e.is_conflict());
        assert!(!e.is_not_found());
    }

    #[test]
    fn error_display_not_found() {
        let e = StoreError::NotFound {
            kind: "installations",
            name: "test1/a".to_owned(),
        };
        assert!(e.to_string().contains("test1/a"));
        assert!(e.is_not_found());
        assert!(!e.is_conflict());
    }
}
