//! Core resource model for the Cascade deployment orchestration engine.
//!
//! This crate defines the resources the engine reconciles (`Installation`,
//! `Execution`, and `DataObject`) together with the `Phase` lifecycle, the
//! annotation protocol that drives re-evaluation, and the pure error-merge
//! and phase-escalation policy shared by the reconcile controller.

pub mod cancel;
pub mod error;
pub mod meta;
pub mod phase;
pub mod resources;
pub mod types;

pub use cancel::CancelToken;
pub use error::{phase_for_last_error, try_update_error, ErrorCode, LastError};
pub use meta::{
    reconcile_trigger, ObjectMeta, ObjectRef, Operation, ReconcileTrigger, FINALIZER,
    IGNORE_ANNOTATION, OPERATION_ANNOTATION,
};
pub use phase::Phase;
pub use resources::{
    DataExport, DataImport, DataObject, DeployItemStatus, DeployItemTemplate, Execution,
    ExecutionSpec, ExecutionStatus, ExportStatusEntry, ImportStatusEntry, Installation,
    InstallationSpec, InstallationStatus, Resource, SourceType,
};
pub use types::{ConfigGeneration, ExportKey};
