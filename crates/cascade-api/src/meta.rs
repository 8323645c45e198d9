//! Object metadata, references, and the annotation protocol.
//!
//! Reconciliation is requested through annotations rather than spec changes:
//! a `reconcile` operation asks for one re-evaluation and is stripped once
//! processed, `force-reconcile` additionally bypasses the completed-phase
//! fast path and is stripped only after the full cycle, and `ignore` skips
//! reconciliation entirely while the object rests in a completed phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Annotation carrying a requested operation (`reconcile` / `force-reconcile`).
pub const OPERATION_ANNOTATION: &str = "cascade.io/operation";

/// Annotation that suspends reconciliation of a completed object.
pub const IGNORE_ANNOTATION: &str = "cascade.io/ignore";

/// Finalizer guarding teardown: removed only after the execution layer has
/// finished its delete work, which releases the object for store reclamation.
pub const FINALIZER: &str = "cascade.io/finalizer";

/// Namespaced reference to another object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Operation requested via the [`OPERATION_ANNOTATION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Reconcile,
    ForceReconcile,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Reconcile => "reconcile",
            Operation::ForceReconcile => "force-reconcile",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "reconcile" => Some(Operation::Reconcile),
            "force-reconcile" => Some(Operation::ForceReconcile),
            _ => None,
        }
    }
}

/// Metadata common to all stored resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    /// Monotonically increasing on every spec change.
    #[serde(default)]
    pub generation: i64,
    /// Store-managed optimistic concurrency token; bumped on every write.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    /// Parent in the installation tree; `None` for root objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ObjectRef>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            generation: 1,
            ..Self::default()
        }
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(&self.namespace, &self.name)
    }

    /// The currently requested operation, if any (and recognized).
    pub fn operation(&self) -> Option<Operation> {
        self.annotations
            .get(OPERATION_ANNOTATION)
            .and_then(|v| Operation::parse(v))
    }

    pub fn has_operation(&self, op: Operation) -> bool {
        self.operation() == Some(op)
    }

    pub fn set_operation(&mut self, op: Operation) {
        self.annotations
            .insert(OPERATION_ANNOTATION.to_owned(), op.as_str().to_owned());
    }

    pub fn remove_operation(&mut self) {
        self.annotations.remove(OPERATION_ANNOTATION);
    }

    pub fn has_ignore_annotation(&self) -> bool {
        self.annotations.get(IGNORE_ANNOTATION).map(String::as_str) == Some("true")
    }

    pub fn set_ignore_annotation(&mut self) {
        self.annotations
            .insert(IGNORE_ANNOTATION.to_owned(), "true".to_owned());
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    pub fn add_finalizer(&mut self, finalizer: &str) {
        if !self.has_finalizer(finalizer) {
            self.finalizers.push(finalizer.to_owned());
        }
    }

    pub fn remove_finalizer(&mut self, finalizer: &str) {
        self.finalizers.retain(|f| f != finalizer);
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// Why a reconcile cycle must restart from `Init`, derived once at the top
/// of an invocation instead of re-inspecting annotations in several places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileTrigger {
    /// No restart needed; continue from the current phase.
    None,
    /// A reconcile or force-reconcile annotation is pending.
    Operation(Operation),
    /// The spec changed since the last fully processed generation.
    OutdatedGeneration,
}

/// Derive the restart trigger from metadata and the last observed generation.
pub fn reconcile_trigger(meta: &ObjectMeta, observed_generation: i64) -> ReconcileTrigger {
    if let Some(op) = meta.operation() {
        return ReconcileTrigger::Operation(op);
    }
    if observed_generation != meta.generation {
        return ReconcileTrigger::OutdatedGeneration;
    }
    ReconcileTrigger::None
}
