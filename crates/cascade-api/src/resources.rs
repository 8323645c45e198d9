//! The three resource kinds driven by the engine.
//!
//! An `Installation` is a node in the deployment dependency tree, declaring
//! data imports and exports. Its deployable-unit counterpart, the
//! `Execution`, is the object the phase state machine drives. `DataObject`s
//! are the named values flowing between installations via import/export.

use crate::error::LastError;
use crate::meta::{ObjectMeta, ObjectRef};
use crate::phase::Phase;
use crate::types::{ConfigGeneration, ExportKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored resource: serializable, with common object metadata.
pub trait Resource: Serialize + DeserializeOwned + Clone {
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
}

/// Declared data import: `data_ref` names the export to consume, `name` is
/// the import's local handle inside the installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataImport {
    pub name: String,
    pub data_ref: ExportKey,
}

/// Declared data export: the execution output named `name` is published
/// under the context-scoped key `data_ref`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataExport {
    pub name: String,
    pub data_ref: ExportKey,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallationSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<DataImport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<DataExport>,
}

/// Per-import record of what was last consumed, used for staleness detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportStatusEntry {
    pub name: String,
    pub data_ref: ExportKey,
    /// The installation that produced the consumed value, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<ObjectRef>,
    /// Config generation of the source at consumption time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_generation: Option<ConfigGeneration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportStatusEntry {
    pub name: String,
    pub data_ref: ExportKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_generation: Option<ConfigGeneration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallationStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub observed_generation: i64,
    /// Version token of this installation's current export set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_generation: Option<ConfigGeneration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportStatusEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<ExportStatusEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_ref: Option<ObjectRef>,
}

/// A node in the deployment dependency tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Installation {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: InstallationSpec,
    #[serde(default)]
    pub status: InstallationStatus,
}

impl Installation {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, name),
            spec: InstallationSpec::default(),
            status: InstallationStatus::default(),
        }
    }
}

impl Resource for Installation {
    const KIND: &'static str = "installations";

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

/// Opaque deploy item template; the execution layer interprets `config`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployItemTemplate {
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Phase and generation of a deploy item as last observed by the controller,
/// compared by the completed-phase fast path to detect constituent changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployItemStatus {
    pub name: String,
    pub phase: Phase,
    #[serde(default)]
    pub observed_generation: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deploy_items: Vec<DeployItemTemplate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    /// Output values produced by the workload, keyed by export name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exports: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deploy_items: Vec<DeployItemStatus>,
}

/// The deployable-unit counterpart of an installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Execution {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: ExecutionSpec,
    #[serde(default)]
    pub status: ExecutionStatus,
}

impl Execution {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, name),
            spec: ExecutionSpec::default(),
            status: ExecutionStatus::default(),
        }
    }
}

impl Resource for Execution {
    const KIND: &'static str = "executions";

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

/// Origin of a data object's value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Produced by an execution's workload output.
    ExecutionOutput,
    /// Produced by another installation's export.
    InstallationExport,
    /// Supplied manually, not produced by any installation.
    Manual,
}

/// An exported or imported named value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataObject {
    pub meta: ObjectMeta,
    /// The context scope the value is visible in.
    pub context: String,
    pub key: ExportKey,
    pub data: serde_json::Value,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<ObjectRef>,
}

impl DataObject {
    pub fn new(
        namespace: impl Into<String>,
        context: impl Into<String>,
        key: ExportKey,
        data: serde_json::Value,
        source_type: SourceType,
        source_ref: Option<ObjectRef>,
    ) -> Self {
        let namespace = namespace.into();
        let context = context.into();
        let name = Self::object_name(&context, &key);
        Self {
            meta: ObjectMeta::new(namespace, name),
            context,
            key,
            data,
            source_type,
            source_ref,
        }
    }

    /// Deterministic store name for the data object holding `key` in
    /// `context`. Content-derived so producers and consumers agree on it
    /// without coordination.
    pub fn object_name(context: &str, key: &ExportKey) -> String {
        let digest = blake3::hash(format!("{context}/{key}").as_bytes())
            .to_hex()
            .to_string();
        digest[..24].to_owned()
    }

    /// Version token of the current value: digest of the canonical JSON data.
    pub fn config_generation(&self) -> ConfigGeneration {
        let canonical = serde_json::to_string(&self.data).unwrap_or_default();
        ConfigGeneration::new(blake3::hash(canonical.as_bytes()).to_hex().to_string())
    }
}

impl Resource for DataObject {
    const KIND: &'static str = "dataobjects";

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}
