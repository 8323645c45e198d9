//! Export construction for completed installations.
//!
//! The constructor merges two value sources into the installation's
//! parent-visible export set: output produced by its own execution, and
//! values published by completed siblings declaring the same key. Local
//! workload output shadows a sibling export of the same key. Construction
//! only reads; persisting the returned set is the caller's job (see
//! [`persist_exports`]).

use crate::installations::{self, residence_context};
use crate::CoreError;
use cascade_api::{
    CancelToken, ConfigGeneration, DataExport, DataObject, ExportStatusEntry, Installation,
    SourceType,
};
use cascade_store::Client;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub struct Constructor<'a> {
    client: &'a Client,
}

impl<'a> Constructor<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Build the export set of `inst`, ordered by export declaration.
    ///
    /// Every declared key must resolve to exactly one source; a key with no
    /// source and a key provided by two completed siblings are both hard
    /// integrity errors, never silently degraded.
    pub fn construct(
        &self,
        token: &CancelToken,
        inst: &Installation,
    ) -> Result<Vec<DataObject>, CoreError> {
        let context = residence_context(inst);
        let exec_exports = self.execution_exports(inst)?;

        let mut seen = BTreeSet::new();
        let mut out = Vec::with_capacity(inst.spec.exports.len());
        for export in &inst.spec.exports {
            if token.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            if !seen.insert(export.data_ref.clone()) {
                return Err(CoreError::DuplicateExportKey {
                    installation: inst.meta.object_ref(),
                    key: export.data_ref.clone(),
                });
            }
            if let Some(value) = exec_exports.get(&export.name) {
                out.push(DataObject::new(
                    &inst.meta.namespace,
                    &context,
                    export.data_ref.clone(),
                    value.clone(),
                    SourceType::ExecutionOutput,
                    Some(inst.meta.object_ref()),
                ));
                continue;
            }
            out.push(self.sibling_export(inst, &context, export)?);
        }
        Ok(out)
    }

    /// Output values of the installation's own execution, keyed by the
    /// export's internal name. A missing execution contributes nothing.
    fn execution_exports(&self, inst: &Installation) -> Result<BTreeMap<String, Value>, CoreError> {
        let Some(exec_ref) = &inst.status.execution_ref else {
            return Ok(BTreeMap::new());
        };
        match self.client.executions().get(exec_ref) {
            Ok(exec) => Ok(exec.status.exports),
            Err(e) if e.is_not_found() => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn sibling_export(
        &self,
        inst: &Installation,
        context: &str,
        export: &DataExport,
    ) -> Result<DataObject, CoreError> {
        let mut provider: Option<Installation> = None;
        for sibling in installations::siblings(self.client, inst)? {
            if !sibling.status.phase.is_completed() {
                continue;
            }
            if !sibling
                .spec
                .exports
                .iter()
                .any(|e| e.data_ref == export.data_ref)
            {
                continue;
            }
            if let Some(first) = provider {
                return Err(CoreError::AmbiguousExportSource {
                    key: export.data_ref.clone(),
                    first: first.meta.object_ref(),
                    second: sibling.meta.object_ref(),
                });
            }
            provider = Some(sibling);
        }
        let Some(provider) = provider else {
            return Err(CoreError::ExportSourceMissing {
                installation: inst.meta.object_ref(),
                key: export.data_ref.clone(),
            });
        };
        let published = match self.client.data_objects().get_by_key(
            &inst.meta.namespace,
            context,
            &export.data_ref,
        ) {
            Ok(dobj) => dobj,
            // declared and completed, but the value was never published
            Err(e) if e.is_not_found() => {
                return Err(CoreError::ExportSourceMissing {
                    installation: inst.meta.object_ref(),
                    key: export.data_ref.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(DataObject::new(
            &inst.meta.namespace,
            context,
            export.data_ref.clone(),
            published.data,
            SourceType::InstallationExport,
            Some(provider.meta.object_ref()),
        ))
    }
}

/// Aggregate version token over a constructed export set. Order of the
/// slice does not matter; the digest is computed over the keys sorted.
pub fn config_generation_for(objects: &[DataObject]) -> ConfigGeneration {
    let mut lines: Vec<String> = objects
        .iter()
        .map(|d| format!("{}={}", d.key, d.config_generation()))
        .collect();
    lines.sort();
    ConfigGeneration::new(blake3::hash(lines.join("\n").as_bytes()).to_hex().to_string())
}

/// Write a constructed export set and record it in the installation's
/// status: per-export entries with their config generations plus the
/// aggregated `status.config_generation` consumers use to detect staleness.
/// The caller still persists `inst` itself.
pub fn persist_exports(
    client: &Client,
    inst: &mut Installation,
    objects: &[DataObject],
) -> Result<(), CoreError> {
    for dobj in objects {
        client.data_objects().upsert(dobj)?;
    }
    inst.status.exports = inst
        .spec
        .exports
        .iter()
        .filter_map(|export| {
            objects
                .iter()
                .find(|d| d.key == export.data_ref)
                .map(|d| ExportStatusEntry {
                    name: export.name.clone(),
                    data_ref: export.data_ref.clone(),
                    config_generation: Some(d.config_generation()),
                })
        })
        .collect();
    inst.status.config_generation = Some(config_generation_for(objects));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_api::ExportKey;
    use serde_json::json;

    fn dobj(key: &str, data: Value) -> DataObject {
        DataObject::new(
            "test1",
            "default",
            ExportKey::new(key),
            data,
            SourceType::ExecutionOutput,
            None,
        )
    }

    #[test]
    fn config_generation_ignores_order() {
        let a = dobj("root.y", json!("val-exec"));
        let b = dobj("root.z", json!("val-b"));
        let forward = config_generation_for(&[a.clone(), b.clone()]);
        let backward = config_generation_for(&[b, a]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn config_generation_tracks_values() {
        let base = config_generation_for(&[dobj("root.y", json!("v1"))]);
        assert_ne!(base, config_generation_for(&[dobj("root.y", json!("v2"))]));
        assert_ne!(base, config_generation_for(&[dobj("root.z", json!("v1"))]));
        assert_eq!(base, config_generation_for(&[dobj("root.y", json!("v1"))]));
    }
}
