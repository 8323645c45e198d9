//! Import dependency resolution over the installation tree.
//!
//! An installation may only make forward progress once every peer it
//! imports data from has settled. The walk covers direct siblings, their
//! transitive sibling dependencies, and every ancestor level (an uncle
//! subtree the grandparent depends on gates the whole branch). All
//! traversal is read-only and short-circuits on the first incomplete
//! dependency.

use crate::installations::{self, residence_context};
use crate::CoreError;
use cascade_api::{CancelToken, DataImport, Installation, ObjectRef, SourceType};
use cascade_store::Client;
use std::collections::BTreeSet;

/// Where a declared import's value comes from.
enum ImportSource {
    /// Produced by another installation; a real dependency.
    Installation(ObjectRef),
    /// Manually supplied data, not produced by any installation.
    Manual,
}

/// `Ok(true)` only if every direct and transitive sibling dependency, at
/// every ancestor level, has settled. Lookup errors abort the walk; there
/// is no partial or degraded success.
pub fn dependencies_satisfied(
    client: &Client,
    token: &CancelToken,
    inst: &Installation,
) -> Result<bool, CoreError> {
    let mut visited = BTreeSet::new();
    if !completed_sibling_dependents(client, token, inst, &mut visited)? {
        return Ok(false);
    }

    let mut ancestors = BTreeSet::new();
    ancestors.insert(inst.meta.object_ref());
    let mut current = inst.clone();
    while let Some(parent) = installations::get_parent(client, &current)? {
        if token.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        if !ancestors.insert(parent.meta.object_ref()) {
            // malformed owner reference forming a cycle
            tracing::warn!(object = %parent.meta.object_ref(), "owner chain loops, stopping ancestor walk");
            break;
        }
        if !completed_sibling_dependents(client, token, &parent, &mut visited)? {
            return Ok(false);
        }
        current = parent;
    }
    Ok(true)
}

fn completed_sibling_dependents(
    client: &Client,
    token: &CancelToken,
    inst: &Installation,
    visited: &mut BTreeSet<ObjectRef>,
) -> Result<bool, CoreError> {
    if token.is_cancelled() {
        return Err(CoreError::Cancelled);
    }
    if !visited.insert(inst.meta.object_ref()) {
        // already vetted on this walk
        return Ok(true);
    }
    for import in &inst.spec.imports {
        let source = match import_source(client, inst, import)? {
            ImportSource::Installation(source) => source,
            ImportSource::Manual => continue,
        };
        // Self and parent supplied imports are covered by the ancestor
        // walk; checking them here would fail on a parent that has not yet
        // produced this generation's export.
        if installations::is_reference_to(&source, &inst.meta) {
            continue;
        }
        if inst.meta.owner.as_ref() == Some(&source) {
            continue;
        }
        let sibling = match client.installations().get(&source) {
            Ok(sibling) => sibling,
            Err(e) if e.is_not_found() => {
                tracing::debug!(
                    object = %inst.meta.object_ref(),
                    source = %source,
                    "import source installation is gone"
                );
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        if !installations::is_settled(&sibling) {
            tracing::debug!(
                object = %inst.meta.object_ref(),
                sibling = %source,
                phase = %sibling.status.phase,
                "sibling dependency not completed"
            );
            return Ok(false);
        }
        // Completed alone is not enough: the sibling's own upstream
        // producers may have moved on, so its imports are checked
        // transitively.
        if !completed_sibling_dependents(client, token, &sibling, visited)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Resolve an import's source, preferring the source recorded in the
/// installation's own import status (avoids a store round trip) before
/// falling back to the backing data object's attribution. A declared
/// import without a backing data object aborts with the lookup error;
/// lookup failures are never degraded to an unsatisfied result.
fn import_source(
    client: &Client,
    inst: &Installation,
    import: &DataImport,
) -> Result<ImportSource, CoreError> {
    if let Some(entry) = inst
        .status
        .imports
        .iter()
        .find(|e| e.data_ref == import.data_ref)
    {
        return Ok(match &entry.source_ref {
            Some(source) => ImportSource::Installation(source.clone()),
            None => ImportSource::Manual,
        });
    }
    let context = residence_context(inst);
    let dobj = client
        .data_objects()
        .get_by_key(&inst.meta.namespace, &context, &import.data_ref)?;
    Ok(match dobj.source_ref {
        Some(source) if dobj.source_type != SourceType::Manual => {
            ImportSource::Installation(source)
        }
        _ => ImportSource::Manual,
    })
}

/// Whether any recorded import was consumed at a config generation that no
/// longer matches the producer's current one. Sourced imports compare
/// against the producing installation's status; manual imports compare
/// against the backing data object's current content digest. A vanished
/// producer or data object counts as outdated.
pub fn outdated_imports(client: &Client, inst: &Installation) -> Result<bool, CoreError> {
    let context = residence_context(inst);
    for entry in &inst.status.imports {
        match &entry.source_ref {
            Some(source) => {
                let producer = match client.installations().get(source) {
                    Ok(producer) => producer,
                    Err(e) if e.is_not_found() => return Ok(true),
                    Err(e) => return Err(e.into()),
                };
                if producer.status.config_generation != entry.config_generation {
                    return Ok(true);
                }
            }
            None => {
                match client
                    .data_objects()
                    .get_by_key(&inst.meta.namespace, &context, &entry.data_ref)
                {
                    Ok(dobj) => {
                        if entry.config_generation != Some(dobj.config_generation()) {
                            return Ok(true);
                        }
                    }
                    Err(e) if e.is_not_found() => return Ok(true),
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_api::{DataObject, ExportKey, ImportStatusEntry, Phase};
    use serde_json::json;

    fn client() -> (tempfile::TempDir, Client) {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::open(dir.path()).unwrap();
        (dir, client)
    }

    fn create(client: &Client, name: &str) -> Installation {
        let mut inst = Installation::new("test1", name);
        client.installations().create(&mut inst).unwrap();
        inst
    }

    fn import_from(inst: &mut Installation, key: &str, source: Option<&str>) {
        inst.spec.imports.push(DataImport {
            name: key.to_owned(),
            data_ref: ExportKey::new(key),
        });
        inst.status.imports.push(ImportStatusEntry {
            name: key.to_owned(),
            data_ref: ExportKey::new(key),
            source_ref: source.map(|s| ObjectRef::new("test1", s)),
            config_generation: None,
        });
    }

    fn settle(client: &Client, inst: &mut Installation) {
        inst.status.phase = Phase::Completed;
        inst.status.observed_generation = inst.meta.generation;
        client.installations().update_status(inst).unwrap();
    }

    #[test]
    fn manual_import_is_not_a_dependency() {
        let (_dir, client) = client();
        let mut a = create(&client, "a");
        import_from(&mut a, "root.x", None);

        let token = CancelToken::new();
        assert!(dependencies_satisfied(&client, &token, &a).unwrap());
    }

    #[test]
    fn missing_data_object_aborts_with_lookup_error() {
        let (_dir, client) = client();
        let mut a = create(&client, "a");
        // declared but never recorded in status and no data object exists
        a.spec.imports.push(DataImport {
            name: "y".to_owned(),
            data_ref: ExportKey::new("root.y"),
        });

        let token = CancelToken::new();
        let err = dependencies_satisfied(&client, &token, &a).unwrap_err();
        assert!(matches!(err, CoreError::Store(e) if e.is_not_found()));
    }

    #[test]
    fn cold_path_resolves_source_from_data_object() {
        let (_dir, client) = client();
        let mut b = create(&client, "b");
        settle(&client, &mut b);

        let dobj = DataObject::new(
            "test1",
            "default",
            ExportKey::new("root.y"),
            json!("val-b"),
            SourceType::InstallationExport,
            Some(ObjectRef::new("test1", "b")),
        );
        client.data_objects().upsert(&dobj).unwrap();

        let mut a = create(&client, "a");
        a.spec.imports.push(DataImport {
            name: "y".to_owned(),
            data_ref: ExportKey::new("root.y"),
        });

        let token = CancelToken::new();
        assert!(dependencies_satisfied(&client, &token, &a).unwrap());
    }

    #[test]
    fn cancelled_token_aborts_walk() {
        let (_dir, client) = client();
        let a = create(&client, "a");
        let token = CancelToken::new();
        token.cancel();

        let err = dependencies_satisfied(&client, &token, &a).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn self_and_parent_sources_are_skipped() {
        let (_dir, client) = client();
        let mut root = create(&client, "root");
        settle(&client, &mut root);

        let mut a = Installation::new("test1", "a");
        a.meta.owner = Some(ObjectRef::new("test1", "root"));
        client.installations().create(&mut a).unwrap();
        import_from(&mut a, "root.self", Some("a"));
        import_from(&mut a, "root.parent", Some("root"));

        let token = CancelToken::new();
        assert!(dependencies_satisfied(&client, &token, &a).unwrap());
    }

    #[test]
    fn outdated_when_producer_generation_moved() {
        let (_dir, client) = client();
        let mut b = create(&client, "b");
        b.status.config_generation = Some("new".into());
        settle(&client, &mut b);

        let mut a = create(&client, "a");
        import_from(&mut a, "root.y", Some("b"));
        a.status.imports[0].config_generation = Some("old".into());
        assert!(outdated_imports(&client, &a).unwrap());

        a.status.imports[0].config_generation = Some("new".into());
        assert!(!outdated_imports(&client, &a).unwrap());
    }

    #[test]
    fn outdated_when_manual_data_changed() {
        let (_dir, client) = client();
        let dobj = DataObject::new(
            "test1",
            "default",
            ExportKey::new("root.m"),
            json!("v1"),
            SourceType::Manual,
            None,
        );
        client.data_objects().upsert(&dobj).unwrap();

        let mut a = create(&client, "a");
        import_from(&mut a, "root.m", None);
        a.status.imports[0].config_generation = Some(dobj.config_generation());
        assert!(!outdated_imports(&client, &a).unwrap());

        let mut changed = dobj.clone();
        changed.data = json!("v2");
        client.data_objects().upsert(&changed).unwrap();
        assert!(outdated_imports(&client, &a).unwrap());
    }
}
