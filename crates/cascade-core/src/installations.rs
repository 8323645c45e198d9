//! Helpers over the installation tree: context scopes, parent lookup,
//! sibling listing, and the settled-dependency predicate.

use cascade_api::{Installation, ObjectMeta, ObjectRef};
use cascade_store::{Client, StoreError};

/// Context scope shared by installations without a parent.
pub const DEFAULT_CONTEXT: &str = "default";

/// The context scope an installation resides in. Children share their
/// parent's scope, so sibling exports and imports meet in one namespace of
/// keys; roots share the default scope.
pub fn residence_context(inst: &Installation) -> String {
    match &inst.meta.owner {
        Some(owner) => format!("inst.{}", owner.name),
        None => DEFAULT_CONTEXT.to_owned(),
    }
}

pub fn is_reference_to(r: &ObjectRef, meta: &ObjectMeta) -> bool {
    r.namespace == meta.namespace && r.name == meta.name
}

/// Fetch the owning installation. A dangling owner reference resolves to
/// `None`, same as a root.
pub fn get_parent(client: &Client, inst: &Installation) -> Result<Option<Installation>, StoreError> {
    let Some(owner) = &inst.meta.owner else {
        return Ok(None);
    };
    match client.installations().get(owner) {
        Ok(parent) => Ok(Some(parent)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Installations sharing `inst`'s owner, excluding `inst` itself.
pub fn siblings(client: &Client, inst: &Installation) -> Result<Vec<Installation>, StoreError> {
    Ok(client
        .installations()
        .list(&inst.meta.namespace)?
        .into_iter()
        .filter(|other| other.meta.name != inst.meta.name && other.meta.owner == inst.meta.owner)
        .collect())
}

/// Whether an installation may be treated as a satisfied dependency: it is
/// completed, caught up with its current spec generation, and has no
/// reconcile request pending that would re-open it.
pub fn is_settled(inst: &Installation) -> bool {
    inst.status.phase.is_completed()
        && inst.status.observed_generation == inst.meta.generation
        && inst.meta.operation().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_api::{Operation, Phase};

    #[test]
    fn root_resides_in_default_context() {
        let root = Installation::new("test1", "root");
        assert_eq!(residence_context(&root), DEFAULT_CONTEXT);
    }

    #[test]
    fn child_resides_in_parent_scope() {
        let mut child = Installation::new("test1", "a");
        child.meta.owner = Some(ObjectRef::new("test1", "root"));
        assert_eq!(residence_context(&child), "inst.root");
    }

    #[test]
    fn settled_requires_completed_and_caught_up() {
        let mut inst = Installation::new("test1", "b");
        assert!(!is_settled(&inst));

        inst.status.phase = Phase::Completed;
        inst.status.observed_generation = inst.meta.generation;
        assert!(is_settled(&inst));

        inst.meta.generation += 1;
        assert!(!is_settled(&inst));

        inst.status.observed_generation = inst.meta.generation;
        inst.meta.set_operation(Operation::Reconcile);
        assert!(!is_settled(&inst));
    }

    #[test]
    fn siblings_share_owner_and_exclude_self() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::open(dir.path()).unwrap();
        let owner = Some(ObjectRef::new("test1", "root"));

        let mut a = Installation::new("test1", "a");
        a.meta.owner = owner.clone();
        let mut b = Installation::new("test1", "b");
        b.meta.owner = owner.clone();
        let mut stranger = Installation::new("test1", "stranger");
        stranger.meta.owner = Some(ObjectRef::new("test1", "other"));
        for inst in [&mut a, &mut b, &mut stranger] {
            client.installations().create(inst).unwrap();
        }

        let sibs = siblings(&client, &a).unwrap();
        assert_eq!(sibs.len(), 1);
        assert_eq!(sibs[0].meta.name, "b");
    }

    #[test]
    fn dangling_owner_is_rootlike() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::open(dir.path()).unwrap();
        let mut orphan = Installation::new("test1", "orphan");
        orphan.meta.owner = Some(ObjectRef::new("test1", "ghost"));
        client.installations().create(&mut orphan).unwrap();

        assert!(get_parent(&client, &orphan).unwrap().is_none());
    }
}
