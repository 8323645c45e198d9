//! Typed accessors over data objects.
//!
//! Data objects are addressed by `(namespace, context, key)`; the store name
//! is derived from context and key, so lookups never need a list scan.

use crate::resources::ResourceStore;
use crate::StoreError;
use cascade_api::{DataObject, ExportKey, ObjectRef, Resource};

#[derive(Debug, Clone)]
pub struct DataObjectStore {
    inner: ResourceStore<DataObject>,
}

impl DataObjectStore {
    pub fn new(inner: ResourceStore<DataObject>) -> Self {
        Self { inner }
    }

    /// Fetch the data object holding `key` within `context`.
    pub fn get_by_key(
        &self,
        namespace: &str,
        context: &str,
        key: &ExportKey,
    ) -> Result<DataObject, StoreError> {
        let name = DataObject::object_name(context, key);
        self.inner.get(&ObjectRef::new(namespace, name))
    }

    /// Write a data object, creating it or replacing the stored value.
    ///
    /// Export sets are recomputed wholesale on each completion, so the last
    /// constructed value wins; version bookkeeping is handled internally.
    pub fn upsert(&self, dobj: &DataObject) -> Result<(), StoreError> {
        let mut dobj = dobj.clone();
        let r = dobj.meta().object_ref();
        match self.inner.get(&r) {
            Ok(current) => {
                dobj.meta_mut().resource_version = current.meta().resource_version;
                self.inner.update(&mut dobj)
            }
            Err(e) if e.is_not_found() => self.inner.create(&mut dobj),
            Err(e) => Err(e),
        }
    }

    /// All data objects of a namespace belonging to `context`, sorted by key.
    pub fn list_context(&self, namespace: &str, context: &str) -> Result<Vec<DataObject>, StoreError> {
        let mut objects: Vec<DataObject> = self
            .inner
            .list(namespace)?
            .into_iter()
            .filter(|d| d.context == context)
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    pub fn delete(&self, r: &ObjectRef) -> Result<(), StoreError> {
        self.inner.delete(r)
    }
}
