//! Generic typed resource store with optimistic concurrency.
//!
//! Every successful write bumps the object's `resource_version`, both in the
//! store and on the caller's in-memory copy, so a sequence of writes through
//! one copy stays consistent. A write whose version no longer matches the
//! stored one fails with [`StoreError::Conflict`]; callers are expected to
//! end the invocation and let the next watch trigger pick up the fresh
//! object rather than retry in-process.

use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use cascade_api::{ObjectRef, Resource};
use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct ResourceStore<T> {
    layout: StoreLayout,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Resource> ResourceStore<T> {
    pub fn new(layout: StoreLayout) -> Self {
        Self {
            layout,
            _kind: PhantomData,
        }
    }

    fn path(&self, r: &ObjectRef) -> std::path::PathBuf {
        self.layout.resource_path(T::KIND, &r.namespace, &r.name)
    }

    fn not_found(r: &ObjectRef) -> StoreError {
        StoreError::NotFound {
            kind: T::KIND,
            name: r.to_string(),
        }
    }

    fn write(&self, obj: &T) -> Result<(), StoreError> {
        let meta = obj.meta();
        let dir = self.layout.namespace_dir(T::KIND, &meta.namespace);
        fs::create_dir_all(&dir)?;

        let content = serde_json::to_string_pretty(obj)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path(&meta.object_ref()))
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(())
    }

    fn remove(&self, r: &ObjectRef) -> Result<(), StoreError> {
        let path = self.path(r);
        if path.exists() {
            fs::remove_file(&path)?;
            if let Some(dir) = path.parent() {
                fsync_dir(dir)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, r: &ObjectRef) -> Result<T, StoreError> {
        let path = self.path(r);
        if !path.exists() {
            return Err(Self::not_found(r));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn exists(&self, r: &ObjectRef) -> bool {
        self.path(r).exists()
    }

    /// Store a new object. Its resource version is reset to 1.
    pub fn create(&self, obj: &mut T) -> Result<(), StoreError> {
        let r = obj.meta().object_ref();
        if self.exists(&r) {
            return Err(StoreError::AlreadyExists {
                kind: T::KIND,
                name: r.to_string(),
            });
        }
        obj.meta_mut().resource_version = 1;
        self.write(obj)
    }

    /// Write back an object read earlier. Fails with a conflict if the
    /// stored version has moved on since the caller's copy was read.
    ///
    /// An object marked for deletion whose last finalizer has been removed
    /// is reclaimed (the file is deleted) instead of written.
    pub fn update(&self, obj: &mut T) -> Result<(), StoreError> {
        let r = obj.meta().object_ref();
        let current = self.get(&r)?;
        let found = current.meta().resource_version;
        let expected = obj.meta().resource_version;
        if found != expected {
            return Err(StoreError::Conflict {
                kind: T::KIND,
                name: r.to_string(),
                expected,
                found,
            });
        }
        obj.meta_mut().resource_version += 1;

        if obj.meta().is_deleting() && obj.meta().finalizers.is_empty() {
            tracing::debug!(kind = T::KIND, object = %r, "finalizers cleared, reclaiming object");
            return self.remove(&r);
        }
        self.write(obj)
    }

    /// Status counterpart of [`update`](Self::update); identical conflict
    /// semantics, kept separate so call sites read like the protocol.
    ///
    /// The store persists whole objects, so this writes spec and meta along
    /// with status. Callers must only pass copies whose meta mutations are
    /// meant to land; a copy whose meta write just failed has to be rolled
    /// back first.
    pub fn update_status(&self, obj: &mut T) -> Result<(), StoreError> {
        self.update(obj)
    }

    /// Write `obj`, detecting conflicts against the `old` snapshot it was
    /// derived from rather than the copy's own version.
    pub fn patch(&self, obj: &mut T, old: &T) -> Result<(), StoreError> {
        let r = obj.meta().object_ref();
        let current = self.get(&r)?;
        let found = current.meta().resource_version;
        let expected = old.meta().resource_version;
        if found != expected {
            return Err(StoreError::Conflict {
                kind: T::KIND,
                name: r.to_string(),
                expected,
                found,
            });
        }
        obj.meta_mut().resource_version = found + 1;

        if obj.meta().is_deleting() && obj.meta().finalizers.is_empty() {
            return self.remove(&r);
        }
        self.write(obj)
    }

    /// Request deletion. With no finalizers the object is removed outright;
    /// otherwise only the deletion timestamp is set and the object stays
    /// until the finalizers are released.
    pub fn delete(&self, r: &ObjectRef) -> Result<(), StoreError> {
        let mut current = self.get(r)?;
        if current.meta().finalizers.is_empty() {
            return self.remove(r);
        }
        if !current.meta().is_deleting() {
            current.meta_mut().deletion_timestamp = Some(chrono::Utc::now());
            current.meta_mut().resource_version += 1;
            self.write(&current)?;
        }
        Ok(())
    }

    /// List all objects in a namespace, sorted by name. Corrupted entries
    /// are skipped with a warning so one bad file cannot take down listing.
    pub fn list(&self, namespace: &str) -> Result<Vec<T>, StoreError> {
        let dir = self.layout.namespace_dir(T::KIND, namespace);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let content = fs::read_to_string(entry.path())?;
            match serde_json::from_str::<T>(&content) {
                Ok(obj) => results.push(obj),
                Err(e) => {
                    tracing::warn!(
                        kind = T::KIND,
                        path = %entry.path().display(),
                        "skipping corrupted resource entry: {e}"
                    );
                }
            }
        }
        results.sort_by(|a, b| a.meta().name.cmp(&b.meta().name));
        Ok(results)
    }
}
