use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{ObjectStore, StoreError, StoreResult};

/// A mutating operation recorded by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Put { bucket: String, key: String },
    Copy { bucket: String, source_key: String, dest_key: String },
    Delete { bucket: String, key: String },
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<(String, String), Vec<u8>>,
    journal: Vec<StoreOp>,
    fail_deletes: bool,
}

/// Map-backed object store.
///
/// Every successful mutation is appended to a journal readable through
/// [`MemoryObjectStore::journal`]. Deletes can be made to fail to exercise the archive error path.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without journaling it.
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        let mut inner = self.lock();
        inner
            .objects
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    /// Whether an object exists.
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.lock()
            .objects
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// Mutations performed so far, oldest first.
    pub fn journal(&self) -> Vec<StoreOp> {
        self.lock().journal.clone()
    }

    /// Make every subsequent delete fail with an I/O error.
    pub fn fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned map is still structurally valid.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> StoreResult<()> {
        let mut inner = self.lock();
        inner
            .objects
            .insert((bucket.to_string(), key.to_string()), body.to_vec());
        inner.journal.push(StoreOp::Put {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .lock()
            .objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    fn copy_object(&self, bucket: &str, source_key: &str, dest_key: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        let body = inner
            .objects
            .get(&(bucket.to_string(), source_key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, source_key))?;
        inner
            .objects
            .insert((bucket.to_string(), dest_key.to_string()), body);
        inner.journal.push(StoreOp::Copy {
            bucket: bucket.to_string(),
            source_key: source_key.to_string(),
            dest_key: dest_key.to_string(),
        });
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        if inner.fail_deletes {
            return Err(StoreError::Io(std::io::Error::other("delete disabled")));
        }
        inner
            .objects
            .remove(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| StoreError::not_found(bucket, key))?;
        inner.journal.push(StoreOp::Delete {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_then_delete_is_journaled() {
        let store = MemoryObjectStore::new();
        store.insert("b", "inbound/a.csv", "x");
        store.copy_object("b", "inbound/a.csv", "landed/a.csv").unwrap();
        store.delete_object("b", "inbound/a.csv").unwrap();

        assert!(!store.contains("b", "inbound/a.csv"));
        assert_eq!(store.get_object("b", "landed/a.csv").unwrap(), b"x".to_vec());
        assert_eq!(store.journal().len(), 2);
    }

    #[test]
    fn rename_is_not_supported() {
        let store = MemoryObjectStore::new();
        assert!(!store.supports_rename());
        assert!(matches!(
            store.rename_object("b", "a", "c"),
            Err(StoreError::Unsupported(_))
        ));
    }
}
