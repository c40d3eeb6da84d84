//! Object-store capability consumed by the pipeline.
//!
//! The pipeline only needs a handful of operations on a flat key space per bucket. Two
//! implementations ship with the crate:
//!
//! - [`FsObjectStore`]: one directory per bucket under a root directory
//! - [`MemoryObjectStore`]: map-backed, journals every mutation (useful in tests)

mod fs;
mod memory;

use thiserror::Error;

pub use fs::FsObjectStore;
pub use memory::{MemoryObjectStore, StoreOp};

/// Convenience result type for object-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by an [`ObjectStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The bucket or key does not exist.
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The key cannot be represented by this store.
    #[error("invalid key '{key}': {message}")]
    InvalidKey { key: String, message: String },

    /// The store does not implement the requested operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl StoreError {
    pub(crate) fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// True for failures of the storage medium itself, as opposed to missing objects.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Operations on a bucketed object store.
pub trait ObjectStore: Send + Sync {
    /// Read the full body of an object.
    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>>;

    /// Create or replace an object.
    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> StoreResult<()>;

    /// List keys starting with `prefix`, in lexical order.
    fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>>;

    /// Copy an object within a bucket, replacing any object at `dest_key`.
    fn copy_object(&self, bucket: &str, source_key: &str, dest_key: &str) -> StoreResult<()>;

    /// Delete an object.
    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Whether [`ObjectStore::rename_object`] is an atomic move.
    fn supports_rename(&self) -> bool {
        false
    }

    /// Atomically move an object within a bucket.
    fn rename_object(&self, _bucket: &str, _source_key: &str, _dest_key: &str) -> StoreResult<()> {
        Err(StoreError::Unsupported("rename_object"))
    }
}
