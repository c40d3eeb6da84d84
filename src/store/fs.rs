use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use super::{ObjectStore, StoreError, StoreResult};

/// Object store backed by the local filesystem.
///
/// Bucket `b` is the directory `<root>/b`; key `inbound/a.csv` is the file
/// `<root>/b/inbound/a.csv`. Renames use `std::fs::rename` and are atomic within one filesystem.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory holding one directory per bucket.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> StoreResult<PathBuf> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            return Err(StoreError::InvalidKey {
                key: bucket.to_string(),
                message: "bucket must be a single path segment".to_string(),
            });
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                message: "key must be a relative path without '.' or '..' segments".to_string(),
            });
        }
        Ok(self.bucket_dir(bucket)?.join(relative))
    }
}

fn map_not_found(err: std::io::Error, bucket: &str, key: &str) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::not_found(bucket, key)
    } else {
        StoreError::Io(err)
    }
}

fn ensure_parent(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

impl ObjectStore for FsObjectStore {
    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        if path.is_dir() {
            return Err(StoreError::not_found(bucket, key));
        }
        fs::read(&path).map_err(|e| map_not_found(e, bucket, key))
    }

    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> StoreResult<()> {
        let path = self.object_path(bucket, key)?;
        ensure_parent(&path)?;
        fs::write(&path, body)?;
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let dir = self.bucket_dir(bucket)?;
        if !dir.is_dir() {
            return Err(StoreError::not_found(bucket, prefix));
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1) {
            let entry = entry.map_err(|e| {
                StoreError::Io(
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop while listing")),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn copy_object(&self, bucket: &str, source_key: &str, dest_key: &str) -> StoreResult<()> {
        let source = self.object_path(bucket, source_key)?;
        let dest = self.object_path(bucket, dest_key)?;
        ensure_parent(&dest)?;
        fs::copy(&source, &dest).map_err(|e| map_not_found(e, bucket, source_key))?;
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let path = self.object_path(bucket, key)?;
        fs::remove_file(&path).map_err(|e| map_not_found(e, bucket, key))
    }

    fn supports_rename(&self) -> bool {
        true
    }

    fn rename_object(&self, bucket: &str, source_key: &str, dest_key: &str) -> StoreResult<()> {
        let source = self.object_path(bucket, source_key)?;
        let dest = self.object_path(bucket, dest_key)?;
        ensure_parent(&dest)?;
        fs::rename(&source, &dest).map_err(|e| map_not_found(e, bucket, source_key))
    }
}
