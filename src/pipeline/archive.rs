//! Moving a loaded object into the landed namespace.

use sha2::{Digest, Sha256};

use crate::error::{LandingError, LandingResult};
use crate::ingestion::INBOUND_PREFIX_LEN;
use crate::processing::RunStamp;
use crate::store::ObjectStore;

/// Namespace archived objects are moved under.
pub const LANDED_PREFIX: &str = "landed/";

/// How the disambiguating suffix of a landed key is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveNaming {
    /// The run timestamp, spaces replaced by underscores.
    #[default]
    Timestamp,
    /// Leading 16 hex digits of the body's SHA-256; a redelivered object lands on the same key.
    ContentHash,
}

impl ArchiveNaming {
    /// Parse `timestamp` or `content-hash`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Some(Self::Timestamp),
            "content-hash" | "content_hash" => Some(Self::ContentHash),
            _ => None,
        }
    }

    pub fn suffix(&self, run: &RunStamp, body: &[u8]) -> String {
        match self {
            Self::Timestamp => run.key_suffix(),
            Self::ContentHash => {
                let mut hasher = Sha256::new();
                hasher.update(body);
                let digest = format!("{:x}", hasher.finalize());
                digest[..16].to_string()
            }
        }
    }
}

/// Landed key for `key`: the inbound prefix replaced by [`LANDED_PREFIX`], and `_<suffix>`
/// inserted before the file extension.
///
/// `inbound/sales/jan.csv` with suffix `s` becomes `landed/sales/jan_s.csv`. Dots elsewhere in
/// the key are kept.
pub fn landed_key(key: &str, suffix: &str) -> String {
    let rest: String = key.chars().skip(INBOUND_PREFIX_LEN).collect();
    let (dir, file) = match rest.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, rest.as_str()),
    };
    let file = match file.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_{suffix}.{ext}"),
        None => format!("{file}_{suffix}"),
    };
    match dir {
        Some(dir) => format!("{LANDED_PREFIX}{dir}/{file}"),
        None => format!("{LANDED_PREFIX}{file}"),
    }
}

/// Move `source_key` to `dest_key`.
///
/// Uses the store's atomic rename when it has one; otherwise copies, then deletes the source
/// only once the copy succeeded.
pub fn archive_object(
    store: &dyn ObjectStore,
    bucket: &str,
    source_key: &str,
    dest_key: &str,
) -> LandingResult<()> {
    let moved = if store.supports_rename() {
        tracing::debug!(bucket, source_key, dest_key, "renaming object");
        store.rename_object(bucket, source_key, dest_key)
    } else {
        tracing::debug!(bucket, source_key, dest_key, "copying object");
        store
            .copy_object(bucket, source_key, dest_key)
            .and_then(|()| store.delete_object(bucket, source_key))
    };
    moved.map_err(|source| LandingError::Archive {
        source_key: source_key.to_string(),
        dest_key: dest_key.to_string(),
        source,
    })
}
