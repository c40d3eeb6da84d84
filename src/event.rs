//! Landing requests and the dispatcher boundary.
//!
//! A worker handles exactly one [`LandingRequest`]. Requests come either from the launch
//! environment (`S3_BUCKET` / `S3_KEY`) or from an S3 `ObjectCreated` notification document.

use serde::Deserialize;

use crate::error::{LandingError, LandingResult};

/// Environment variable naming the triggering bucket.
pub const BUCKET_VAR: &str = "S3_BUCKET";
/// Environment variable naming the object key.
pub const KEY_VAR: &str = "S3_KEY";

/// One object to land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingRequest {
    pub bucket: String,
    pub key: String,
}

impl LandingRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Read the request from `S3_BUCKET` and `S3_KEY`.
    pub fn from_env() -> LandingResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the request through `lookup`. Both variables must be set and non-empty.
    pub fn from_lookup<F>(lookup: F) -> LandingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| LandingError::config(format!("{name} is not set")))
        };
        Ok(Self::new(require(BUCKET_VAR)?, require(KEY_VAR)?))
    }

    /// Parse every record of an S3 notification document.
    ///
    /// Keys arrive form-encoded; they are decoded with `+` read as a space.
    pub fn from_s3_event(document: &str) -> LandingResult<Vec<Self>> {
        let event: S3Event = serde_json::from_str(document)?;
        Ok(event
            .records
            .into_iter()
            .map(|r| Self::new(r.s3.bucket.name, unquote_plus(&r.s3.object.key)))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct S3Event {
    #[serde(rename = "Records", default)]
    records: Vec<S3EventRecord>,
}

#[derive(Debug, Deserialize)]
struct S3EventRecord {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
}

/// Percent-decode a form-encoded key, reading `+` as a space.
///
/// Invalid UTF-8 after decoding is replaced with U+FFFD.
pub fn unquote_plus(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    let bytes = urlencoding::decode_binary(spaced.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}
