//! Warehouse credential acquisition.
//!
//! Credentials are resolved once per worker from a named secret path and handed to the warehouse
//! client at construction time. The pipeline itself never sees them.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while resolving credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No secret exists at the requested path.
    #[error("secret not found: {0}")]
    NotFound(String),

    /// The secret exists but is not a valid credential document.
    #[error("invalid secret '{path}': {message}")]
    Invalid { path: String, message: String },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Warehouse-access credentials.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WarehouseCredentials {
    /// Project (top-level dataset namespace) these credentials grant access to.
    pub project: String,
    /// Identity the credentials belong to, for logging.
    #[serde(default)]
    pub principal: Option<String>,
    /// Opaque access token.
    #[serde(default)]
    pub token: Option<String>,
}

/// Resolves credentials from a named secret path.
pub trait CredentialProvider: Send + Sync {
    fn fetch(&self, secret_path: &str) -> Result<WarehouseCredentials, CredentialError>;
}

/// Reads JSON credential documents stored as files under a root directory.
///
/// Secret `etl/bq` resolves to `<root>/etl/bq.json`.
#[derive(Debug, Clone)]
pub struct FileCredentialProvider {
    root: PathBuf,
}

impl FileCredentialProvider {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl CredentialProvider for FileCredentialProvider {
    fn fetch(&self, secret_path: &str) -> Result<WarehouseCredentials, CredentialError> {
        let relative = Path::new(secret_path);
        if secret_path.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(CredentialError::Invalid {
                path: secret_path.to_string(),
                message: "secret path must be relative".to_string(),
            });
        }

        let path = self.root.join(relative).with_extension("json");
        let text = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CredentialError::NotFound(secret_path.to_string()),
            _ => CredentialError::Io(e),
        })?;

        let creds: WarehouseCredentials =
            serde_json::from_str(&text).map_err(|e| CredentialError::Invalid {
                path: secret_path.to_string(),
                message: e.to_string(),
            })?;
        if creds.project.is_empty() {
            return Err(CredentialError::Invalid {
                path: secret_path.to_string(),
                message: "project must not be empty".to_string(),
            });
        }

        tracing::debug!(secret_path, project = %creds.project, "resolved warehouse credentials");
        Ok(creds)
    }
}

/// Returns the same credentials for every secret path.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credentials: WarehouseCredentials,
}

impl StaticCredentialProvider {
    pub fn new(credentials: WarehouseCredentials) -> Self {
        Self { credentials }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn fetch(&self, _secret_path: &str) -> Result<WarehouseCredentials, CredentialError> {
        Ok(self.credentials.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_root() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("s3-lander-creds-{nanos}"))
    }

    #[test]
    fn reads_secret_document() {
        let root = tmp_root();
        fs::create_dir_all(root.join("etl")).unwrap();
        fs::write(
            root.join("etl/bq.json"),
            r#"{"project":"analytics","principal":"lander@analytics"}"#,
        )
        .unwrap();

        let creds = FileCredentialProvider::new(&root).fetch("etl/bq").unwrap();
        assert_eq!(creds.project, "analytics");
        assert_eq!(creds.principal.as_deref(), Some("lander@analytics"));
        assert_eq!(creds.token, None);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_secret_is_not_found() {
        let err = FileCredentialProvider::new(tmp_root()).fetch("etl/none").unwrap_err();
        assert!(matches!(err, CredentialError::NotFound(_)));
    }

    #[test]
    fn rejects_parent_segments() {
        let err = FileCredentialProvider::new(tmp_root()).fetch("../x").unwrap_err();
        assert!(matches!(err, CredentialError::Invalid { .. }));
    }
}
