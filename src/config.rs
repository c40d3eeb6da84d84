//! Run configuration.
//!
//! Two layers:
//!
//! - [`LandingConfig`]: the per-bucket control document `config/conf.json`, read fresh on every run
//! - [`WorkerSettings`]: deployment settings and launch parameters read from the environment

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{LandingError, LandingResult};
use crate::ingestion::LandingFormat;
use crate::pipeline::ArchiveNaming;
use crate::store::ObjectStore;

/// Key of the control document inside the triggering bucket.
pub const CONFIG_KEY: &str = "config/conf.json";

/// Default bound on the wait for a load job.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// The per-bucket control document.
///
/// Every key is optional and `null` is accepted anywhere. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LandingConfig {
    /// Target table; empty or missing derives the name from the object key.
    #[serde(default)]
    pub table_name: Option<String>,
    /// Dataset for CSV and JSON loads.
    #[serde(default)]
    pub dataset: Option<String>,
    /// Dataset for XML loads.
    #[serde(default)]
    pub dataset_xml: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    /// Header flag, read with loose truthiness (`true`, `1`, `"yes"` all count).
    #[serde(default)]
    pub header: Option<serde_json::Value>,
}

impl LandingConfig {
    /// Parse a control document.
    pub fn from_slice(body: &[u8]) -> LandingResult<Self> {
        serde_json::from_slice(body)
            .map_err(|e| LandingError::config(format!("invalid {CONFIG_KEY}: {e}")))
    }

    /// Explicit table name, if one is configured.
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref().filter(|s| !s.is_empty())
    }

    /// Dataset the given format loads into.
    pub fn dataset_for(&self, format: LandingFormat) -> Option<&str> {
        let dataset = match format {
            LandingFormat::Csv | LandingFormat::Json => &self.dataset,
            LandingFormat::Xml => &self.dataset_xml,
        };
        dataset.as_deref().filter(|s| !s.is_empty())
    }

    pub fn operation(&self) -> Operation {
        Operation::parse(self.operation.as_deref())
    }

    /// Whether CSV row 0 names the columns. Missing means no header.
    pub fn has_header(&self) -> bool {
        match &self.header {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(serde_json::Value::Array(items)) => !items.is_empty(),
            Some(serde_json::Value::Object(map)) => !map.is_empty(),
        }
    }
}

/// Read and parse [`CONFIG_KEY`] from `bucket`.
///
/// A missing object or an unparsable document is a [`LandingError::Config`].
pub fn resolve(store: &dyn ObjectStore, bucket: &str) -> LandingResult<LandingConfig> {
    let body = store
        .get_object(bucket, CONFIG_KEY)
        .map_err(|e| LandingError::config(format!("cannot read {bucket}/{CONFIG_KEY}: {e}")))?;
    LandingConfig::from_slice(&body)
}

/// Requested load operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `"APPEND"`, matched exactly.
    Append,
    /// Anything else, including a missing operation.
    Unsupported(Option<String>),
}

impl Operation {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("APPEND") => Self::Append,
            other => Self::Unsupported(other.map(str::to_string)),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => f.write_str("APPEND"),
            Self::Unsupported(Some(op)) => f.write_str(op),
            Self::Unsupported(None) => f.write_str("<none>"),
        }
    }
}

/// Deployment settings of one worker process.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    /// Root directory of the filesystem object store (`LANDER_STORE_ROOT`).
    pub store_root: PathBuf,
    /// Root directory of the filesystem warehouse (`LANDER_WAREHOUSE_ROOT`).
    pub warehouse_root: PathBuf,
    /// Root of the secret documents (`LANDER_CREDENTIALS_ROOT`).
    pub credentials_root: PathBuf,
    /// Secret path of the warehouse credentials (`VAULT_ETL_PATH`); unset runs without credentials.
    pub secret_path: Option<String>,
    /// `LANDER_LOAD_TIMEOUT_SECS`
    pub load_timeout: Duration,
    /// `LANDER_ARCHIVE_NAMING`: `timestamp` or `content-hash`.
    pub archive_naming: ArchiveNaming,
    /// `LANDER_PIN_XML_SCHEMA`
    pub pin_xml_schema: bool,
    /// `LANDER_LIST_PREFIX`: log the bucket listing under this prefix before the run.
    pub list_prefix: Option<String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("."),
            warehouse_root: PathBuf::from("./warehouse"),
            credentials_root: PathBuf::from("./secrets"),
            secret_path: None,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            archive_naming: ArchiveNaming::default(),
            pin_xml_schema: false,
            list_prefix: None,
        }
    }
}

impl WorkerSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> LandingResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`; unset or empty variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> LandingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let mut settings = Self::default();

        if let Some(root) = get("LANDER_STORE_ROOT") {
            settings.store_root = PathBuf::from(root);
        }
        if let Some(root) = get("LANDER_WAREHOUSE_ROOT") {
            settings.warehouse_root = PathBuf::from(root);
        }
        if let Some(root) = get("LANDER_CREDENTIALS_ROOT") {
            settings.credentials_root = PathBuf::from(root);
        }
        settings.secret_path = get("VAULT_ETL_PATH");
        if let Some(secs) = get("LANDER_LOAD_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|e| {
                LandingError::config(format!("LANDER_LOAD_TIMEOUT_SECS='{secs}': {e}"))
            })?;
            settings.load_timeout = Duration::from_secs(secs);
        }
        if let Some(naming) = get("LANDER_ARCHIVE_NAMING") {
            settings.archive_naming = ArchiveNaming::parse(&naming).ok_or_else(|| {
                LandingError::config(format!(
                    "LANDER_ARCHIVE_NAMING='{naming}': expected 'timestamp' or 'content-hash'"
                ))
            })?;
        }
        if let Some(flag) = get("LANDER_PIN_XML_SCHEMA") {
            settings.pin_xml_schema = parse_flag(&flag).ok_or_else(|| {
                LandingError::config(format!("LANDER_PIN_XML_SCHEMA='{flag}': expected a boolean"))
            })?;
        }
        settings.list_prefix = get("LANDER_LIST_PREFIX");
        Ok(settings)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
