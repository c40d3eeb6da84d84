//! Warehouse capability consumed by the loader.
//!
//! A [`Warehouse`] accepts append-only load jobs into fully qualified tables. Loads either carry
//! an in-memory row batch or a newline-delimited JSON stream, and use schema auto-detection
//! unless an explicit schema is supplied in [`LoadOptions`].
//!
//! Implementations:
//!
//! - [`FsWarehouse`]: tables stored as NDJSON files under a root directory
//! - [`MemoryWarehouse`]: in-process tables with a load journal and injectable failures

mod fs;
mod memory;
mod schema;

use std::fmt;
use std::io::Read;
use std::time::Duration;

use thiserror::Error;

use crate::types::{DataSet, Schema};

pub use fs::FsWarehouse;
pub use memory::{LoadRecord, MemoryWarehouse};
pub use schema::{detect_schema, schema_from_json, schema_to_json};

/// A JSON object standing for one warehouse row.
pub type JsonRow = serde_json::Map<String, serde_json::Value>;

/// Errors raised by a [`Warehouse`] or a [`LoadJob`].
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// The table identifier is not fully qualified or not representable.
    #[error("invalid table '{table}': {message}")]
    InvalidTable { table: String, message: String },

    /// The rows do not fit the table or the supplied schema.
    #[error("schema mismatch for table '{table}': {message}")]
    SchemaMismatch { table: String, message: String },

    /// The payload could not be read as rows.
    #[error("invalid load data: {message}")]
    InvalidData { message: String },

    /// The caller's credentials do not grant access to the table.
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    /// The job did not complete within the allowed wait.
    #[error("load job '{job_id}' did not complete within {timeout:?}")]
    Timeout { job_id: String, timeout: Duration },

    /// The warehouse refused the job.
    #[error("load rejected: {message}")]
    Rejected { message: String },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully qualified `dataset.table` identifier.
///
/// The dataset part may itself be dotted (`project.dataset`); the table part may contain `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId {
    dataset: String,
    table: String,
}

impl TableId {
    /// Qualify `table` with `dataset`. Both parts must be non-empty.
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Result<Self, WarehouseError> {
        let dataset = dataset.into();
        let table = table.into();
        if dataset.is_empty() || table.is_empty() {
            return Err(WarehouseError::InvalidTable {
                table: format!("{dataset}.{table}"),
                message: "dataset and table name must both be non-empty".to_string(),
            });
        }
        Ok(Self { dataset, table })
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Leading segment of the dataset reference.
    pub fn project(&self) -> &str {
        self.dataset.split('.').next().unwrap_or(&self.dataset)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// What a load does with rows already in the table. Only appends are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteDisposition {
    #[default]
    Append,
}

/// Options for one load job.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Infer the column schema from the data.
    pub autodetect: bool,
    /// Explicit schema the rows must conform to.
    pub schema: Option<Schema>,
    pub write_disposition: WriteDisposition,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            autodetect: true,
            schema: None,
            write_disposition: WriteDisposition::Append,
        }
    }
}

impl LoadOptions {
    /// Pin an explicit schema and turn auto-detection off.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            autodetect: false,
            schema: Some(schema),
            ..Self::default()
        }
    }
}

/// Shape of the data handed to a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Rows,
    NewlineDelimitedJson,
}

/// Data handed to a load job.
pub enum LoadSource<'a> {
    /// An in-memory row batch.
    Rows(&'a DataSet),
    /// A stream of newline-delimited JSON records.
    NewlineDelimitedJson(Box<dyn Read + 'a>),
}

impl LoadSource<'_> {
    pub fn format(&self) -> SourceFormat {
        match self {
            Self::Rows(_) => SourceFormat::Rows,
            Self::NewlineDelimitedJson(_) => SourceFormat::NewlineDelimitedJson,
        }
    }
}

impl fmt::Debug for LoadSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows(ds) => f
                .debug_struct("Rows")
                .field("rows", &ds.row_count())
                .field("columns", &ds.column_count())
                .finish(),
            Self::NewlineDelimitedJson(_) => f.write_str("NewlineDelimitedJson"),
        }
    }
}

/// Result of a completed load job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub job_id: String,
    pub table: TableId,
    pub rows_loaded: usize,
}

/// Handle to a submitted load job.
pub trait LoadJob: Send {
    fn job_id(&self) -> &str;

    /// Block until the job completes or `timeout` elapses.
    ///
    /// Rows become visible only when this returns `Ok`.
    fn wait(self: Box<Self>, timeout: Duration) -> Result<LoadStats, WarehouseError>;
}

/// An analytical warehouse accepting append loads.
pub trait Warehouse: Send + Sync {
    fn load(
        &self,
        table: &TableId,
        source: LoadSource<'_>,
        options: &LoadOptions,
    ) -> Result<Box<dyn LoadJob>, WarehouseError>;
}

/// A job whose work finished during submission.
#[derive(Debug)]
pub(crate) struct CompletedJob {
    pub(crate) stats: LoadStats,
}

impl LoadJob for CompletedJob {
    fn job_id(&self) -> &str {
        &self.stats.job_id
    }

    fn wait(self: Box<Self>, _timeout: Duration) -> Result<LoadStats, WarehouseError> {
        Ok(self.stats)
    }
}

/// Read a load source into JSON rows.
pub(crate) fn rows_from_source(source: LoadSource<'_>) -> Result<Vec<JsonRow>, WarehouseError> {
    match source {
        LoadSource::Rows(ds) => Ok(ds.to_json_rows()),
        LoadSource::NewlineDelimitedJson(mut reader) => {
            let mut text = String::new();
            reader.read_to_string(&mut text)?;
            let mut rows = Vec::new();
            for (idx0, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let value: serde_json::Value =
                    serde_json::from_str(line).map_err(|e| WarehouseError::InvalidData {
                        message: format!("line {}: {e}", idx0 + 1),
                    })?;
                match value {
                    serde_json::Value::Object(map) => rows.push(map),
                    other => {
                        return Err(WarehouseError::InvalidData {
                            message: format!("line {} is not a JSON object: {other}", idx0 + 1),
                        });
                    }
                }
            }
            Ok(rows)
        }
    }
}
