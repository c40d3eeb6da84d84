use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::credentials::WarehouseCredentials;
use crate::types::Schema;

use super::schema::{plan_load, schema_from_json, schema_to_json};
use super::{
    CompletedJob, LoadJob, LoadOptions, LoadSource, LoadStats, TableId, Warehouse, WarehouseError,
    rows_from_source,
};

/// Warehouse storing each table as a newline-delimited JSON file.
///
/// Table `proj.ds.sales/jan` lives at `<root>/proj/ds/sales/jan.ndjson`, with its pinned schema
/// next to it in `jan.schema.json`. Loads commit before [`Warehouse::load`] returns, so the
/// returned job is already complete.
#[derive(Debug)]
pub struct FsWarehouse {
    root: PathBuf,
    credentials: Option<WarehouseCredentials>,
    next_job: AtomicU64,
    // Serializes read-check-append cycles within one process.
    write_lock: Mutex<()>,
}

impl FsWarehouse {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            credentials: None,
            next_job: AtomicU64::new(1),
            write_lock: Mutex::new(()),
        }
    }

    /// Restrict loads to datasets in the credentials' project.
    pub fn with_credentials(mut self, credentials: WarehouseCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Path of the data file backing `table`.
    pub fn table_path(&self, table: &TableId) -> Result<PathBuf, WarehouseError> {
        let mut path = self.root.clone();
        for segment in table.dataset().split('.') {
            push_segment(&mut path, segment, table)?;
        }
        let mut segments = table.table().split('/').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                push_segment(&mut path, segment, table)?;
            } else {
                push_segment(&mut path, &format!("{segment}.ndjson"), table)?;
            }
        }
        Ok(path)
    }

    /// Rows currently stored in `table`.
    pub fn read_table(&self, table: &TableId) -> Result<Vec<super::JsonRow>, WarehouseError> {
        let path = self.table_path(table)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(path)?;
        rows_from_source(LoadSource::NewlineDelimitedJson(Box::new(text.as_bytes())))
    }

    /// Pinned schema of `table`, if the table exists.
    pub fn table_schema(&self, table: &TableId) -> Result<Option<Schema>, WarehouseError> {
        let path = schema_path(&self.table_path(table)?);
        if !path.exists() {
            return Ok(None);
        }
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path)?).map_err(|e| WarehouseError::InvalidData {
                message: format!("schema file {}: {e}", path.display()),
            })?;
        schema_from_json(&value)
            .map(Some)
            .ok_or_else(|| WarehouseError::InvalidData {
                message: format!("schema file {} is malformed", path.display()),
            })
    }

    fn authorize(&self, table: &TableId) -> Result<(), WarehouseError> {
        match &self.credentials {
            Some(creds) if creds.project != table.project() => Err(WarehouseError::PermissionDenied {
                message: format!(
                    "credentials for project '{}' cannot write to '{}'",
                    creds.project, table
                ),
            }),
            _ => Ok(()),
        }
    }
}

fn push_segment(path: &mut PathBuf, segment: &str, table: &TableId) -> Result<(), WarehouseError> {
    let valid = !segment.is_empty()
        && Path::new(segment)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        && !segment.contains('\\');
    if !valid {
        return Err(WarehouseError::InvalidTable {
            table: table.to_string(),
            message: format!("segment '{segment}' cannot be stored"),
        });
    }
    path.push(segment);
    Ok(())
}

fn schema_path(data_path: &Path) -> PathBuf {
    data_path.with_extension("schema.json")
}

impl Warehouse for FsWarehouse {
    fn load(
        &self,
        table: &TableId,
        source: LoadSource<'_>,
        options: &LoadOptions,
    ) -> Result<Box<dyn LoadJob>, WarehouseError> {
        self.authorize(table)?;
        let data_path = self.table_path(table)?;
        let rows = rows_from_source(source)?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let existing = self.table_schema(table)?;
        let table_schema = plan_load(
            table,
            &rows,
            existing.as_ref(),
            options.autodetect,
            options.schema.as_ref(),
        )?;

        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let (None, Some(table_schema)) = (&existing, &table_schema) {
            let text = serde_json::to_string_pretty(&schema_to_json(table_schema)).map_err(|e| {
                WarehouseError::InvalidData {
                    message: e.to_string(),
                }
            })?;
            fs::write(schema_path(&data_path), text)?;
        }

        let mut buf = String::new();
        for row in &rows {
            let line = serde_json::to_string(row).map_err(|e| WarehouseError::InvalidData {
                message: e.to_string(),
            })?;
            buf.push_str(&line);
            buf.push('\n');
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&data_path)?;
        file.write_all(buf.as_bytes())?;

        let job_id = format!("fs-job-{}", self.next_job.fetch_add(1, Ordering::SeqCst));
        tracing::debug!(%table, job_id, rows = rows.len(), "appended rows to table file");
        Ok(Box::new(CompletedJob {
            stats: LoadStats {
                job_id,
                table: table.clone(),
                rows_loaded: rows.len(),
            },
        }))
    }
}
