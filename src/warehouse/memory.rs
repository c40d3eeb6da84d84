use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::types::Schema;

use super::schema::plan_load;
use super::{
    JsonRow, LoadJob, LoadOptions, LoadSource, LoadStats, SourceFormat, TableId, Warehouse,
    WarehouseError, rows_from_source,
};

/// One load submitted to a [`MemoryWarehouse`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRecord {
    pub table: TableId,
    pub format: SourceFormat,
    pub options: LoadOptions,
    pub rows: Vec<JsonRow>,
}

#[derive(Debug, Default)]
struct Table {
    schema: Option<Schema>,
    rows: Vec<JsonRow>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableId, Table>,
    journal: Vec<LoadRecord>,
    next_job: u64,
    fail_next: Option<String>,
    job_delay: Duration,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-process warehouse.
///
/// Submitted jobs commit when they are waited on. A configurable job delay longer than the
/// caller's wait makes the job time out without committing anything.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next submitted load with `message`.
    pub fn fail_next_load(&self, message: impl Into<String>) {
        lock(&self.inner).fail_next = Some(message.into());
    }

    /// Time every job needs before it completes.
    pub fn set_job_delay(&self, delay: Duration) {
        lock(&self.inner).job_delay = delay;
    }

    /// Every load submitted so far, including ones that later failed to commit.
    pub fn journal(&self) -> Vec<LoadRecord> {
        lock(&self.inner).journal.clone()
    }

    /// Committed rows of a table (`dataset.table`).
    pub fn table_rows(&self, table: &str) -> Vec<JsonRow> {
        lock(&self.inner)
            .tables
            .iter()
            .find(|(id, _)| id.to_string() == table)
            .map(|(_, t)| t.rows.clone())
            .unwrap_or_default()
    }

    /// Schema of a table (`dataset.table`), if it has been created.
    pub fn table_schema(&self, table: &str) -> Option<Schema> {
        lock(&self.inner)
            .tables
            .iter()
            .find(|(id, _)| id.to_string() == table)
            .and_then(|(_, t)| t.schema.clone())
    }
}

impl Warehouse for MemoryWarehouse {
    fn load(
        &self,
        table: &TableId,
        source: LoadSource<'_>,
        options: &LoadOptions,
    ) -> Result<Box<dyn LoadJob>, WarehouseError> {
        let format = source.format();
        let rows = rows_from_source(source)?;

        let mut inner = lock(&self.inner);
        inner.journal.push(LoadRecord {
            table: table.clone(),
            format,
            options: options.clone(),
            rows: rows.clone(),
        });
        if let Some(message) = inner.fail_next.take() {
            return Err(WarehouseError::Rejected { message });
        }
        inner.next_job += 1;

        Ok(Box::new(MemoryJob {
            job_id: format!("mem-job-{}", inner.next_job),
            table: table.clone(),
            options: options.clone(),
            rows,
            delay: inner.job_delay,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemoryJob {
    job_id: String,
    table: TableId,
    options: LoadOptions,
    rows: Vec<JsonRow>,
    delay: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl LoadJob for MemoryJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn wait(self: Box<Self>, timeout: Duration) -> Result<LoadStats, WarehouseError> {
        let job = *self;
        if job.delay > timeout {
            std::thread::sleep(timeout);
            return Err(WarehouseError::Timeout {
                job_id: job.job_id,
                timeout,
            });
        }
        std::thread::sleep(job.delay);

        let mut inner = lock(&job.inner);
        let entry = inner.tables.entry(job.table.clone()).or_default();
        let schema = plan_load(
            &job.table,
            &job.rows,
            entry.schema.as_ref(),
            job.options.autodetect,
            job.options.schema.as_ref(),
        )?;
        entry.schema = schema;
        let rows_loaded = job.rows.len();
        entry.rows.extend(job.rows);

        Ok(LoadStats {
            job_id: job.job_id,
            table: job.table,
            rows_loaded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataSet, DataType, Field, Value};

    fn batch() -> DataSet {
        DataSet::new(
            Schema::new(vec![Field::new("id", DataType::Utf8)]),
            vec![vec![Value::Utf8("1".to_string())]],
        )
    }

    #[test]
    fn rows_commit_on_wait() {
        let wh = MemoryWarehouse::new();
        let table = TableId::new("d", "t").unwrap();
        let job = wh.load(&table, LoadSource::Rows(&batch()), &LoadOptions::default()).unwrap();
        assert!(wh.table_rows("d.t").is_empty());

        let stats = job.wait(Duration::from_secs(1)).unwrap();
        assert_eq!(stats.rows_loaded, 1);
        assert_eq!(wh.table_rows("d.t").len(), 1);
        assert_eq!(wh.table_schema("d.t").unwrap().fields[0].data_type, DataType::Utf8);
    }

    #[test]
    fn slow_job_times_out_without_commit() {
        let wh = MemoryWarehouse::new();
        wh.set_job_delay(Duration::from_millis(200));
        let table = TableId::new("d", "t").unwrap();
        let job = wh.load(&table, LoadSource::Rows(&batch()), &LoadOptions::default()).unwrap();

        let err = job.wait(Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, WarehouseError::Timeout { .. }));
        assert!(wh.table_rows("d.t").is_empty());
    }

    #[test]
    fn injected_failure_rejects_once() {
        let wh = MemoryWarehouse::new();
        wh.fail_next_load("quota exceeded");
        let table = TableId::new("d", "t").unwrap();
        assert!(wh.load(&table, LoadSource::Rows(&batch()), &LoadOptions::default()).is_err());
        assert!(wh.load(&table, LoadSource::Rows(&batch()), &LoadOptions::default()).is_ok());
        assert_eq!(wh.journal().len(), 2);
    }
}
