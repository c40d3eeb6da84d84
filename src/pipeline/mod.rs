//! The landing pipeline: config, classify, decode, enrich, load, archive.
//!
//! [`LandingPipeline::run`] lands exactly one object. The store and warehouse are injected once
//! per worker and borrowed by every run; nothing is retried.
//!
//! A run ends in one of three ways:
//!
//! - [`LandingOutcome::Archived`]: rows appended, source moved under `landed/`
//! - [`LandingOutcome::Skipped`]: unsupported extension or operation; nothing loaded, object untouched
//! - `Err(`[`LandingError`]`)`: fatal; the object stays where it is unless rows were already loaded
//!   ([`LandingError::Archive`])
//!
//! ## Example
//!
//! ```rust
//! use s3_lander::pipeline::{LandingOutcome, LandingPipeline, PipelineOptions};
//! use s3_lander::store::MemoryObjectStore;
//! use s3_lander::warehouse::MemoryWarehouse;
//! use s3_lander::LandingRequest;
//!
//! # fn main() -> Result<(), s3_lander::LandingError> {
//! let store = MemoryObjectStore::new();
//! store.insert("drop", "config/conf.json", r#"{"dataset":"d","operation":"APPEND","header":true}"#);
//! store.insert("drop", "inbound/a.csv", "id,val\n1,5\n");
//! let warehouse = MemoryWarehouse::new();
//!
//! let pipeline = LandingPipeline::new(&store, &warehouse, PipelineOptions::default());
//! let outcome = pipeline.run(&LandingRequest::new("drop", "inbound/a.csv"))?;
//!
//! assert!(matches!(outcome, LandingOutcome::Archived(_)));
//! assert_eq!(warehouse.table_rows("d.a").len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod observability;

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, DEFAULT_LOAD_TIMEOUT, LandingConfig, Operation};
use crate::error::{LandingError, LandingResult};
use crate::event::LandingRequest;
use crate::ingestion::{Decoded, INBOUND_PREFIX_LEN, LandingFormat, XmlDocument, decode_object};
use crate::processing::{RunStamp, prepare_batch, stamp};
use crate::store::ObjectStore;
use crate::types::DataSet;
use crate::warehouse::{LoadOptions, LoadSource, TableId, Warehouse, detect_schema};

pub use archive::{ArchiveNaming, LANDED_PREFIX, archive_object, landed_key};
pub use observability::{
    CompositeObserver, LandingContext, LandingObserver, LandingSeverity, TracingObserver,
    severity_for_error,
};

/// Stages of one run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunStage {
    Start,
    ConfigLoaded,
    FormatClassified,
    Decoded,
    Enriched,
    Loaded,
    Archived,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::ConfigLoaded => "config_loaded",
            Self::FormatClassified => "format_classified",
            Self::Decoded => "decoded",
            Self::Enriched => "enriched",
            Self::Loaded => "loaded",
            Self::Archived => "archived",
        };
        f.write_str(name)
    }
}

/// Why a run ended without loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The key does not end in `.csv`, `.json` or `.xml`.
    UnsupportedFormat { key: String },
    /// The configured operation is not `APPEND`.
    UnsupportedOperation { operation: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFormat { key } => write!(f, "invalid format: {key}"),
            Self::UnsupportedOperation { operation } => {
                write!(f, "operation not supported: {operation}")
            }
        }
    }
}

/// What an archived run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub table: TableId,
    pub job_id: String,
    pub rows_loaded: usize,
    /// Key the source object now lives under.
    pub landed_key: String,
}

/// Terminal non-error state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LandingOutcome {
    Archived(ArchiveReport),
    Skipped(SkipReason),
}

impl LandingOutcome {
    pub fn is_archived(&self) -> bool {
        matches!(self, Self::Archived(_))
    }
}

/// Options controlling pipeline runs.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct PipelineOptions {
    /// Bound on the wait for the load job.
    pub load_timeout: Duration,
    /// Suffix scheme for landed keys.
    pub archive_naming: ArchiveNaming,
    /// Load XML documents with a schema detected up front instead of warehouse auto-detection.
    pub pin_xml_schema: bool,
    /// Optional observer for outcomes and alerts.
    pub observer: Option<Arc<dyn LandingObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: LandingSeverity,
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("load_timeout", &self.load_timeout)
            .field("archive_naming", &self.archive_naming)
            .field("pin_xml_schema", &self.pin_xml_schema)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            archive_naming: ArchiveNaming::default(),
            pin_xml_schema: false,
            observer: None,
            alert_at_or_above: LandingSeverity::Critical,
        }
    }
}

// What the loader receives once a decoded object has been enriched.
enum Prepared {
    Rows(DataSet),
    Document(XmlDocument),
}

/// Lands objects from one store into one warehouse.
pub struct LandingPipeline<'a> {
    store: &'a dyn ObjectStore,
    warehouse: &'a dyn Warehouse,
    options: PipelineOptions,
}

impl fmt::Debug for LandingPipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LandingPipeline")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a> LandingPipeline<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        warehouse: &'a dyn Warehouse,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            warehouse,
            options,
        }
    }

    /// Land one object, stamped with the current time.
    pub fn run(&self, request: &LandingRequest) -> LandingResult<LandingOutcome> {
        self.run_at(request, RunStamp::now())
    }

    /// Land one object with a caller-chosen run stamp.
    ///
    /// When an observer is configured, this reports:
    ///
    /// - `on_archived` / `on_skipped` for the two outcomes
    /// - `on_failure` on failure, with a computed severity
    /// - `on_alert` on failure when the severity is >= `options.alert_at_or_above`
    pub fn run_at(&self, request: &LandingRequest, run: RunStamp) -> LandingResult<LandingOutcome> {
        let span = tracing::info_span!("landing", bucket = %request.bucket, key = %request.key);
        let _entered = span.enter();

        let mut ctx = LandingContext {
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            format: None,
        };
        let result = self.execute(request, &run, &mut ctx);
        self.report(&ctx, &result);
        result
    }

    fn execute(
        &self,
        request: &LandingRequest,
        run: &RunStamp,
        ctx: &mut LandingContext,
    ) -> LandingResult<LandingOutcome> {
        let bucket = request.bucket.as_str();
        let key = request.key.as_str();
        tracing::debug!(stage = %RunStage::Start, run = %run.to_text(), "landing object");

        let config = config::resolve(self.store, bucket)?;
        tracing::debug!(stage = %RunStage::ConfigLoaded, ?config);

        let Some(format) = LandingFormat::classify(key) else {
            return Ok(LandingOutcome::Skipped(SkipReason::UnsupportedFormat {
                key: key.to_string(),
            }));
        };
        ctx.format = Some(format);
        let table = resolve_table(&config, format, key)?;
        tracing::debug!(stage = %RunStage::FormatClassified, %format, %table);

        let body = self.store.get_object(bucket, key)?;
        let decoded = decode_object(format, &body, config.has_header())?;
        tracing::debug!(stage = %RunStage::Decoded, rows = decoded.loaded_rows());

        let prepared = enrich(decoded, run);
        tracing::debug!(stage = %RunStage::Enriched);

        // Decode work is thrown away for anything but an append.
        if let Operation::Unsupported(_) = config.operation() {
            return Ok(LandingOutcome::Skipped(SkipReason::UnsupportedOperation {
                operation: config.operation().to_string(),
            }));
        }

        let stats = self.load(&table, &prepared)?;
        tracing::info!(
            stage = %RunStage::Loaded,
            table = %stats.table,
            job_id = %stats.job_id,
            rows = stats.rows_loaded,
            "load job completed"
        );

        let suffix = self.options.archive_naming.suffix(run, &body);
        let dest = landed_key(key, &suffix);
        archive_object(self.store, bucket, key, &dest)?;
        tracing::debug!(stage = %RunStage::Archived, landed_key = %dest);

        Ok(LandingOutcome::Archived(ArchiveReport {
            table: stats.table,
            job_id: stats.job_id,
            rows_loaded: stats.rows_loaded,
            landed_key: dest,
        }))
    }

    fn load(
        &self,
        table: &TableId,
        prepared: &Prepared,
    ) -> LandingResult<crate::warehouse::LoadStats> {
        let job = match prepared {
            Prepared::Rows(batch) => {
                self.warehouse
                    .load(table, LoadSource::Rows(batch), &LoadOptions::default())?
            }
            Prepared::Document(doc) => {
                let options = if self.options.pin_xml_schema {
                    let schema = detect_schema(table, std::slice::from_ref(&doc.record), None)?;
                    LoadOptions::with_schema(schema)
                } else {
                    LoadOptions::default()
                };
                let line = doc.to_ndjson();
                let source = LoadSource::NewlineDelimitedJson(Box::new(Cursor::new(line)));
                self.warehouse.load(table, source, &options)?
            }
        };
        tracing::info!(%table, job_id = job.job_id(), "load job submitted");
        Ok(job.wait(self.options.load_timeout)?)
    }

    // Outcomes are logged by the observer; see `TracingObserver`.
    fn report(&self, ctx: &LandingContext, result: &LandingResult<LandingOutcome>) {
        let Some(obs) = self.options.observer.as_ref() else {
            return;
        };
        match result {
            Ok(LandingOutcome::Archived(report)) => obs.on_archived(ctx, report),
            Ok(LandingOutcome::Skipped(reason)) => obs.on_skipped(ctx, reason),
            Err(e) => {
                let sev = severity_for_error(e);
                obs.on_failure(ctx, sev, e);
                if sev >= self.options.alert_at_or_above {
                    obs.on_alert(ctx, sev, e);
                }
            }
        }
    }
}

/// Stamp decoded output with the run timestamp and shape it for the loader.
///
/// CSV and JSON become text batches. The JSON raw frame is stamped too, then dropped: only the
/// normalized frame is loaded. XML documents pass through untouched.
fn enrich(decoded: Decoded, run: &RunStamp) -> Prepared {
    match decoded {
        Decoded::Csv(ds) => Prepared::Rows(prepare_batch(&ds, run)),
        Decoded::Json(mut frames) => {
            stamp(&mut frames.raw, run);
            Prepared::Rows(prepare_batch(&frames.normalized, run))
        }
        Decoded::Xml(doc) => Prepared::Document(doc),
    }
}

/// Fully qualified table a key loads into.
///
/// An empty or missing `table_name` is derived from the key. A missing dataset, a key too
/// short to derive a name from, or a key with no file name after the inbound prefix is a
/// [`LandingError::Config`]. The last case is rejected even when `table_name` is set, since such
/// an object has no landed key.
pub fn resolve_table(
    config: &LandingConfig,
    format: LandingFormat,
    key: &str,
) -> LandingResult<TableId> {
    if key.chars().count() <= INBOUND_PREFIX_LEN {
        return Err(LandingError::config(format!(
            "key '{key}' has nothing after the {INBOUND_PREFIX_LEN}-character inbound prefix"
        )));
    }
    let dataset = config.dataset_for(format).ok_or_else(|| {
        let field = match format {
            LandingFormat::Xml => "dataset_xml",
            LandingFormat::Csv | LandingFormat::Json => "dataset",
        };
        LandingError::config(format!("'{field}' is not configured for {format} objects"))
    })?;
    let table = match config.table_name() {
        Some(name) => name.to_string(),
        None => format.default_table_name(key).ok_or_else(|| {
            LandingError::config(format!("cannot derive a table name from key '{key}'"))
        })?,
    };
    TableId::new(dataset, table).map_err(|e| LandingError::config(e.to_string()))
}

/// Log every key under `prefix` at debug level and return them.
pub fn list_bucket(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
) -> LandingResult<Vec<String>> {
    let keys = store.list_objects(bucket, prefix)?;
    for key in &keys {
        tracing::debug!(bucket, key = %key, "listed object");
    }
    tracing::info!(bucket, prefix, count = keys.len(), "listed bucket");
    Ok(keys)
}
