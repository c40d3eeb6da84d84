use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::error::LandingError;
use crate::ingestion::LandingFormat;
use crate::store::StoreError;
use crate::warehouse::WarehouseError;

use super::{ArchiveReport, SkipReason};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LandingSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (the run failed).
    Error,
    /// Critical error: storage I/O failures, or rows loaded but the object never archived.
    Critical,
}

/// The object a run is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingContext {
    pub bucket: String,
    pub key: String,
    /// `None` until the key has been classified, and for unsupported keys.
    pub format: Option<LandingFormat>,
}

impl fmt::Display for LandingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Observer interface for run outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait LandingObserver: Send + Sync {
    /// Called when rows were loaded and the source object archived.
    fn on_archived(&self, _ctx: &LandingContext, _report: &ArchiveReport) {}

    /// Called when a run ends without loading anything.
    fn on_skipped(&self, _ctx: &LandingContext, _reason: &SkipReason) {}

    /// Called when a run fails.
    fn on_failure(&self, _ctx: &LandingContext, _severity: LandingSeverity, _error: &LandingError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &LandingContext, severity: LandingSeverity, error: &LandingError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn LandingObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn LandingObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl LandingObserver for CompositeObserver {
    fn on_archived(&self, ctx: &LandingContext, report: &ArchiveReport) {
        for o in &self.observers {
            o.on_archived(ctx, report);
        }
    }

    fn on_skipped(&self, ctx: &LandingContext, reason: &SkipReason) {
        for o in &self.observers {
            o.on_skipped(ctx, reason);
        }
    }

    fn on_failure(&self, ctx: &LandingContext, severity: LandingSeverity, error: &LandingError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &LandingContext, severity: LandingSeverity, error: &LandingError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Emits run outcomes as `tracing` events under the `s3_lander::outcome` target.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl LandingObserver for TracingObserver {
    fn on_archived(&self, ctx: &LandingContext, report: &ArchiveReport) {
        tracing::info!(
            target: "s3_lander::outcome",
            bucket = %ctx.bucket,
            key = %ctx.key,
            table = %report.table,
            rows = report.rows_loaded,
            landed_key = %report.landed_key,
            "archived"
        );
    }

    fn on_skipped(&self, ctx: &LandingContext, reason: &SkipReason) {
        tracing::warn!(
            target: "s3_lander::outcome",
            bucket = %ctx.bucket,
            key = %ctx.key,
            %reason,
            "skipped"
        );
    }

    fn on_failure(&self, ctx: &LandingContext, severity: LandingSeverity, error: &LandingError) {
        tracing::error!(
            target: "s3_lander::outcome",
            bucket = %ctx.bucket,
            key = %ctx.key,
            ?severity,
            stage = %error.stage(),
            %error,
            "failed"
        );
    }

    fn on_alert(&self, ctx: &LandingContext, severity: LandingSeverity, error: &LandingError) {
        tracing::error!(
            target: "s3_lander::alert",
            bucket = %ctx.bucket,
            key = %ctx.key,
            ?severity,
            stage = %error.stage(),
            %error,
            "ALERT"
        );
    }
}

/// Severity of a fatal run error.
pub fn severity_for_error(e: &LandingError) -> LandingSeverity {
    match e {
        LandingError::Store(err) => store_severity(err),
        // Rows are in the table but the object is still inbound; needs manual reconciliation.
        LandingError::Archive { .. } => LandingSeverity::Critical,
        LandingError::Load(WarehouseError::Io(_)) => LandingSeverity::Critical,
        LandingError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => LandingSeverity::Critical,
            _ => LandingSeverity::Error,
        },
        LandingError::Credentials(err) => {
            if error_chain_contains_io(err) {
                LandingSeverity::Critical
            } else {
                LandingSeverity::Error
            }
        }
        LandingError::Config { .. }
        | LandingError::Json(_)
        | LandingError::Xml { .. }
        | LandingError::MalformedInput { .. }
        | LandingError::Load(_) => LandingSeverity::Error,
    }
}

fn store_severity(err: &StoreError) -> LandingSeverity {
    if err.is_io() {
        LandingSeverity::Critical
    } else {
        LandingSeverity::Error
    }
}

fn error_chain_contains_io(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        cur = err.source();
    }
    false
}
