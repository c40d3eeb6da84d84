//! Run-level timestamp stamping.

use chrono::{Local, NaiveDateTime};

use crate::types::{DataSet, DataType, TIMESTAMP_FORMAT, Value};

use super::coerce::coerce_to_text;

/// Name of the synthetic ingestion timestamp column.
pub const ROW_GEN_TIMESTAMP: &str = "row_gen_timestamp";

/// The one wall-clock instant a run is stamped with.
///
/// Taken once per run; every batch of the run and the archive suffix read the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStamp {
    at: NaiveDateTime,
}

impl RunStamp {
    /// Stamp with the current local time.
    pub fn now() -> Self {
        Self {
            at: Local::now().naive_local(),
        }
    }

    /// Stamp with a fixed instant.
    pub fn at(at: NaiveDateTime) -> Self {
        Self { at }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.at
    }

    /// `2024-01-31 08:15:02.000123`
    pub fn to_text(&self) -> String {
        self.at.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Text form with spaces replaced by underscores, usable inside an object key.
    pub fn key_suffix(&self) -> String {
        self.to_text().replace(' ', "_")
    }
}

/// Add (or overwrite) the [`ROW_GEN_TIMESTAMP`] column on every row.
pub fn stamp(dataset: &mut DataSet, run: &RunStamp) {
    dataset.set_constant_column(
        ROW_GEN_TIMESTAMP,
        DataType::Timestamp,
        Value::Timestamp(run.timestamp()),
    );
}

/// Stamp a copy of `dataset` and coerce it to text; the shape CSV and JSON batches are loaded in.
pub fn prepare_batch(dataset: &DataSet, run: &RunStamp) -> DataSet {
    let mut stamped = dataset.clone();
    stamp(&mut stamped, run);
    coerce_to_text(&stamped)
}
