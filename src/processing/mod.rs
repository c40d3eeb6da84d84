//! In-memory batch preparation before a load.
//!
//! The processing layer operates on [`crate::types::DataSet`] values produced by ingestion:
//!
//! - [`RunStamp`] / [`stamp()`]: the single `row_gen_timestamp` shared by every row of a run
//! - [`coerce_to_text()`]: uniform text representation for the CSV and JSON paths
//!
//! ## Example: stamp → coerce
//!
//! ```rust
//! use s3_lander::processing::{coerce_to_text, stamp, RunStamp, ROW_GEN_TIMESTAMP};
//! use s3_lander::types::{DataSet, DataType, Field, Schema, Value};
//!
//! let mut ds = DataSet::new(
//!     Schema::new(vec![Field::new("id", DataType::Int64)]),
//!     vec![vec![Value::Int64(1)], vec![Value::Int64(2)]],
//! );
//! let run = RunStamp::now();
//! stamp(&mut ds, &run);
//! let text = coerce_to_text(&ds);
//!
//! assert_eq!(text.column_count(), 2);
//! assert_eq!(text.rows[0][0], Value::Utf8("1".to_string()));
//! assert_eq!(text.column(ROW_GEN_TIMESTAMP).unwrap()[0], text.column(ROW_GEN_TIMESTAMP).unwrap()[1]);
//! ```

pub mod coerce;
pub mod enrich;

pub use coerce::coerce_to_text;
pub use enrich::{ROW_GEN_TIMESTAMP, RunStamp, prepare_batch, stamp};
