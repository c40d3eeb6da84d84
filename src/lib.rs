//! `s3-lander` lands objects dropped into an object store into append-only warehouse tables.
//!
//! One run handles one object: it reads the bucket's control document (`config/conf.json`),
//! classifies the object by extension, decodes it, stamps every row with a single ingestion
//! timestamp, appends the rows to `dataset.table`, and finally moves the object from `inbound/`
//! to `landed/`. The entrypoint is [`pipeline::LandingPipeline::run`].
//!
//! ## What can be landed
//!
//! - **CSV**: `.csv`, comma-delimited, optional header row (otherwise columns are `0, 1, 2, …`)
//! - **JSON**: `.json`, an array of objects, a bare object, or newline-delimited objects; nested
//!   objects are flattened into dotted columns (`user.name`)
//! - **XML**: `.xml`, one document loaded as a single newline-delimited JSON record
//!
//! CSV and JSON rows are loaded as text, including the synthetic `row_gen_timestamp` column. Keys
//! with any other extension, and control documents asking for anything but `APPEND`, end the run
//! as [`pipeline::LandingOutcome::Skipped`] without touching the object.
//!
//! ## Capabilities
//!
//! The pipeline only talks to injected capabilities:
//!
//! - [`store::ObjectStore`]: get/put/list/copy/delete objects, optional atomic rename
//! - [`warehouse::Warehouse`]: submit a load job, then wait for it with a bound
//! - [`credentials::CredentialProvider`]: resolve warehouse credentials once per worker
//!
//! Filesystem and in-memory implementations of each ship with the crate.
//!
//! ## Quick example
//!
//! ```rust
//! use s3_lander::pipeline::{LandingOutcome, LandingPipeline, PipelineOptions};
//! use s3_lander::store::MemoryObjectStore;
//! use s3_lander::warehouse::MemoryWarehouse;
//! use s3_lander::LandingRequest;
//!
//! # fn main() -> Result<(), s3_lander::LandingError> {
//! let store = MemoryObjectStore::new();
//! store.insert("drop", "config/conf.json", r#"{"dataset":"d","operation":"APPEND"}"#);
//! store.insert("drop", "inbound/events.json", r#"{"user":{"name":"ada"}}"#);
//! let warehouse = MemoryWarehouse::new();
//!
//! let pipeline = LandingPipeline::new(&store, &warehouse, PipelineOptions::default());
//! let outcome = pipeline.run(&LandingRequest::new("drop", "inbound/events.json"))?;
//!
//! let LandingOutcome::Archived(report) = outcome else {
//!     panic!("expected an archived run");
//! };
//! assert!(report.landed_key.starts_with("landed/events_"));
//! assert_eq!(warehouse.table_rows("d.events")[0]["user.name"], "ada");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`pipeline`]: the run itself, archiving, and outcome observers
//! - [`ingestion`]: format classification and the CSV/JSON/XML decoders
//! - [`processing`]: run timestamp stamping and text coercion
//! - [`config`]: the per-bucket control document and worker settings
//! - [`event`]: landing requests from the launch environment or S3 notifications
//! - [`store`], [`warehouse`], [`credentials`]: capability traits and implementations
//! - [`types`]: schema + in-memory dataset types
//! - [`error`]: error types used across the crate

pub mod config;
pub mod credentials;
pub mod error;
pub mod event;
pub mod ingestion;
pub mod pipeline;
pub mod processing;
pub mod store;
pub mod types;
pub mod warehouse;

pub use error::{LandingError, LandingResult};
pub use event::LandingRequest;
