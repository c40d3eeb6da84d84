use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use s3_lander::pipeline::{ArchiveNaming, LandingOutcome, LandingPipeline, PipelineOptions, SkipReason};
use s3_lander::processing::RunStamp;
use s3_lander::store::{MemoryObjectStore, ObjectStore, StoreOp, StoreResult};
use s3_lander::types::Schema;
use s3_lander::warehouse::{
    LoadJob, LoadOptions, LoadSource, LoadStats, MemoryWarehouse, SourceFormat, TableId, Warehouse,
    WarehouseError,
};
use s3_lander::{LandingError, LandingRequest};

const BUCKET: &str = "drop";
const APPEND_WITH_HEADER: &str = r#"{"dataset":"d","dataset_xml":"dx","operation":"APPEND","header":true}"#;

fn fixed_stamp() -> RunStamp {
    RunStamp::at(
        NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_micro_opt(8, 15, 2, 123)
            .unwrap(),
    )
}

fn store_with(config: &str, key: &str, body: &str) -> MemoryObjectStore {
    let store = MemoryObjectStore::new();
    store.insert(BUCKET, "config/conf.json", config);
    store.insert(BUCKET, key, body);
    store
}

fn run(
    store: &MemoryObjectStore,
    warehouse: &MemoryWarehouse,
    key: &str,
    options: PipelineOptions,
) -> Result<LandingOutcome, LandingError> {
    LandingPipeline::new(store, warehouse, options).run_at(&LandingRequest::new(BUCKET, key), fixed_stamp())
}

#[test]
fn csv_with_header_is_loaded_as_text_and_archived() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/a.csv", "id,val\n1,5\n");
    let warehouse = MemoryWarehouse::new();

    let outcome = run(&store, &warehouse, "inbound/a.csv", PipelineOptions::default()).unwrap();

    let LandingOutcome::Archived(report) = outcome else {
        panic!("expected archived outcome, got {outcome:?}");
    };
    assert_eq!(report.table.to_string(), "d.a");
    assert_eq!(report.rows_loaded, 1);
    assert_eq!(report.landed_key, "landed/a_2024-01-31_08:15:02.000123.csv");

    let rows = warehouse.table_rows("d.a");
    assert_eq!(rows.len(), 1);
    let columns: Vec<_> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["id", "val", "row_gen_timestamp"]);
    assert_eq!(rows[0]["id"], "1");
    assert_eq!(rows[0]["val"], "5");
    assert_eq!(rows[0]["row_gen_timestamp"], "2024-01-31 08:15:02.000123");

    assert!(!store.contains(BUCKET, "inbound/a.csv"));
    assert!(store.contains(BUCKET, &report.landed_key));
}

#[test]
fn csv_without_header_uses_numbered_columns() {
    let store = store_with(
        r#"{"dataset":"d","operation":"APPEND"}"#,
        "inbound/nums.csv",
        "1,5\n2,6\n",
    );
    let warehouse = MemoryWarehouse::new();

    run(&store, &warehouse, "inbound/nums.csv", PipelineOptions::default()).unwrap();

    let rows = warehouse.table_rows("d.nums");
    assert_eq!(rows.len(), 2);
    let columns: Vec<_> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["0", "1", "row_gen_timestamp"]);
}

#[test]
fn every_row_shares_one_timestamp() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/a.csv", "id\n1\n2\n3\n");
    let warehouse = MemoryWarehouse::new();

    LandingPipeline::new(&store, &warehouse, PipelineOptions::default())
        .run(&LandingRequest::new(BUCKET, "inbound/a.csv"))
        .unwrap();

    let rows = warehouse.table_rows("d.a");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r["row_gen_timestamp"] == rows[0]["row_gen_timestamp"]));
}

#[test]
fn unsupported_operation_is_skipped_and_object_left_in_place() {
    let store = store_with(
        r#"{"dataset":"d","operation":"DROP","header":true}"#,
        "inbound/a.csv",
        "id,val\n1,5\n",
    );
    let warehouse = MemoryWarehouse::new();

    let outcome = run(&store, &warehouse, "inbound/a.csv", PipelineOptions::default()).unwrap();

    assert_eq!(
        outcome,
        LandingOutcome::Skipped(SkipReason::UnsupportedOperation {
            operation: "DROP".to_string()
        })
    );
    assert!(warehouse.journal().is_empty());
    assert!(store.journal().is_empty());
    assert!(store.contains(BUCKET, "inbound/a.csv"));
}

#[test]
fn unknown_extension_is_skipped_without_error() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/a.txt", "hello");
    let warehouse = MemoryWarehouse::new();

    let outcome = run(&store, &warehouse, "inbound/a.txt", PipelineOptions::default()).unwrap();

    assert_eq!(
        outcome,
        LandingOutcome::Skipped(SkipReason::UnsupportedFormat {
            key: "inbound/a.txt".to_string()
        })
    );
    assert!(warehouse.journal().is_empty());
    assert!(store.journal().is_empty());
    assert!(store.contains(BUCKET, "inbound/a.txt"));
}

#[test]
fn uppercase_extension_is_not_recognized() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/a.CSV", "id\n1\n");
    let warehouse = MemoryWarehouse::new();

    let outcome = run(&store, &warehouse, "inbound/a.CSV", PipelineOptions::default()).unwrap();
    assert!(matches!(outcome, LandingOutcome::Skipped(SkipReason::UnsupportedFormat { .. })));
}

#[test]
fn bare_json_object_loads_one_flattened_row() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/events.json", r#"{"a":1}"#);
    let warehouse = MemoryWarehouse::new();

    let outcome = run(&store, &warehouse, "inbound/events.json", PipelineOptions::default()).unwrap();
    assert!(outcome.is_archived());

    let rows = warehouse.table_rows("d.events");
    assert_eq!(rows.len(), 1);
    let columns: Vec<_> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["a", "row_gen_timestamp"]);
    assert_eq!(rows[0]["a"], "1");
}

#[test]
fn only_the_normalized_json_frame_is_loaded() {
    let store = store_with(
        APPEND_WITH_HEADER,
        "inbound/users.json",
        "{\"id\":1,\"user\":{\"name\":\"ada\"}}\n{\"id\":2,\"user\":{\"name\":\"bob\"}}\n",
    );
    let warehouse = MemoryWarehouse::new();

    run(&store, &warehouse, "inbound/users.json", PipelineOptions::default()).unwrap();

    let journal = warehouse.journal();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].format, SourceFormat::Rows);
    let rows = warehouse.table_rows("d.users");
    assert_eq!(rows.len(), 2);
    assert!(rows[0].contains_key("user.name"));
    assert!(!rows[0].contains_key("user"));
    assert_eq!(rows[1]["user.name"], "bob");
}

#[test]
fn xml_is_streamed_as_one_json_record_with_autodetect() {
    let store = store_with(
        APPEND_WITH_HEADER,
        "inbound/orders.xml",
        "<order id=\"7\"><sku>pen</sku><qty>2</qty></order>",
    );
    let warehouse = MemoryWarehouse::new();

    let outcome = run(&store, &warehouse, "inbound/orders.xml", PipelineOptions::default()).unwrap();

    let LandingOutcome::Archived(report) = outcome else {
        panic!("expected archived outcome");
    };
    assert_eq!(report.table.to_string(), "dx.orders");
    assert_eq!(report.landed_key, "landed/orders_2024-01-31_08:15:02.000123.xml");

    let journal = warehouse.journal();
    assert_eq!(journal[0].format, SourceFormat::NewlineDelimitedJson);
    assert_eq!(journal[0].options, LoadOptions::default());
    let rows = warehouse.table_rows("dx.orders");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        serde_json::Value::Object(rows[0].clone()),
        serde_json::json!({"order": {"id": "7", "sku": "pen", "qty": "2"}})
    );
    // No synthetic timestamp on the XML path.
    assert!(!rows[0].contains_key("row_gen_timestamp"));
}

#[test]
fn pinned_xml_schema_disables_autodetect() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/orders.xml", "<order><sku>pen</sku></order>");
    let warehouse = MemoryWarehouse::new();
    let options = PipelineOptions {
        pin_xml_schema: true,
        ..Default::default()
    };

    run(&store, &warehouse, "inbound/orders.xml", options).unwrap();

    let journal = warehouse.journal();
    assert!(!journal[0].options.autodetect);
    let schema: &Schema = journal[0].options.schema.as_ref().unwrap();
    assert_eq!(schema.field_names().collect::<Vec<_>>(), vec!["order"]);
}

#[test]
fn explicit_table_name_is_used() {
    let store = store_with(
        r#"{"table_name":"sales","dataset":"d","operation":"APPEND","header":true}"#,
        "inbound/2024/jan.csv",
        "id\n1\n",
    );
    let warehouse = MemoryWarehouse::new();

    run(&store, &warehouse, "inbound/2024/jan.csv", PipelineOptions::default()).unwrap();

    assert_eq!(warehouse.table_rows("d.sales").len(), 1);
    assert!(store.contains(BUCKET, "landed/2024/jan_2024-01-31_08:15:02.000123.csv"));
}

#[test]
fn default_table_name_keeps_subdirectories() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/sales/jan.csv", "id\n1\n");
    let warehouse = MemoryWarehouse::new();

    run(&store, &warehouse, "inbound/sales/jan.csv", PipelineOptions::default()).unwrap();

    assert_eq!(warehouse.table_rows("d.sales/jan").len(), 1);
}

#[test]
fn missing_config_is_fatal_and_touches_nothing() {
    let store = MemoryObjectStore::new();
    store.insert(BUCKET, "inbound/a.csv", "id\n1\n");
    let warehouse = MemoryWarehouse::new();

    let err = run(&store, &warehouse, "inbound/a.csv", PipelineOptions::default()).unwrap_err();

    assert!(matches!(err, LandingError::Config { .. }));
    assert!(warehouse.journal().is_empty());
    assert!(store.contains(BUCKET, "inbound/a.csv"));
}

#[test]
fn invalid_config_json_is_fatal() {
    let store = store_with("{dataset:", "inbound/a.csv", "id\n1\n");
    let warehouse = MemoryWarehouse::new();

    let err = run(&store, &warehouse, "inbound/a.csv", PipelineOptions::default()).unwrap_err();
    assert!(matches!(err, LandingError::Config { .. }));
}

#[test]
fn missing_dataset_is_fatal() {
    let store = store_with(r#"{"operation":"APPEND"}"#, "inbound/a.csv", "id\n1\n");
    let warehouse = MemoryWarehouse::new();

    let err = run(&store, &warehouse, "inbound/a.csv", PipelineOptions::default()).unwrap_err();
    assert!(matches!(err, LandingError::Config { .. }));
    assert!(warehouse.journal().is_empty());
}

#[test]
fn malformed_body_leaves_object_in_place() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/bad.json", "{\"a\":");
    let warehouse = MemoryWarehouse::new();

    let err = run(&store, &warehouse, "inbound/bad.json", PipelineOptions::default()).unwrap_err();

    assert!(matches!(err, LandingError::Json(_)));
    assert!(warehouse.journal().is_empty());
    assert!(store.journal().is_empty());
    assert!(store.contains(BUCKET, "inbound/bad.json"));
}

#[test]
fn failed_load_never_archives() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/a.csv", "id\n1\n");
    let warehouse = MemoryWarehouse::new();
    warehouse.fail_next_load("quota exceeded");

    let err = run(&store, &warehouse, "inbound/a.csv", PipelineOptions::default()).unwrap_err();

    assert!(matches!(err, LandingError::Load(WarehouseError::Rejected { .. })));
    assert!(store.journal().is_empty());
    assert!(store.contains(BUCKET, "inbound/a.csv"));
}

#[test]
fn load_wait_is_bounded_by_timeout() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/a.csv", "id\n1\n");
    let warehouse = MemoryWarehouse::new();
    warehouse.set_job_delay(Duration::from_secs(5));
    let options = PipelineOptions {
        load_timeout: Duration::from_millis(20),
        ..Default::default()
    };

    let err = run(&store, &warehouse, "inbound/a.csv", options).unwrap_err();

    assert!(matches!(err, LandingError::Load(WarehouseError::Timeout { .. })));
    assert!(warehouse.table_rows("d.a").is_empty());
    assert!(store.contains(BUCKET, "inbound/a.csv"));
}

#[test]
fn archive_failure_is_reported_after_rows_are_loaded() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/a.csv", "id\n1\n");
    store.fail_deletes(true);
    let warehouse = MemoryWarehouse::new();

    let err = run(&store, &warehouse, "inbound/a.csv", PipelineOptions::default()).unwrap_err();

    match err {
        LandingError::Archive { source_key, dest_key, .. } => {
            assert_eq!(source_key, "inbound/a.csv");
            assert_eq!(dest_key, "landed/a_2024-01-31_08:15:02.000123.csv");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(warehouse.table_rows("d.a").len(), 1);
    assert!(store.contains(BUCKET, "inbound/a.csv"));
}

#[test]
fn copy_precedes_delete_when_archiving() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/a.csv", "id\n1\n");
    let warehouse = MemoryWarehouse::new();

    run(&store, &warehouse, "inbound/a.csv", PipelineOptions::default()).unwrap();

    let journal = store.journal();
    assert!(matches!(journal.as_slice(), [StoreOp::Copy { .. }, StoreOp::Delete { .. }]));
}

#[test]
fn content_hash_naming_converges_on_one_landed_key() {
    let options = || PipelineOptions {
        archive_naming: ArchiveNaming::ContentHash,
        ..Default::default()
    };
    let warehouse = MemoryWarehouse::new();

    let first = store_with(APPEND_WITH_HEADER, "inbound/a.csv", "id\n1\n");
    let second = store_with(APPEND_WITH_HEADER, "inbound/a.csv", "id\n1\n");
    let a = run(&first, &warehouse, "inbound/a.csv", options()).unwrap();
    let b = LandingPipeline::new(&second, &warehouse, options())
        .run(&LandingRequest::new(BUCKET, "inbound/a.csv"))
        .unwrap();

    let (LandingOutcome::Archived(a), LandingOutcome::Archived(b)) = (a, b) else {
        panic!("expected two archived outcomes");
    };
    assert_eq!(a.landed_key, b.landed_key);
    assert!(a.landed_key.starts_with("landed/a_"));
}

// Shared log of capability calls, used to check that archiving never precedes a completed load.
type CallLog = Arc<Mutex<Vec<String>>>;

struct LoggingStore {
    inner: MemoryObjectStore,
    log: CallLog,
}

impl ObjectStore for LoggingStore {
    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        self.inner.get_object(bucket, key)
    }

    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> StoreResult<()> {
        self.log.lock().unwrap().push("put".to_string());
        self.inner.put_object(bucket, key, body)
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        self.inner.list_objects(bucket, prefix)
    }

    fn copy_object(&self, bucket: &str, source_key: &str, dest_key: &str) -> StoreResult<()> {
        self.log.lock().unwrap().push("copy".to_string());
        self.inner.copy_object(bucket, source_key, dest_key)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.log.lock().unwrap().push("delete".to_string());
        self.inner.delete_object(bucket, key)
    }
}

struct LoggingWarehouse {
    inner: MemoryWarehouse,
    log: CallLog,
}

impl Warehouse for LoggingWarehouse {
    fn load(
        &self,
        table: &TableId,
        source: LoadSource<'_>,
        options: &LoadOptions,
    ) -> Result<Box<dyn LoadJob>, WarehouseError> {
        self.log.lock().unwrap().push("load".to_string());
        let job = self.inner.load(table, source, options)?;
        Ok(Box::new(LoggingJob {
            inner: job,
            log: Arc::clone(&self.log),
        }))
    }
}

struct LoggingJob {
    inner: Box<dyn LoadJob>,
    log: CallLog,
}

impl LoadJob for LoggingJob {
    fn job_id(&self) -> &str {
        self.inner.job_id()
    }

    fn wait(self: Box<Self>, timeout: Duration) -> Result<LoadStats, WarehouseError> {
        let job = *self;
        let stats = job.inner.wait(timeout);
        if stats.is_ok() {
            job.log.lock().unwrap().push("committed".to_string());
        }
        stats
    }
}

#[test]
fn archival_follows_a_completed_load_for_every_format() {
    for (key, body) in [
        ("inbound/a.csv", "id\n1\n"),
        ("inbound/a.json", r#"[{"id":1}]"#),
        ("inbound/a.xml", "<r><id>1</id></r>"),
    ] {
        let log: CallLog = Arc::default();
        let store = LoggingStore {
            inner: store_with(APPEND_WITH_HEADER, key, body),
            log: Arc::clone(&log),
        };
        let warehouse = LoggingWarehouse {
            inner: MemoryWarehouse::new(),
            log: Arc::clone(&log),
        };

        let outcome = LandingPipeline::new(&store, &warehouse, PipelineOptions::default())
            .run(&LandingRequest::new(BUCKET, key))
            .unwrap();

        assert!(outcome.is_archived(), "{key}");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["load", "committed", "copy", "delete"],
            "{key}"
        );
    }
}

#[test]
fn header_only_csv_does_not_lock_the_table_schema() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/a.csv", "id,val\n");
    let warehouse = MemoryWarehouse::new();

    let first = run(&store, &warehouse, "inbound/a.csv", PipelineOptions::default()).unwrap();
    let LandingOutcome::Archived(report) = first else {
        panic!("expected archived outcome, got {first:?}");
    };
    assert_eq!(report.rows_loaded, 0);
    assert_eq!(warehouse.table_schema("d.a"), None);

    store.insert(BUCKET, "inbound/a.csv", "id,val\n1,5\n");
    let second = run(&store, &warehouse, "inbound/a.csv", PipelineOptions::default()).unwrap();

    assert!(second.is_archived());
    let rows = warehouse.table_rows("d.a");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "1");
    let schema = warehouse.table_schema("d.a").unwrap();
    assert_eq!(
        schema.field_names().collect::<Vec<_>>(),
        vec!["id", "val", "row_gen_timestamp"]
    );
}

#[test]
fn empty_json_array_then_rows_load_into_one_table() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/ids.json", "[]");
    let warehouse = MemoryWarehouse::new();

    run(&store, &warehouse, "inbound/ids.json", PipelineOptions::default()).unwrap();

    store.insert(BUCKET, "inbound/ids.json", r#"[{"id":7}]"#);
    let outcome = run(&store, &warehouse, "inbound/ids.json", PipelineOptions::default()).unwrap();
    assert!(outcome.is_archived());
    assert_eq!(warehouse.table_rows("d.ids")[0]["id"], "7");
}

#[test]
fn unsigned_integers_past_i64_load_exactly() {
    let store = store_with(APPEND_WITH_HEADER, "inbound/ids.json", r#"{"id":18446744073709551615}"#);
    let warehouse = MemoryWarehouse::new();

    run(&store, &warehouse, "inbound/ids.json", PipelineOptions::default()).unwrap();

    let rows = warehouse.table_rows("d.ids");
    assert_eq!(rows[0]["id"], "18446744073709551615");
}

#[test]
fn key_shorter_than_inbound_prefix_fails_before_load() {
    let store = store_with(
        r#"{"table_name":"sales","dataset":"d","operation":"APPEND","header":true}"#,
        "a.csv",
        "id\n1\n",
    );
    let warehouse = MemoryWarehouse::new();

    let err = run(&store, &warehouse, "a.csv", PipelineOptions::default()).unwrap_err();

    assert!(matches!(err, LandingError::Config { .. }));
    assert!(warehouse.journal().is_empty());
    assert!(store.journal().is_empty());
    assert!(store.contains(BUCKET, "a.csv"));
}
