//! Landing worker: lands the single object named by `S3_BUCKET` / `S3_KEY`.

use std::process::ExitCode;
use std::sync::Arc;

use s3_lander::config::WorkerSettings;
use s3_lander::credentials::{CredentialProvider, FileCredentialProvider};
use s3_lander::pipeline::{self, LandingPipeline, PipelineOptions, TracingObserver};
use s3_lander::store::FsObjectStore;
use s3_lander::warehouse::FsWarehouse;
use s3_lander::{LandingRequest, LandingResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .ok();

    tracing::info!("s3-lander {}", env!("CARGO_PKG_VERSION"));

    let (request, store, warehouse, options) = match setup() {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!(error = %e, stage = %e.stage(), "landing worker could not start");
            return ExitCode::FAILURE;
        }
    };

    // The observer reports the outcome.
    match LandingPipeline::new(&store, &warehouse, options).run(&request) {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

fn setup() -> LandingResult<(LandingRequest, FsObjectStore, FsWarehouse, PipelineOptions)> {
    let settings = WorkerSettings::from_env()?;
    let request = LandingRequest::from_env()?;
    tracing::info!(bucket = %request.bucket, key = %request.key, "landing request received");

    let store = FsObjectStore::new(&settings.store_root);
    let mut warehouse = FsWarehouse::new(&settings.warehouse_root);
    if let Some(secret_path) = settings.secret_path.as_deref() {
        let provider = FileCredentialProvider::new(&settings.credentials_root);
        let credentials = provider.fetch(secret_path)?;
        tracing::info!(
            project = %credentials.project,
            principal = credentials.principal.as_deref().unwrap_or("-"),
            "warehouse credentials resolved"
        );
        warehouse = warehouse.with_credentials(credentials);
    }

    if let Some(prefix) = settings.list_prefix.as_deref() {
        pipeline::list_bucket(&store, &request.bucket, prefix)?;
    }

    let options = PipelineOptions {
        load_timeout: settings.load_timeout,
        archive_naming: settings.archive_naming,
        pin_xml_schema: settings.pin_xml_schema,
        observer: Some(Arc::new(TracingObserver)),
        ..Default::default()
    };
    Ok((request, store, warehouse, options))
}
