//! Pulse measurement archive ingester service.
//!
//! Pulls uploaded device archives out of object storage, decrypts and
//! parses their members, derives the summary metrics, and lands the
//! result in the measurement registry. Runs as an HTTP service by
//! default; `--file` and `--reingest-all` run one-shot jobs instead.

mod config;
mod server;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use futures::stream::{self, StreamExt};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use ingestion::{IngestOutcome, Ingester};
use pulse_common::MeasurementStore;
use storage::{ObjectStorage, Registry};

use config::ServiceConfig;
use server::{start_server, IngestionTracker, ServerState};

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Measurement archive ingester for the pulse registry")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value_t = 8082)]
    port: u16,

    /// Ingest a single archive file by id, then exit
    #[arg(long)]
    file: Option<Uuid>,

    /// Re-ingest every known archive file, then exit
    #[arg(long)]
    reingest_all: bool,

    /// Replace existing measurements instead of updating them in place
    #[arg(long)]
    overwrite: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("starting archive ingester");

    let config = ServiceConfig::from_env()?;
    info!(bucket = %config.storage.bucket, "loaded configuration");

    let registry = Registry::connect(&config.database_url).await?;
    registry.migrate().await?;

    let store = Arc::new(registry);
    let blobs = Arc::new(ObjectStorage::new(&config.storage)?);
    let ingester = Ingester::new(store.clone(), blobs, config.ingest.clone())?;

    if let Some(file_id) = args.file {
        let outcome = ingester.ingest(file_id, args.overwrite).await;
        report_outcome(&outcome);
        return Ok(());
    }

    if args.reingest_all {
        return reingest_all(
            &ingester,
            store.as_ref(),
            config.ingest.reingest_parallelism,
            args.overwrite,
        )
        .await;
    }

    let state = Arc::new(ServerState {
        ingester,
        tracker: IngestionTracker::new(),
    });

    start_server(state, args.port).await
}

/// Re-ingest every known archive, a bounded number at a time. Each
/// archive is an independent unit of work, so failures are reported and
/// skipped rather than stopping the batch.
async fn reingest_all(
    ingester: &Ingester,
    store: &Registry,
    parallelism: usize,
    overwrite: bool,
) -> Result<()> {
    let ids = store.all_file_ids().await?;
    info!(files = ids.len(), parallelism, "starting bulk re-ingestion");

    let outcomes: Vec<IngestOutcome> = stream::iter(ids)
        .map(|id| ingester.ingest(id, overwrite))
        .buffer_unordered(parallelism)
        .collect()
        .await;

    for outcome in &outcomes {
        report_outcome(outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.success).count();
    info!(
        total = outcomes.len(),
        succeeded = outcomes.len() - failed,
        failed,
        "bulk re-ingestion finished"
    );
    Ok(())
}

fn report_outcome(outcome: &IngestOutcome) {
    if outcome.success {
        info!(
            file_id = %outcome.file_id,
            measurement_id = ?outcome.measurement_id,
            "archive ingested"
        );
    } else {
        error!(
            file_id = %outcome.file_id,
            stage = outcome.stage.as_str(),
            error = ?outcome.error_message,
            "archive ingestion failed"
        );
    }
}
