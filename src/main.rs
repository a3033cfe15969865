//! CLI entry point for the air-quality risk ingestion tool.
//!
//! Provides subcommands for ingesting the daily district CSV export, showing
//! a published snapshot, and painting a districts GeoJSON for the map.

use anyhow::{Context, Result};
use aq_risk_ingest::config::{Config, StoreBackend};
use aq_risk_ingest::error::IngestError;
use aq_risk_ingest::output::{append_report, print_json, print_pretty};
use aq_risk_ingest::pipeline::ingest::{IngestSettings, IngestionPipeline, SystemClock};
use aq_risk_ingest::render::{DEFAULT_NAME_PROPERTY, paint};
use aq_risk_ingest::snapshot;
use aq_risk_ingest::store::{DocumentStore, LocalStore, MemoryStore, S3Store, preflight_credentials};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "aq_risk_ingest")]
#[command(about = "Publishes daily district air-quality risk snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the district CSV export into today's snapshot
    Ingest {
        /// CSV export to read (overrides AQ_SOURCE_CSV)
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,

        /// Optional: CSV file to append the run report to
        #[arg(long, value_name = "FILE")]
        report_csv: Option<PathBuf>,
    },
    /// Show the snapshot published for a date
    Show {
        /// Date to read, YYYY-MM-DD (defaults to today, UTC)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Color a districts GeoJSON by the risk published for a date
    Map {
        /// Districts GeoJSON FeatureCollection
        #[arg(long, value_name = "FILE")]
        geojson: PathBuf,

        /// Where to write the painted GeoJSON
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,

        /// Date to read, YYYY-MM-DD (defaults to today, UTC)
        #[arg(short, long)]
        date: Option<String>,

        /// Feature property holding the district name
        #[arg(long, default_value = DEFAULT_NAME_PROPERTY)]
        name_property: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<IngestError>()
                .map(IngestError::exit_code)
                .unwrap_or(1);
            let message = format!("{e:#}");
            error!(error = %message, exit_code = code, "Run failed");
            ExitCode::from(code)
        }
    }
}

/// Logging setup: colored stderr + JSON rolling log file.
fn init_tracing() -> WorkerGuard {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/aq_risk_ingest.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("aq_risk_ingest.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(LevelFilter::INFO.into()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive(LevelFilter::DEBUG.into()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    file_guard
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_from_env()?;
    config.log_config();

    match cli.command {
        Commands::Ingest { csv, report_csv } => {
            let source = csv.unwrap_or_else(|| config.source_csv.clone());
            let store = build_store(&config).await?;

            let pipeline = IngestionPipeline::new(
                store,
                Arc::new(SystemClock),
                IngestSettings {
                    collection: config.collection.clone(),
                    source_label: config.source_label.clone(),
                    batch_limit: config.batch_limit,
                },
            );

            let report = pipeline.run(&source).await?;
            print_pretty(&report);
            print_json(&report)?;

            if let Some(path) = report_csv {
                append_report(&path, &report)
                    .with_context(|| format!("failed to append run report to {}", path.display()))?;
            }
            info!(records = report.records, "Ingestion complete: {} records added.", report.records);
        }
        Commands::Show { date } => {
            let date = resolve_date(date)?;
            let store = build_store(&config).await?;
            let snapshot = snapshot::load(store.as_ref(), &config.collection, &date).await?;

            match &snapshot.meta {
                Some(meta) => info!(
                    date = %snapshot.date,
                    source = %meta.source,
                    updated_at = %meta.updated_at,
                    records = snapshot.records.len(),
                    "Snapshot"
                ),
                None => info!(date = %snapshot.date, "No snapshot published for date"),
            }

            for record in &snapshot.records {
                info!(
                    location = %record.location,
                    score = record.score,
                    risk = %record.risk,
                    color = record.risk.color(),
                    "Location"
                );
            }

            for (risk, count) in snapshot.tier_counts() {
                info!(risk = %risk, count, "Tier summary");
            }
        }
        Commands::Map {
            geojson,
            out,
            date,
            name_property,
        } => {
            let date = resolve_date(date)?;
            let store = build_store(&config).await?;
            let snapshot = snapshot::load(store.as_ref(), &config.collection, &date).await?;

            let content = std::fs::read_to_string(&geojson)
                .with_context(|| format!("failed to read {}", geojson.display()))?;
            let mut districts: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("{} is not valid JSON", geojson.display()))?;

            let summary = paint(&mut districts, &snapshot, &name_property)?;

            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&out, serde_json::to_vec(&districts)?)
                .with_context(|| format!("failed to write {}", out.display()))?;

            info!(
                date = %date,
                features = summary.features,
                matched = summary.matched,
                no_data = summary.no_data,
                out = %out.display(),
                "Map written"
            );
        }
    }

    Ok(())
}

/// Validates a `YYYY-MM-DD` argument, defaulting to today's UTC date.
fn resolve_date(date: Option<String>) -> Result<String> {
    match date {
        Some(d) => {
            let parsed = NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                .with_context(|| format!("invalid date '{d}', expected YYYY-MM-DD"))?;
            Ok(parsed.format("%Y-%m-%d").to_string())
        }
        None => Ok(Utc::now().date_naive().format("%Y-%m-%d").to_string()),
    }
}

/// Builds the configured store, failing before any write if it cannot be initialized.
async fn build_store(config: &Config) -> Result<Arc<dyn DocumentStore>, IngestError> {
    let store: Arc<dyn DocumentStore> = match &config.store {
        StoreBackend::Memory => Arc::new(MemoryStore::with_batch_limit(config.batch_limit)),
        StoreBackend::Local { dir } => Arc::new(LocalStore::new(dir, config.batch_limit)),
        StoreBackend::S3 { bucket, prefix } => {
            let sdk_config = aws_config::load_from_env().await;
            preflight_credentials(sdk_config.credentials_provider()).await?;
            info!(bucket = %bucket, prefix = %prefix, "S3 store enabled");
            Arc::new(S3Store::new(
                aws_sdk_s3::Client::new(&sdk_config),
                bucket.clone(),
                prefix,
                config.batch_limit,
            ))
        }
    };
    Ok(store)
}
