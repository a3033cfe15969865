//! Run-time configuration.
//!
//! Values come from environment variables, with `.env` support provided by
//! the caller through `dotenvy`. Everything is validated once, before the
//! pipeline touches the source or the store.

use std::path::PathBuf;

use crate::error::{IngestError, Result};
use crate::store::DEFAULT_MAX_BATCH_WRITES;

/// Parse an optional `usize` variable with a default value.
macro_rules! parse_usize {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<usize>())
            .transpose()
            .map_err(|e| IngestError::Config(format!("Invalid {}: {}", $var_name, e)))?
            .unwrap_or($default)
    };
}

/// Read an optional string variable with a default value.
macro_rules! string_or {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        $lookup($var_name)
            .filter(|v: &String| !v.trim().is_empty())
            .unwrap_or_else(|| $default.to_string())
    };
}

/// Where documents are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process only; nothing outlives the run.
    Memory,
    Local { dir: PathBuf },
    S3 { bucket: String, prefix: String },
}

/// Strongly typed ingestion configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub source_csv: PathBuf,
    pub collection: String,
    pub source_label: String,
    pub batch_limit: usize,
    pub store: StoreBackend,
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// Optional:
    /// - `AQ_SOURCE_CSV` (default `data/India_Air_Quality_Risk.csv`)
    /// - `AQ_COLLECTION` (default `air_quality_risk`)
    /// - `AQ_SOURCE_LABEL` (default `Sentinel-5P`)
    /// - `AQ_BATCH_LIMIT` (default 500)
    /// - `AQ_STORE` = `local` | `s3` | `memory` (default `local`)
    /// - `AQ_STORE_DIR` (default `store`, for `local`)
    /// - `AQ_S3_PREFIX` (for `s3`)
    ///
    /// Required when `AQ_STORE=s3`: `AQ_S3_BUCKET`.
    pub fn load_from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let source_csv = PathBuf::from(string_or!(lookup, "AQ_SOURCE_CSV", "data/India_Air_Quality_Risk.csv"));
        let collection = string_or!(lookup, "AQ_COLLECTION", "air_quality_risk");
        let source_label = string_or!(lookup, "AQ_SOURCE_LABEL", "Sentinel-5P");
        let batch_limit = parse_usize!(lookup, "AQ_BATCH_LIMIT", DEFAULT_MAX_BATCH_WRITES);

        if batch_limit == 0 {
            return Err(IngestError::Config("AQ_BATCH_LIMIT must be at least 1".to_string()));
        }
        if collection.contains('/') {
            return Err(IngestError::Config(format!(
                "AQ_COLLECTION must be a single path segment, got '{collection}'"
            )));
        }

        let backend = string_or!(lookup, "AQ_STORE", "local").to_ascii_lowercase();
        let store = match backend.as_str() {
            "memory" => StoreBackend::Memory,
            "local" => StoreBackend::Local {
                dir: PathBuf::from(string_or!(lookup, "AQ_STORE_DIR", "store")),
            },
            "s3" => StoreBackend::S3 {
                bucket: lookup("AQ_S3_BUCKET")
                    .filter(|b| !b.trim().is_empty())
                    .ok_or_else(|| {
                        IngestError::Config("AQ_S3_BUCKET must be set when AQ_STORE=s3".to_string())
                    })?,
                prefix: lookup("AQ_S3_PREFIX").unwrap_or_default(),
            },
            other => {
                return Err(IngestError::Config(format!(
                    "AQ_STORE must be one of local, s3, memory; got '{other}'"
                )));
            }
        };

        Ok(Self {
            source_csv,
            collection,
            source_label,
            batch_limit,
            store,
        })
    }

    /// Log the loaded configuration.
    pub fn log_config(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!("  AQ_SOURCE_CSV   : {}", self.source_csv.display());
        tracing::info!("  AQ_COLLECTION   : {}", self.collection);
        tracing::info!("  AQ_SOURCE_LABEL : {}", self.source_label);
        tracing::info!("  AQ_BATCH_LIMIT  : {}", self.batch_limit);
        match &self.store {
            StoreBackend::Memory => tracing::info!("  AQ_STORE        : memory"),
            StoreBackend::Local { dir } => {
                tracing::info!("  AQ_STORE        : local ({})", dir.display())
            }
            StoreBackend::S3 { bucket, prefix } => {
                tracing::info!("  AQ_STORE        : s3 (bucket={bucket}, prefix={prefix})")
            }
        }
    }
}
