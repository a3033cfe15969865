//! Daily ingestion run: CSV export in, date-partitioned snapshot out.

use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result, RowError};
use crate::pipeline::batch::PendingBatch;
use crate::pipeline::reading::SourceColumns;
use crate::pipeline::types::{IngestReport, LocationRecord, SnapshotMeta};
use crate::store::{DocPath, DocumentStore};

/// Source of the run timestamp.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Names and limits a run writes with.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub collection: String,
    pub source_label: String,
    pub batch_limit: usize,
}

/// Rows read from the source and the records they produced.
#[derive(Debug, Default)]
pub struct StagedRows {
    pub batch: PendingBatch,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub rows_staged: usize,
}

/// Parses, classifies and stages every row of `reader`.
///
/// Row-level problems skip the row. An I/O failure while reading aborts the
/// whole run, since a partially read source must not be committed.
pub fn stage_rows<R: Read>(
    reader: &mut csv::Reader<R>,
    source_name: &str,
    columns: &SourceColumns,
    date: &str,
    source_label: &str,
    updated_at: DateTime<Utc>,
) -> Result<StagedRows> {
    let mut staged = StagedRows::default();

    for result in reader.records() {
        staged.rows_read += 1;

        let parsed = match result {
            Ok(record) => columns.parse(&record),
            Err(e) if e.is_io_error() => return Err(IngestError::source_error(source_name, e)),
            Err(e) => Err(RowError::Malformed(e.to_string())),
        };

        match parsed {
            Ok(score) => {
                let record = LocationRecord::from_score(score, date, source_label, updated_at);
                if let Some(previous) = staged.batch.stage(record) {
                    debug!(
                        location = %previous.location,
                        replaced_score = previous.score,
                        "Duplicate location, keeping later row"
                    );
                }
                staged.rows_staged += 1;
            }
            Err(reason) => {
                staged.rows_skipped += 1;
                warn!(row = staged.rows_read, reason = %reason, "Skipping row");
            }
        }
    }

    Ok(staged)
}

/// Turns one CSV export into a committed daily snapshot.
pub struct IngestionPipeline {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    settings: IngestSettings,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, settings: IngestSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Opens the CSV at `path` and runs the pipeline over it.
    ///
    /// Nothing is written if the file cannot be opened.
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn run(&self, path: &Path) -> Result<IngestReport> {
        let file = std::fs::File::open(path)
            .map_err(|e| IngestError::source_error(path.display().to_string(), e))?;
        self.run_reader(&path.display().to_string(), file).await
    }

    /// Runs the pipeline over an already opened CSV source.
    pub async fn run_reader<R: Read + Send>(&self, source_name: &str, source: R) -> Result<IngestReport> {
        // One timestamp for the whole run, so every record shares the partition key.
        let now = self.clock.now();
        let date = now.format("%Y-%m-%d").to_string();
        let collection = self.settings.collection.as_str();

        let mut reader = ReaderBuilder::new().flexible(true).from_reader(source);
        let columns = SourceColumns::from_headers(
            reader
                .headers()
                .map_err(|e| IngestError::source_error(source_name, e))?,
        );
        if !columns.is_complete() {
            warn!(source = source_name, "Source header lacks a location or mean column, every row will be skipped");
        }

        info!(date = %date, source = source_name, "Starting ingestion");

        let meta = SnapshotMeta {
            updated_at: now,
            source: self.settings.source_label.clone(),
        };
        let Value::Object(meta_doc) = serde_json::to_value(&meta)
            .map_err(|e| IngestError::Store(e.into()))?
        else {
            return Err(IngestError::Store(anyhow::anyhow!(
                "snapshot metadata did not serialize to an object"
            )));
        };
        self.store
            .merge(&DocPath::partition(collection, &date), meta_doc)
            .await
            .map_err(IngestError::Store)?;

        let staged = stage_rows(
            &mut reader,
            source_name,
            &columns,
            &date,
            &self.settings.source_label,
            now,
        )?;

        let limit = self.settings.batch_limit.min(self.store.max_batch_writes());
        let chunks = staged
            .batch
            .into_chunks(collection, limit)
            .map_err(IngestError::Store)?;
        let records: usize = chunks.iter().map(Vec::len).sum();
        let total = chunks.len();

        if total > 1 {
            warn!(
                records,
                chunks = total,
                limit,
                "Batch exceeds single-commit limit, committing in chunks without run-level atomicity"
            );
        }

        for (committed, chunk) in chunks.into_iter().enumerate() {
            let size = chunk.len();
            self.store
                .commit(chunk)
                .await
                .map_err(|source| IngestError::Commit {
                    committed,
                    total,
                    source,
                })?;
            debug!(chunk = committed + 1, total, size, "Chunk committed");
        }

        let report = IngestReport {
            date,
            rows_read: staged.rows_read,
            rows_skipped: staged.rows_skipped,
            rows_staged: staged.rows_staged,
            records,
            chunks_committed: total,
        };

        info!(
            date = %report.date,
            rows_read = report.rows_read,
            rows_skipped = report.rows_skipped,
            records = report.records,
            "Ingestion complete"
        );
        Ok(report)
    }
}
