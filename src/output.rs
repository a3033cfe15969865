//! Output of ingestion run reports.
//!
//! Supports pretty-printing, JSON logging, and appending to a CSV run log.

use anyhow::Result;
use tracing::{debug, info};

use crate::pipeline::types::IngestReport;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Logs a run report using Rust's debug pretty-print format.
pub fn print_pretty(report: &IngestReport) {
    debug!("{:#?}", report);
}

/// Logs a run report as pretty-printed JSON.
pub fn print_json(report: &IngestReport) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Appends an [`IngestReport`] as a row to a CSV run log.
///
/// Creates the file with headers if it does not already exist.
pub fn append_report(path: &Path, report: &IngestReport) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending run report");

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(report)?;
    writer.flush()?;

    Ok(())
}
