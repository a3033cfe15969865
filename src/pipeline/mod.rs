//! Daily ingestion and risk classification.
//!
//! Rows of the district pollutant export are parsed, rounded to an integer
//! score, classified into a [`risk::RiskLevel`] and staged into a single
//! pending batch that is committed once the whole source has been read.

pub mod batch;
pub mod ingest;
pub mod reading;
pub mod risk;
pub mod types;
