//! Data types shared by the ingestion pipeline and the snapshot readers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pipeline::risk::{RiskLevel, classify};

/// A validated row: resolved location name and its rounded score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationScore {
    pub location: String,
    pub score: i64,
    pub risk: RiskLevel,
}

impl LocationScore {
    pub fn new(location: String, score: i64) -> Self {
        Self {
            location,
            score,
            risk: classify(score),
        }
    }
}

/// One per-location document, keyed by `(date, location)` under a daily partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub location: String,
    pub score: i64,
    pub risk: RiskLevel,
    pub date: String,
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

impl LocationRecord {
    pub fn from_score(
        score: LocationScore,
        date: &str,
        source: &str,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            location: score.location,
            score: score.score,
            risk: score.risk,
            date: date.to_string(),
            source: source.to_string(),
            updated_at,
        }
    }
}

/// Fields merged into the date-level partition document on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub updated_at: DateTime<Utc>,
    pub source: String,
}

/// Everything published for one calendar date.
#[derive(Debug, Clone, Default)]
pub struct DailySnapshot {
    pub date: String,
    pub meta: Option<SnapshotMeta>,
    pub records: Vec<LocationRecord>,
}

impl DailySnapshot {
    /// Looks up a record by exact location name.
    pub fn record(&self, location: &str) -> Option<&LocationRecord> {
        self.records.iter().find(|r| r.location == location)
    }

    /// Number of records in each tier. Every tier is present, possibly with zero.
    pub fn tier_counts(&self) -> BTreeMap<RiskLevel, usize> {
        let mut counts: BTreeMap<RiskLevel, usize> =
            RiskLevel::ALL.into_iter().map(|level| (level, 0)).collect();
        for record in &self.records {
            *counts.entry(record.risk).or_default() += 1;
        }
        counts
    }
}

/// Outcome of a completed ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub date: String,
    pub rows_read: usize,
    pub rows_skipped: usize,
    /// Rows that produced a record, including ones later replaced by a duplicate location.
    pub rows_staged: usize,
    /// Distinct documents committed.
    pub records: usize,
    pub chunks_committed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 24, 6, 30, 0).unwrap()
    }

    #[test]
    fn test_location_score_classifies() {
        let score = LocationScore::new("Pune".to_string(), 43);
        assert_eq!(score.risk, RiskLevel::Moderate);
    }

    #[test]
    fn test_location_record_uses_camel_case_fields() {
        let record = LocationRecord::from_score(
            LocationScore::new("Pune".to_string(), 43),
            "2025-12-24",
            "Sentinel-5P",
            ts(),
        );
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["location"], "Pune");
        assert_eq!(json["score"], 43);
        assert_eq!(json["risk"], "Moderate");
        assert_eq!(json["date"], "2025-12-24");
        assert_eq!(json["source"], "Sentinel-5P");
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("updated_at").is_none());
    }

    #[test]
    fn test_tier_counts_include_empty_tiers() {
        let snapshot = DailySnapshot {
            date: "2025-12-24".to_string(),
            meta: None,
            records: vec![
                LocationRecord::from_score(
                    LocationScore::new("A".to_string(), 10),
                    "2025-12-24",
                    "s",
                    ts(),
                ),
                LocationRecord::from_score(
                    LocationScore::new("B".to_string(), 90),
                    "2025-12-24",
                    "s",
                    ts(),
                ),
            ],
        };
        let counts = snapshot.tier_counts();

        assert_eq!(counts.len(), 4);
        assert_eq!(counts[&RiskLevel::Low], 1);
        assert_eq!(counts[&RiskLevel::Moderate], 0);
        assert_eq!(counts[&RiskLevel::High], 0);
        assert_eq!(counts[&RiskLevel::Severe], 1);
        assert_eq!(snapshot.record("B").map(|r| r.score), Some(90));
        assert!(snapshot.record("C").is_none());
    }
}
