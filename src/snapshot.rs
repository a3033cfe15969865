//! Read side of a published daily snapshot.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

use crate::pipeline::types::{DailySnapshot, LocationRecord, SnapshotMeta};
use crate::store::{DocPath, DocumentStore};

/// Loads the partition metadata and every location record for `date`.
///
/// A date that was never ingested yields an empty snapshot, not an error.
/// Documents that do not decode as [`LocationRecord`] are logged and skipped.
pub async fn load(store: &dyn DocumentStore, collection: &str, date: &str) -> Result<DailySnapshot> {
    let meta = match store.get(&DocPath::partition(collection, date)).await? {
        Some(doc) => Some(
            serde_json::from_value::<SnapshotMeta>(Value::Object(doc))
                .with_context(|| format!("invalid snapshot metadata for {date}"))?,
        ),
        None => None,
    };

    let mut records = Vec::new();
    for (path, doc) in store.list(&DocPath::locations(collection, date)).await? {
        match serde_json::from_value::<LocationRecord>(Value::Object(doc)) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path, error = %e, "Skipping undecodable location document"),
        }
    }
    records.sort_by(|a, b| a.location.cmp(&b.location));

    Ok(DailySnapshot {
        date: date.to_string(),
        meta,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::risk::RiskLevel;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn doc(value: Value) -> crate::store::Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_date_is_empty() {
        let store = MemoryStore::new();
        let snapshot = load(&store, "aq", "2025-12-24").await.unwrap();

        assert!(snapshot.meta.is_none());
        assert!(snapshot.records.is_empty());
    }

    #[tokio::test]
    async fn test_load_skips_bad_documents() {
        let store = MemoryStore::new();
        store
            .merge(
                &DocPath::partition("aq", "2025-12-24"),
                doc(json!({"source": "Sentinel-5P", "updatedAt": "2025-12-24T06:00:00Z", "note": "x"})),
            )
            .await
            .unwrap();
        store
            .commit(vec![
                (
                    DocPath::location("aq", "2025-12-24", "Pune"),
                    doc(json!({
                        "location": "Pune",
                        "score": 43,
                        "risk": "Moderate",
                        "date": "2025-12-24",
                        "source": "Sentinel-5P",
                        "updatedAt": "2025-12-24T06:00:00Z"
                    })),
                ),
                (
                    DocPath::location("aq", "2025-12-24", "Broken"),
                    doc(json!({"location": "Broken", "risk": "Purple"})),
                ),
            ])
            .await
            .unwrap();

        let snapshot = load(&store, "aq", "2025-12-24").await.unwrap();

        assert_eq!(snapshot.meta.unwrap().source, "Sentinel-5P");
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].risk, RiskLevel::Moderate);
    }
}
