use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::pipeline::types::LocationRecord;
use crate::store::{DocPath, Document};

/// Records staged by one run, keyed by location.
///
/// Staging a location twice replaces the earlier record, so the batch holds at
/// most one write per `(date, location)` key.
#[derive(Debug, Default)]
pub struct PendingBatch {
    records: BTreeMap<String, LocationRecord>,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a record, returning the one it replaced, if any.
    pub fn stage(&mut self, record: LocationRecord) -> Option<LocationRecord> {
        self.records.insert(record.location.clone(), record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, location: &str) -> Option<&LocationRecord> {
        self.records.get(location)
    }

    pub fn records(&self) -> impl Iterator<Item = &LocationRecord> {
        self.records.values()
    }

    /// Converts the batch into store writes under `collection`, split into
    /// chunks of at most `limit` writes.
    pub fn into_chunks(
        self,
        collection: &str,
        limit: usize,
    ) -> Result<Vec<Vec<(DocPath, Document)>>> {
        let limit = limit.max(1);
        let mut chunks = Vec::with_capacity(self.records.len().div_ceil(limit));
        let mut current = Vec::with_capacity(limit.min(self.records.len()));

        for record in self.records.into_values() {
            let path = DocPath::location(collection, &record.date, &record.location);
            let Value::Object(doc) = serde_json::to_value(&record)? else {
                anyhow::bail!("location record did not serialize to an object");
            };
            current.push((path, doc));

            if current.len() == limit {
                chunks.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        Ok(chunks)
    }
}
