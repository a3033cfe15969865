//! Keyed JSON document storage.
//!
//! [`DocumentStore`] is the async trait the pipeline writes through and the
//! snapshot reader reads from. [`MemoryStore`] keeps documents in process,
//! [`LocalStore`] writes one JSON file per document and [`S3Store`] one S3
//! object per document.

mod local;
mod memory;
mod s3;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use s3::{S3Store, preflight_credentials};

use anyhow::Result;
use serde_json::{Map, Value};
use std::fmt;

/// A JSON object stored at a [`DocPath`].
pub type Document = Map<String, Value>;

/// Write limit of common document databases for a single batch.
pub const DEFAULT_MAX_BATCH_WRITES: usize = 500;

/// Slash-separated address of a document or collection.
///
/// Segments are escaped on the way in, so a segment containing `/` stays a
/// single segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath(String);

impl DocPath {
    pub fn root(segment: &str) -> Self {
        Self(escape_segment(segment))
    }

    /// Appends one path segment.
    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}/{}", self.0, escape_segment(segment)))
    }

    /// Date-level partition document: `<collection>/<date>`.
    pub fn partition(collection: &str, date: &str) -> Self {
        Self::root(collection).child(date)
    }

    /// Collection holding a partition's per-location documents.
    pub fn locations(collection: &str, date: &str) -> Self {
        Self::partition(collection, date).child("locations")
    }

    /// Per-location document: `<collection>/<date>/locations/<location>`.
    pub fn location(collection: &str, date: &str, location: &str) -> Self {
        Self::locations(collection, date).child(location)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this path is a direct child of `collection`.
    pub fn is_child_of(&self, collection: &DocPath) -> bool {
        self.0
            .strip_prefix(collection.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace('/', "%2F")
}

/// A keyed document database with merge-writes and batched full replaces.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates the document or overwrites only the given top-level fields.
    async fn merge(&self, path: &DocPath, fields: Document) -> Result<()>;

    /// Applies a batch of full-replace writes.
    async fn commit(&self, writes: Vec<(DocPath, Document)>) -> Result<()>;

    async fn get(&self, path: &DocPath) -> Result<Option<Document>>;

    /// Returns every document directly under `collection`.
    async fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>>;

    /// Largest batch [`DocumentStore::commit`] accepts.
    fn max_batch_writes(&self) -> usize {
        DEFAULT_MAX_BATCH_WRITES
    }
}

/// Overlays `fields` onto `existing`, keeping keys `fields` does not mention.
pub(crate) fn merge_fields(mut existing: Document, fields: Document) -> Document {
    existing.extend(fields);
    existing
}
