use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use super::{DEFAULT_MAX_BATCH_WRITES, DocPath, Document, DocumentStore, merge_fields};

/// In-process document store, used by tests and `AQ_STORE=memory` dry runs.
///
/// Batches are applied all-or-nothing. Commits can be made to fail on demand,
/// from the first or from the n-th, to exercise partial-failure windows.
pub struct MemoryStore {
    docs: Mutex<BTreeMap<DocPath, Document>>,
    max_batch_writes: usize,
    /// Number of successful commits after which every commit fails.
    fail_after: AtomicUsize,
    commits: Mutex<Vec<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_batch_limit(DEFAULT_MAX_BATCH_WRITES)
    }

    pub fn with_batch_limit(max_batch_writes: usize) -> Self {
        Self {
            docs: Mutex::new(BTreeMap::new()),
            max_batch_writes,
            fail_after: AtomicUsize::new(usize::MAX),
            commits: Mutex::new(Vec::new()),
        }
    }

    /// Makes every subsequent [`DocumentStore::commit`] fail without writing.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits_after(if fail { 0 } else { usize::MAX });
    }

    /// Fails every commit once `n` commits have succeeded in total.
    pub fn fail_commits_after(&self, n: usize) {
        self.fail_after.store(n, Ordering::SeqCst);
    }

    /// Sizes of the batches committed so far, in order.
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.commits.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn merge(&self, path: &DocPath, fields: Document) -> Result<()> {
        let mut docs = self.docs.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        let existing = docs.remove(path).unwrap_or_default();
        docs.insert(path.clone(), merge_fields(existing, fields));
        debug!(path = %path, "Merged document");
        Ok(())
    }

    async fn commit(&self, writes: Vec<(DocPath, Document)>) -> Result<()> {
        let committed = self
            .commits
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))?
            .len();
        if committed >= self.fail_after.load(Ordering::SeqCst) {
            return Err(anyhow!("memory store rejected batch of {} writes", writes.len()));
        }
        if writes.len() > self.max_batch_writes {
            return Err(anyhow!(
                "batch of {} writes exceeds limit of {}",
                writes.len(),
                self.max_batch_writes
            ));
        }

        let size = writes.len();
        let mut docs = self.docs.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        docs.extend(writes);
        drop(docs);

        self.commits
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))?
            .push(size);
        debug!(size, "Committed batch");
        Ok(())
    }

    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        let docs = self.docs.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(docs.get(path).cloned())
    }

    async fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>> {
        let docs = self.docs.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(docs
            .iter()
            .filter(|(path, _)| path.is_child_of(collection))
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect())
    }

    fn max_batch_writes(&self) -> usize {
        self.max_batch_writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_commit_replaces_whole_document() {
        let store = MemoryStore::new();
        let path = DocPath::location("aq", "2025-12-24", "Pune");

        store
            .commit(vec![(path.clone(), doc(json!({"score": 40, "extra": true})))])
            .await
            .unwrap();
        store
            .commit(vec![(path.clone(), doc(json!({"score": 43})))])
            .await
            .unwrap();

        let stored = store.get(&path).await.unwrap().unwrap();
        assert_eq!(stored["score"], 43);
        assert!(stored.get("extra").is_none());
        assert_eq!(store.commit_sizes(), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_failed_commit_writes_nothing() {
        let store = MemoryStore::new();
        store.fail_commits(true);

        let result = store
            .commit(vec![(DocPath::root("a"), doc(json!({"x": 1})))])
            .await;

        assert!(result.is_err());
        assert!(store.is_empty());
        assert!(store.commit_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_fail_commits_after_n() {
        let store = MemoryStore::new();
        store.fail_commits_after(1);

        store
            .commit(vec![(DocPath::root("a"), doc(json!({"x": 1})))])
            .await
            .unwrap();
        let second = store
            .commit(vec![(DocPath::root("b"), doc(json!({"x": 2})))])
            .await;

        assert!(second.is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.commit_sizes(), vec![1]);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let store = MemoryStore::with_batch_limit(1);
        let writes = vec![
            (DocPath::root("a"), doc(json!({}))),
            (DocPath::root("b"), doc(json!({}))),
        ];

        assert!(store.commit(writes).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_returns_direct_children() {
        let store = MemoryStore::new();
        store
            .merge(&DocPath::partition("aq", "2025-12-24"), doc(json!({"source": "s"})))
            .await
            .unwrap();
        store
            .commit(vec![
                (DocPath::location("aq", "2025-12-24", "A"), doc(json!({"n": 1}))),
                (DocPath::location("aq", "2025-12-24", "B"), doc(json!({"n": 2}))),
                (DocPath::location("aq", "2025-12-25", "A"), doc(json!({"n": 3}))),
            ])
            .await
            .unwrap();

        let listed = store.list(&DocPath::locations("aq", "2025-12-24")).await.unwrap();
        assert_eq!(listed.len(), 2);
    }
}
