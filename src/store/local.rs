use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::{DocPath, Document, DocumentStore, merge_fields};

/// Filesystem document store: `<root>/<doc path>.json`, one file per document.
///
/// A batch is staged as `.tmp` files and renamed into place once every file
/// has been written, so a failed write publishes nothing. Renames are not
/// atomic as a group: if one fails, the documents renamed before it stay
/// published and the remaining `.tmp` files are removed.
pub struct LocalStore {
    root: PathBuf,
    max_batch_writes: usize,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, max_batch_writes: usize) -> Self {
        Self {
            root: root.into(),
            max_batch_writes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, path: &DocPath) -> PathBuf {
        self.root.join(format!("{}.json", path.as_str()))
    }

    async fn read_doc(file: &Path) -> Result<Option<Document>> {
        match fs::read(file).await {
            Ok(bytes) => {
                let doc = serde_json::from_slice(&bytes)
                    .with_context(|| format!("invalid JSON document at {}", file.display()))?;
                Ok(Some(doc))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", file.display())),
        }
    }

    async fn write_file(file: &Path, doc: &Document) -> Result<()> {
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(file, serde_json::to_vec_pretty(doc)?)
            .await
            .with_context(|| format!("failed to write {}", file.display()))
    }
}

fn tmp_file(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[async_trait::async_trait]
impl DocumentStore for LocalStore {
    async fn merge(&self, path: &DocPath, fields: Document) -> Result<()> {
        let file = self.file_for(path);
        let existing = Self::read_doc(&file).await?.unwrap_or_default();
        let merged = merge_fields(existing, fields);

        let tmp = tmp_file(&file);
        Self::write_file(&tmp, &merged).await?;
        fs::rename(&tmp, &file).await?;

        debug!(path = %path, file = %file.display(), "Merged document");
        Ok(())
    }

    async fn commit(&self, writes: Vec<(DocPath, Document)>) -> Result<()> {
        anyhow::ensure!(
            writes.len() <= self.max_batch_writes,
            "batch of {} writes exceeds limit of {}",
            writes.len(),
            self.max_batch_writes
        );

        let mut staged = Vec::with_capacity(writes.len());
        for (path, doc) in &writes {
            let file = self.file_for(path);
            let tmp = tmp_file(&file);
            if let Err(e) = Self::write_file(&tmp, doc).await {
                for (_, staged_tmp) in &staged {
                    let _ = fs::remove_file(staged_tmp).await;
                }
                let _ = fs::remove_file(&tmp).await;
                return Err(e);
            }
            staged.push((file, tmp));
        }

        for (i, (file, tmp)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, file).await {
                for (_, pending) in &staged[i..] {
                    let _ = fs::remove_file(pending).await;
                }
                warn!(published = i, total = staged.len(), file = %file.display(), "Batch publish failed part-way");
                return Err(e).with_context(|| format!("failed to publish {}", file.display()));
            }
        }

        debug!(size = writes.len(), root = %self.root.display(), "Committed batch");
        Ok(())
    }

    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        Self::read_doc(&self.file_for(path)).await
    }

    async fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>> {
        let dir = self.root.join(collection.as_str());
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("failed to list {}", dir.display())),
        };

        let mut docs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if !entry.file_type().await?.is_file() {
                continue;
            }

            match Self::read_doc(&entry.path()).await {
                Ok(Some(doc)) => {
                    docs.push((DocPath(format!("{}/{}", collection.as_str(), stem)), doc));
                }
                Ok(None) => {}
                Err(e) => warn!(file = %entry.path().display(), error = %e, "Skipping unreadable document"),
            }
        }

        docs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(docs)
    }

    fn max_batch_writes(&self) -> usize {
        self.max_batch_writes
    }
}
