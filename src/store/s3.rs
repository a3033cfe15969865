use anyhow::{Context, Result};
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use super::{DocPath, Document, DocumentStore, merge_fields};
use crate::error::IngestError;

/// Resolves AWS credentials once, before the store is used.
///
/// `aws_config` always installs its default provider chain, so an absent
/// credential only shows up when the chain is asked for one.
pub async fn preflight_credentials(
    provider: Option<SharedCredentialsProvider>,
) -> std::result::Result<(), IngestError> {
    let provider = provider.ok_or_else(|| {
        IngestError::Config("no AWS credentials provider configured for S3 store".to_string())
    })?;

    provider
        .provide_credentials()
        .await
        .map_err(|e| IngestError::Config(format!("AWS credentials could not be resolved: {e}")))?;

    Ok(())
}

/// Stores each document as a JSON object at `<prefix><doc path>.json`.
///
/// S3 has no multi-object transaction: [`DocumentStore::commit`] puts objects
/// one by one, so a failure part-way leaves the earlier objects of the batch
/// written. Merge-writes are read-modify-write and assume a single writer.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    max_batch_writes: usize,
}

impl S3Store {
    pub fn new(
        client: aws_sdk_s3::Client,
        bucket: impl Into<String>,
        prefix: &str,
        max_batch_writes: usize,
    ) -> Self {
        let prefix = match prefix.trim_matches('/') {
            "" => String::new(),
            p => format!("{p}/"),
        };
        Self {
            client,
            bucket: bucket.into(),
            prefix,
            max_batch_writes,
        }
    }

    fn key_for(&self, path: &DocPath) -> String {
        format!("{}{}.json", self.prefix, path.as_str())
    }

    async fn put(&self, key: &str, doc: &Document) -> Result<()> {
        let body = serde_json::to_vec(doc)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .with_context(|| format!("S3 PutObject failed for '{key}'"))?;

        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Document>> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None);
            }
            Err(e) => return Err(e).with_context(|| format!("S3 GetObject failed for '{key}'")),
        };

        let bytes = resp
            .body
            .collect()
            .await
            .with_context(|| format!("failed to read S3 object body for '{key}'"))?
            .into_bytes();
        let doc = serde_json::from_slice(&bytes)
            .with_context(|| format!("S3 object '{key}' is not a JSON document"))?;
        Ok(Some(doc))
    }
}

#[async_trait::async_trait]
impl DocumentStore for S3Store {
    async fn merge(&self, path: &DocPath, fields: Document) -> Result<()> {
        let key = self.key_for(path);
        let existing = self.fetch(&key).await?.unwrap_or_default();
        self.put(&key, &merge_fields(existing, fields)).await?;
        debug!(bucket = %self.bucket, key = %key, "Merged document");
        Ok(())
    }

    async fn commit(&self, writes: Vec<(DocPath, Document)>) -> Result<()> {
        anyhow::ensure!(
            writes.len() <= self.max_batch_writes,
            "batch of {} writes exceeds limit of {}",
            writes.len(),
            self.max_batch_writes
        );

        for (path, doc) in &writes {
            self.put(&self.key_for(path), doc).await?;
        }

        info!(bucket = %self.bucket, upload_count = writes.len(), "S3 batch upload complete");
        Ok(())
    }

    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        self.fetch(&self.key_for(path)).await
    }

    async fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>> {
        let list_prefix = format!("{}{}/", self.prefix, collection.as_str());
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&list_prefix)
            .delimiter("/")
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.with_context(|| format!("S3 ListObjectsV2 failed for '{list_prefix}'"))?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let Some(stem) = key
                    .strip_prefix(&list_prefix)
                    .and_then(|rest| rest.strip_suffix(".json"))
                else {
                    continue;
                };
                if !stem.is_empty() && !stem.contains('/') {
                    keys.push((key.to_string(), stem.to_string()));
                }
            }
        }

        let mut docs = Vec::with_capacity(keys.len());
        for (key, stem) in keys {
            if let Some(doc) = self.fetch(&key).await? {
                docs.push((DocPath(format!("{}/{}", collection.as_str(), stem)), doc));
            }
        }
        Ok(docs)
    }

    fn max_batch_writes(&self) -> usize {
        self.max_batch_writes
    }
}
