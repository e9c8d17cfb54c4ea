//! Side-store for per-document ingest metadata.
//!
//! File uploads carry form fields (author, timestamp, groups) that are kept
//! next to the vector index, keyed by source and document id.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{RagError, Result};

/// Source name used for records that do not carry one.
pub const DEFAULT_SOURCE: &str = "default";

/// Metadata recorded for one ingested file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataRecord {
    /// The document id.
    pub id: String,
    /// Source collection the record belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Author of the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// When the file content was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Identifier inside the source system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Group tags.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl MetadataRecord {
    /// The source this record is filed under.
    pub fn source_or_default(&self) -> &str {
        self.source.as_deref().unwrap_or(DEFAULT_SOURCE)
    }
}

/// A key-value store for [`MetadataRecord`]s keyed by `(source, id)`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert or fully replace the record for `(record.source, record.id)`.
    async fn replace(&self, record: MetadataRecord) -> Result<()>;

    /// Remove the record for `(source, id)`. Returns whether one existed.
    ///
    /// `None` selects the default source.
    async fn remove(&self, source: Option<&str>, id: &str) -> Result<bool>;

    /// Remove the records for `id` under every source. Returns how many existed.
    async fn remove_all_sources(&self, id: &str) -> Result<usize>;

    /// Remove every record. Returns how many existed.
    async fn clear(&self) -> Result<usize>;

    /// Fetch the record for `(source, id)`.
    async fn get(&self, source: Option<&str>, id: &str) -> Result<Option<MetadataRecord>>;
}

/// An in-memory [`MetadataStore`].
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<(String, String), MetadataRecord>>,
}

impl InMemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(source: Option<&str>, id: &str) -> (String, String) {
        (source.unwrap_or(DEFAULT_SOURCE).to_string(), id.to_string())
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn replace(&self, record: MetadataRecord) -> Result<()> {
        if record.id.trim().is_empty() {
            return Err(RagError::MetadataStoreError("record id must not be blank".into()));
        }
        let key = Self::key(Some(record.source_or_default()), &record.id);
        debug!(source = %key.0, document.id = %key.1, "replacing metadata record");
        self.records.write().await.insert(key, record);
        Ok(())
    }

    async fn remove(&self, source: Option<&str>, id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(&Self::key(source, id)).is_some())
    }

    async fn remove_all_sources(&self, id: &str) -> Result<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|(_, record_id), _| record_id != id);
        Ok(before - records.len())
    }

    async fn clear(&self) -> Result<usize> {
        let mut records = self.records.write().await;
        let removed = records.len();
        records.clear();
        Ok(removed)
    }

    async fn get(&self, source: Option<&str>, id: &str) -> Result<Option<MetadataRecord>> {
        Ok(self.records.read().await.get(&Self::key(source, id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_without_source_use_default() {
        let store = InMemoryMetadataStore::new();
        store.replace(MetadataRecord { id: "doc1".into(), ..Default::default() }).await.unwrap();

        assert!(store.get(Some(DEFAULT_SOURCE), "doc1").await.unwrap().is_some());
        assert!(store.get(Some("email"), "doc1").await.unwrap().is_none());
        assert!(store.remove(None, "doc1").await.unwrap());
        assert!(!store.remove(None, "doc1").await.unwrap());
    }

    #[tokio::test]
    async fn replace_overwrites_whole_record() {
        let store = InMemoryMetadataStore::new();
        let record = MetadataRecord {
            id: "doc1".into(),
            source: Some("email".into()),
            author: Some("ada".into()),
            groups: vec!["a".into()],
            ..Default::default()
        };
        store.replace(record.clone()).await.unwrap();
        store
            .replace(MetadataRecord { author: None, groups: Vec::new(), ..record })
            .await
            .unwrap();

        let stored = store.get(Some("email"), "doc1").await.unwrap().unwrap();
        assert_eq!(stored.author, None);
        assert!(stored.groups.is_empty());
    }

    #[tokio::test]
    async fn removes_across_sources_and_clears() {
        let store = InMemoryMetadataStore::new();
        for source in [Some("email"), Some("file"), None] {
            let record = MetadataRecord {
                id: "doc1".into(),
                source: source.map(String::from),
                ..Default::default()
            };
            store.replace(record).await.unwrap();
        }
        store.replace(MetadataRecord { id: "doc2".into(), ..Default::default() }).await.unwrap();

        assert_eq!(store.remove_all_sources("doc1").await.unwrap(), 3);
        assert!(store.get(Some("email"), "doc1").await.unwrap().is_none());
        assert!(store.get(None, "doc2").await.unwrap().is_some());

        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.get(None, "doc2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_blank_record_id() {
        let store = InMemoryMetadataStore::new();
        let err = store.replace(MetadataRecord { id: " ".into(), ..Default::default() }).await;
        assert!(matches!(err, Err(RagError::MetadataStoreError(_))));
    }
}
