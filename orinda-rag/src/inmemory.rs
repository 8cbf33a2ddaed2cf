//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `Vec` protected by a `tokio::sync::RwLock`. It is suitable for tests and
//! ephemeral sessions that do not need to survive a restart.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{SearchResult, VectorRecord};
use crate::error::Result;
use crate::vectorstore::{VectorStore, rank};

/// An in-memory vector store using cosine similarity for search.
///
/// Records are kept in insertion order. All operations are async-safe via
/// `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use orinda_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.add(records).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &str {
        "InMemory"
    }

    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        self.records.write().await.extend(records);
        Ok(())
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let records = self.records.read().await;
        Ok(rank(records.iter(), embedding, top_k))
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| !ids.contains(record.id.as_str()));
        Ok(before - records.len())
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| record.chunk.source() != source);
        Ok(before - records.len())
    }

    async fn ids(&self) -> Result<Vec<String>> {
        Ok(self.records.read().await.iter().map(|record| record.id.clone()).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}
