//! Vector store trait for storing and searching vector records.

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::document::{SearchResult, VectorRecord};
use crate::error::Result;

/// A storage backend for one collection of [`VectorRecord`]s with similarity search.
///
/// Records keep their insertion order, which is used to break score ties in
/// [`search`](VectorStore::search).
///
/// # Example
///
/// ```rust,ignore
/// use orinda_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.add(records).await?;
/// let results = store.search(&query_embedding, 3).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// A short backend name used in errors and logs.
    fn backend(&self) -> &str;

    /// Append records. Either every record is stored or none is.
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Return the `top_k` most similar records to `embedding`.
    ///
    /// Results are ordered by descending score; equal scores keep insertion order.
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// Delete records by id, returning how many were removed. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Delete every record whose chunk came from `source`, returning how many were removed.
    async fn delete_by_source(&self, source: &str) -> Result<usize>;

    /// All record ids in insertion order.
    async fn ids(&self) -> Result<Vec<String>>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize>;

    /// Flush pending writes. Backends that commit on every write need not override this.
    async fn persist(&self) -> Result<()> {
        Ok(())
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Relevance score in `[0, 1]`: cosine similarity with opposing directions clamped to zero.
pub fn relevance_score(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b).clamp(0.0, 1.0)
}

/// Score `records` against `query` and keep the best `top_k`.
///
/// `records` must be given in insertion order; the sort is stable so ties keep it.
pub(crate) fn rank<'a>(
    records: impl IntoIterator<Item = &'a VectorRecord>,
    query: &[f32],
    top_k: usize,
) -> Vec<SearchResult> {
    let mut scored: Vec<SearchResult> = records
        .into_iter()
        .map(|record| SearchResult {
            score: relevance_score(&record.embedding, query),
            record: record.clone(),
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    scored
}
