//! Text embedding backends.

use async_trait::async_trait;

use crate::error::Result;

/// Turns text into vectors for similarity search.
///
/// Chunks and queries must go through the same provider: vectors from
/// different models are not comparable. [`OllamaClient`](crate::OllamaClient)
/// is the production implementation and overrides
/// [`embed_batch`](EmbeddingProvider::embed_batch) with a single request.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Backend and model, for errors and logs (for example `Ollama/nomic-embed-text`).
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, returning one vector per input in input order.
    ///
    /// Falls back to one [`embed`](EmbeddingProvider::embed) call per text.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}
