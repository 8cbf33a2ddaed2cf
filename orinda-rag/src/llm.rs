//! Language-model chat trait used by the query pipeline.

use async_trait::async_trait;

use crate::error::Result;

/// A single-turn chat call against a named model.
///
/// The query pipeline sends one user message holding the full prompt and
/// expects the assistant's text back. Failures are reported as
/// [`RagError::Model`](crate::RagError::Model).
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `prompt` to `model` and return the response text.
    async fn chat(&self, model: &str, prompt: &str) -> Result<String>;
}
