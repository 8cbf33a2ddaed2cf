//! Retrieval-augmented question answering.
//!
//! A query runs through three checkpoints, always in this order:
//!
//! 1. [`QueryStage::Searching`]: embed the query and fetch the nearest chunks
//! 2. [`QueryStage::Generating`]: filter them with a [`RelevancePolicy`],
//!    build the prompt and call the chat model
//! 3. [`QueryStage::Completed`]
//!
//! When no chunk is relevant the model is still called, with
//! [`NO_CONTEXT`] in place of the context so it can say it does not know.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::RagConfig;
use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::knowledge_base::KnowledgeBase;
use crate::llm::ChatModel;

/// Context text used when retrieval finds nothing.
pub const NO_CONTEXT: &str = "No relevant information found in the knowledge base.";

const INSTRUCTIONS: &str = "Based ONLY on the information provided in the context above, please answer the user's query. If the context doesn't contain relevant information to answer the query, state that clearly. Include references to the source documents where appropriate.";

/// Decides which retrieved chunks make it into the prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevancePolicy {
    /// Results must score strictly above this.
    pub threshold: f32,
    /// When nothing clears the threshold, keep this many of the best raw results.
    pub fallback_top_n: usize,
}

impl Default for RelevancePolicy {
    fn default() -> Self {
        Self { threshold: 0.70, fallback_top_n: 2 }
    }
}

impl RelevancePolicy {
    /// The policy described by `config`.
    pub fn from_config(config: &RagConfig) -> Self {
        Self { threshold: config.relevance_threshold, fallback_top_n: config.fallback_top_n }
    }

    /// Filter `results` (best first), returning the kept results and whether
    /// the fallback was used.
    pub fn select(&self, results: Vec<SearchResult>) -> (Vec<SearchResult>, bool) {
        let relevant: Vec<SearchResult> =
            results.iter().filter(|r| r.score > self.threshold).cloned().collect();
        if !relevant.is_empty() || results.is_empty() {
            return (relevant, false);
        }
        (results.into_iter().take(self.fallback_top_n).collect(), true)
    }
}

/// Render results as prompt context, or [`NO_CONTEXT`] when there are none.
///
/// Each entry reads `[Source: <file>, Relevance: <pct>%]` followed by the chunk
/// text; the percentage is truncated, not rounded.
pub fn format_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return NO_CONTEXT.to_string();
    }
    results
        .iter()
        .map(|result| {
            let percent = (result.score * 100.0) as u32;
            format!(
                "[Source: {}, Relevance: {percent}%]\n{}",
                result.record.chunk.source(),
                result.record.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Assemble the prompt sent to the chat model.
pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "### Context from Knowledge Base:\n\n{context}\n\n### User Query:\n{query}\n\n### Instructions:\n{INSTRUCTIONS}"
    )
}

/// Reject empty or whitespace-only queries.
pub fn validate_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(RagError::EmptyQuery);
    }
    Ok(())
}

/// Progress checkpoints of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Searching,
    Generating,
    Completed,
}

impl QueryStage {
    /// Completed fraction of the query, for progress displays.
    pub fn progress(self) -> f32 {
        match self {
            Self::Searching => 0.3,
            Self::Generating => 0.6,
            Self::Completed => 1.0,
        }
    }
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Searching => "Finding similar documents",
            Self::Generating => "Generating response",
            Self::Completed => "Completed",
        };
        f.write_str(label)
    }
}

/// The outcome of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    /// The model's response text.
    pub response: String,
    /// The context block that was sent to the model.
    pub context: String,
    /// Whether the context came from the below-threshold fallback.
    pub used_fallback: bool,
}

/// Answers questions from the knowledge base with a chat model.
pub struct QueryPipeline {
    knowledge_base: Arc<KnowledgeBase>,
    chat: Arc<dyn ChatModel>,
    top_k: usize,
    policy: RelevancePolicy,
}

impl QueryPipeline {
    /// Create a pipeline using `config` for `top_k` and the relevance policy.
    pub fn new(
        knowledge_base: Arc<KnowledgeBase>,
        chat: Arc<dyn ChatModel>,
        config: &RagConfig,
    ) -> Self {
        Self {
            knowledge_base,
            chat,
            top_k: config.top_k,
            policy: RelevancePolicy::from_config(config),
        }
    }

    /// Replace the relevance policy.
    pub fn with_policy(mut self, policy: RelevancePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The relevance policy in use.
    pub fn policy(&self) -> RelevancePolicy {
        self.policy
    }

    /// Answer `query` with `model`, reporting each [`QueryStage`] to `on_stage`.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyQuery`] for a blank query
    /// - [`RagError::NotInitialized`] if the knowledge base is disabled
    /// - [`RagError::Embedding`] or [`RagError::VectorStore`] if retrieval fails
    /// - [`RagError::Model`] if the chat call fails
    /// - [`RagError::Cancelled`] if `cancel` fires first
    pub async fn answer(
        &self,
        query: &str,
        model: &str,
        cancel: &CancellationToken,
        mut on_stage: impl FnMut(QueryStage) + Send,
    ) -> Result<RagAnswer> {
        validate_query(query)?;
        self.knowledge_base.ensure_ready().await?;

        on_stage(QueryStage::Searching);
        let results = tokio::select! {
            _ = cancel.cancelled() => return Err(RagError::Cancelled { operation: "query" }),
            results = self.knowledge_base.similarity_search(query, self.top_k) => results?,
        };
        let retrieved = results.len();
        let (selected, used_fallback) = self.policy.select(results);
        info!(retrieved, selected = selected.len(), used_fallback, "retrieved context");

        on_stage(QueryStage::Generating);
        let context = format_context(&selected);
        let prompt = build_prompt(&context, query);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(RagError::Cancelled { operation: "query" }),
            response = self.chat.chat(model, &prompt) => response.map_err(|e| {
                error!(model, error = %e, "model call failed");
                e
            })?,
        };

        on_stage(QueryStage::Completed);
        Ok(RagAnswer { response, context, used_fallback })
    }
}
