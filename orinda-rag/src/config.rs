//! Configuration for the ingestion and query pipelines.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Default name of the single active collection.
pub const DEFAULT_COLLECTION_NAME: &str = "orinda_rag_collection";

/// Default directory the collection is persisted under.
pub const DEFAULT_PERSIST_DIR: &str = "./orinda_chroma_db";

/// Default embedding model served by Ollama.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Configuration parameters for the RAG pipelines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Name of the collection inside the persistence directory.
    pub collection_name: String,
    /// Directory holding the persisted collection.
    pub persist_dir: PathBuf,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of nearest records fetched per query.
    pub top_k: usize,
    /// Results must score strictly above this to count as relevant.
    pub relevance_threshold: f32,
    /// Number of raw results kept when nothing clears the threshold.
    pub fallback_top_n: usize,
    /// Maximum number of texts sent to the embedding backend per request.
    pub embed_batch_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            persist_dir: PathBuf::from(DEFAULT_PERSIST_DIR),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chunk_size: 1000,
            chunk_overlap: 150,
            top_k: 3,
            relevance_threshold: 0.70,
            fallback_top_n: 2,
            embed_batch_size: 32,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a config from defaults overlaid with environment variables.
    ///
    /// Recognized variables: `ORINDA_PERSIST_DIR`, `ORINDA_COLLECTION`,
    /// `ORINDA_EMBEDDING_MODEL`.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();
        if let Ok(dir) = std::env::var("ORINDA_PERSIST_DIR") {
            builder = builder.persist_dir(dir);
        }
        if let Ok(name) = std::env::var("ORINDA_COLLECTION") {
            builder = builder.collection_name(name);
        }
        if let Ok(model) = std::env::var("ORINDA_EMBEDDING_MODEL") {
            builder = builder.embedding_model(model);
        }
        builder.build()
    }

    /// Path of the collection file inside the persistence directory.
    pub fn collection_path(&self) -> PathBuf {
        self.persist_dir.join(format!("{}.redb", self.collection_name))
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Start from an existing config.
    pub fn from_config(config: RagConfig) -> Self {
        Self { config }
    }

    /// Set the collection name.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    /// Set the persistence directory.
    pub fn persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.persist_dir = dir.into();
        self
    }

    /// Set the embedding model identifier.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of nearest records fetched per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the relevance threshold.
    pub fn relevance_threshold(mut self, threshold: f32) -> Self {
        self.config.relevance_threshold = threshold;
        self
    }

    /// Set how many raw results are kept when nothing clears the threshold.
    pub fn fallback_top_n(mut self, n: usize) -> Self {
        self.config.fallback_top_n = n;
        self
    }

    /// Set the embedding request batch size.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0` or `embed_batch_size == 0`
    /// - `relevance_threshold` is outside `[0, 1]`
    /// - `collection_name` is empty
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if config.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if config.embed_batch_size == 0 {
            return Err(RagError::Config("embed_batch_size must be greater than zero".to_string()));
        }
        if !(0.0..=1.0).contains(&config.relevance_threshold) {
            return Err(RagError::Config(format!(
                "relevance_threshold ({}) must be within [0, 1]",
                config.relevance_threshold
            )));
        }
        if config.collection_name.trim().is_empty() {
            return Err(RagError::Config("collection_name must not be empty".to_string()));
        }
        Ok(config)
    }
}
