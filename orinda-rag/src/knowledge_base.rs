//! The knowledge base: a vector store collection bound to an embedding provider.
//!
//! [`KnowledgeBase`] is shared (`Arc<KnowledgeBase>`) between the ingestion
//! and query pipelines. Every read and write of the underlying store goes
//! through a single `tokio::sync::RwLock`, so a query never sees a store in
//! the middle of an ingestion write.
//!
//! Opening the store can fail, for instance when the embedding backend is not
//! running. The knowledge base then stays usable but
//! [`Disabled`](StoreStatus::Disabled): reads fail with
//! [`RagError::NotInitialized`] and the next [`add`](KnowledgeBase::add)
//! tries to open the store again.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RagConfig;
use crate::document::{Chunk, SearchResult, VectorRecord};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::inmemory::InMemoryVectorStore;
use crate::persistent::PersistentVectorStore;
use crate::vectorstore::VectorStore;

/// Opens (or creates) the backing store on demand.
pub type StoreOpener = Arc<dyn Fn() -> Result<Arc<dyn VectorStore>> + Send + Sync>;

const PROBE_TEXT: &str = "initialization probe";

enum StoreState {
    Ready(Arc<dyn VectorStore>),
    Disabled { reason: String },
}

/// Availability of the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
    /// The store is open and holds `records` vector records.
    Ready { records: usize },
    /// The store could not be opened.
    Disabled { reason: String },
}

/// A single named collection of embedded chunks.
pub struct KnowledgeBase {
    collection_name: String,
    embedder: Arc<dyn EmbeddingProvider>,
    opener: StoreOpener,
    batch_size: usize,
    state: RwLock<StoreState>,
}

impl KnowledgeBase {
    /// Probe the embedding backend and open the store.
    ///
    /// Never fails: if either step does, the knowledge base starts disabled
    /// with the failure recorded as the reason.
    pub async fn initialize(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        opener: StoreOpener,
    ) -> Self {
        let state = match Self::open_store(embedder.as_ref(), &opener).await {
            Ok(store) => {
                match store.count().await {
                    Ok(records) => info!(
                        collection = %config.collection_name,
                        backend = store.backend(),
                        "vector database initialized with {records} records"
                    ),
                    Err(e) => warn!(
                        collection = %config.collection_name,
                        error = %e,
                        "could not count records"
                    ),
                }
                StoreState::Ready(store)
            }
            Err(e) => {
                error!(
                    collection = %config.collection_name,
                    error = %e,
                    "vector database disabled"
                );
                StoreState::Disabled { reason: e.to_string() }
            }
        };

        Self {
            collection_name: config.collection_name.clone(),
            embedder,
            opener,
            batch_size: config.embed_batch_size.max(1),
            state: RwLock::new(state),
        }
    }

    /// Initialize against the redb collection file named by `config`.
    pub async fn open_persistent(config: &RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let path = config.collection_path();
        let opener: StoreOpener = Arc::new(move || {
            let store: Arc<dyn VectorStore> = Arc::new(PersistentVectorStore::open(&path)?);
            Ok(store)
        });
        Self::initialize(config, embedder, opener).await
    }

    /// Initialize against a fresh in-memory store.
    pub async fn in_memory(config: &RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let opener: StoreOpener = Arc::new(|| {
            let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
            Ok(store)
        });
        Self::initialize(config, embedder, opener).await
    }

    async fn open_store(
        embedder: &dyn EmbeddingProvider,
        opener: &StoreOpener,
    ) -> Result<Arc<dyn VectorStore>> {
        let probe = embedder.embed(PROBE_TEXT).await?;
        debug!(provider = embedder.name(), dimensions = probe.len(), "embedding backend reachable");
        opener()
    }

    /// Name of the collection.
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// The embedding provider used for chunks and queries.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Current availability and record count.
    pub async fn status(&self) -> Result<StoreStatus> {
        let state = self.state.read().await;
        match &*state {
            StoreState::Ready(store) => Ok(StoreStatus::Ready { records: store.count().await? }),
            StoreState::Disabled { reason } => Ok(StoreStatus::Disabled { reason: reason.clone() }),
        }
    }

    /// Whether the store is open.
    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.read().await, StoreState::Ready(_))
    }

    fn ready(state: &StoreState) -> Result<&Arc<dyn VectorStore>> {
        match state {
            StoreState::Ready(store) => Ok(store),
            StoreState::Disabled { reason } => {
                Err(RagError::NotInitialized { reason: reason.clone() })
            }
        }
    }

    /// Fail fast with [`RagError::NotInitialized`] when the store is disabled.
    pub async fn ensure_ready(&self) -> Result<()> {
        let state = self.state.read().await;
        Self::ready(&state).map(|_| ())
    }

    /// Embed `chunks` and append them to the store as one atomic write.
    ///
    /// Chunks are embedded in batches of `embed_batch_size`; `on_batch(n, total)`
    /// is called before each batch and `cancel` is checked between batches.
    /// A disabled store is reopened first. Returns the new record ids.
    pub async fn add(
        &self,
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
        mut on_batch: impl FnMut(usize, usize) + Send,
    ) -> Result<Vec<String>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        self.reopen_if_disabled().await?;

        let total_batches = chunks.len().div_ceil(self.batch_size);
        let mut embeddings = Vec::with_capacity(chunks.len());
        for (index, batch) in chunks.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(RagError::Cancelled { operation: "ingestion" });
            }
            on_batch(index + 1, total_batches);

            let texts: Vec<&str> = batch.iter().map(|chunk| chunk.text.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts).await.map_err(|e| {
                error!(
                    collection = %self.collection_name,
                    batch = index + 1,
                    error = %e,
                    "embedding failed"
                );
                e
            })?;
            if vectors.len() != batch.len() {
                return Err(RagError::Embedding {
                    provider: self.embedder.name().to_string(),
                    message: format!("expected {} embeddings, got {}", batch.len(), vectors.len()),
                });
            }
            embeddings.extend(vectors);
        }
        if cancel.is_cancelled() {
            return Err(RagError::Cancelled { operation: "ingestion" });
        }

        let records: Vec<VectorRecord> =
            chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| VectorRecord::new(chunk, embedding))
                .collect();
        let ids: Vec<String> = records.iter().map(|record| record.id.clone()).collect();

        let state = self.state.write().await;
        let store = Self::ready(&state)?;
        store.add(records).await.map_err(|e| {
            error!(collection = %self.collection_name, error = %e, "failed to store records");
            e
        })?;

        debug!(collection = %self.collection_name, added = ids.len(), "added records");
        Ok(ids)
    }

    async fn reopen_if_disabled(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if let StoreState::Disabled { reason } = &*state {
            info!(
                collection = %self.collection_name,
                previous = %reason,
                "retrying vector database"
            );
            let store = (self.opener)().map_err(|e| {
                error!(
                    collection = %self.collection_name,
                    error = %e,
                    "vector database still unavailable"
                );
                e
            })?;
            *state = StoreState::Ready(store);
        }
        Ok(())
    }

    /// Return the `k` records nearest to `query`, best first.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.ensure_ready().await?;

        let embedding = self.embedder.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;

        let state = self.state.read().await;
        let results = Self::ready(&state)?.search(&embedding, k).await?;
        debug!(
            collection = %self.collection_name,
            k,
            result_count = results.len(),
            "similarity search"
        );
        Ok(results)
    }

    /// Flush the store. Backends that commit on every write do nothing here.
    pub async fn persist(&self) -> Result<()> {
        let state = self.state.read().await;
        Self::ready(&state)?.persist().await
    }

    /// All record ids, in insertion order.
    pub async fn ids(&self) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Self::ready(&state)?.ids().await
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize> {
        let state = self.state.read().await;
        Self::ready(&state)?.count().await
    }

    /// Delete records by id.
    pub async fn clear(&self, ids: &[String]) -> Result<usize> {
        let state = self.state.write().await;
        let removed = Self::ready(&state)?.delete(ids).await?;
        info!(collection = %self.collection_name, removed, "cleared records");
        Ok(removed)
    }

    /// Delete every record. A disabled store has nothing to clear.
    pub async fn clear_all(&self) -> Result<usize> {
        let state = self.state.write().await;
        let StoreState::Ready(store) = &*state else {
            return Ok(0);
        };
        let ids = store.ids().await?;
        let removed = store.delete(&ids).await?;
        info!(collection = %self.collection_name, removed, "cleared collection");
        Ok(removed)
    }

    /// Delete every record that came from the file named `source`.
    pub async fn remove_source(&self, source: &str) -> Result<usize> {
        let state = self.state.write().await;
        let removed = Self::ready(&state)?.delete_by_source(source).await?;
        info!(collection = %self.collection_name, source, removed, "removed source");
        Ok(removed)
    }
}
