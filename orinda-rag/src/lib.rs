//! # orinda-rag
//!
//! Document ingestion and retrieval-augmented question answering for the
//! Orinda assistant.
//!
//! ## Overview
//!
//! - [`loader`] reads PDF, Word, Excel and Markdown files into [`Document`]s
//! - [`RecursiveChunker`] splits them into overlapping [`Chunk`]s
//! - [`KnowledgeBase`] embeds chunks and keeps them in a [`VectorStore`]
//!   ([`PersistentVectorStore`] on disk, [`InMemoryVectorStore`] for tests)
//! - [`IngestPipeline`] and [`QueryPipeline`] drive the two workflows
//! - [`Session`] runs both in the background and reports [`SessionEvent`]s
//! - [`OllamaClient`] provides embeddings and chat over a local Ollama server
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use orinda_rag::{KnowledgeBase, OllamaClient, OllamaConfig, RagConfig, Session};
//!
//! let config = RagConfig::from_env()?;
//! let ollama = Arc::new(OllamaClient::new(OllamaConfig::from_env())?);
//! let kb = Arc::new(KnowledgeBase::open_persistent(&config, ollama.clone()).await);
//! let (session, mut events) = Session::new(kb, ollama, &config);
//!
//! session.start_ingest(vec!["handbook.pdf".into()]).await?;
//! session.ask("What is the leave policy?", "llama3.2:latest").await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod inmemory;
pub mod knowledge_base;
pub mod llm;
pub mod loader;
pub mod ollama;
pub mod persistent;
pub mod query;
pub mod session;
pub mod vectorstore;

pub use chunking::{Chunker, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, Metadata, MetadataValue, SearchResult, VectorRecord};
pub use embedding::EmbeddingProvider;
pub use error::{ErrorKind, LoadErrorKind, RagError, Result};
pub use ingest::{
    FileFailure, IngestPipeline, IngestProgress, IngestReport, IngestStage, IngestedFile,
};
pub use inmemory::InMemoryVectorStore;
pub use knowledge_base::{KnowledgeBase, StoreOpener, StoreStatus};
pub use llm::ChatModel;
pub use loader::{DocumentFormat, load_document, supported_extensions};
pub use ollama::{OllamaClient, OllamaConfig};
pub use persistent::PersistentVectorStore;
pub use query::{NO_CONTEXT, QueryPipeline, QueryStage, RagAnswer, RelevancePolicy};
pub use session::{FlightGuard, Session, SessionEvent, SingleFlight, UploadedFile};
pub use vectorstore::VectorStore;
