//! File ingestion: load → split → embed → store.
//!
//! Files are processed in submission order. A file that cannot be loaded is
//! recorded in [`IngestReport::failures`] and the rest of the batch carries
//! on; a batch where nothing loads fails with [`RagError::NoDocumentsLoaded`]
//! without touching the store. Each loaded file is stored with one atomic
//! write, so an embedding or storage failure leaves the files before it in
//! place and nothing of the file that failed.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chunking::Chunker;
use crate::document::{Document, MetadataValue, SOURCE_KEY};
use crate::error::{RagError, Result};
use crate::knowledge_base::KnowledgeBase;
use crate::loader::{file_name_of, load_document};

/// Where an ingestion run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestStage {
    /// Reading file `file_index` (1-based) of `total_files`.
    Loading { file_index: usize, total_files: usize, file_name: String },
    /// Splitting a loaded file into chunks.
    Splitting { file_name: String },
    /// Embedding batch `batch` (1-based) of the current file.
    Embedding { batch: usize, total_batches: usize },
    /// A file's `chunks` were written to the store.
    Stored { file_name: String, chunks: usize },
    /// Flushing the store.
    Persisting,
    /// Done.
    Finished,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading { file_name, .. } => write!(f, "Loading {file_name}"),
            Self::Splitting { file_name } => write!(f, "Processing {file_name}"),
            Self::Embedding { batch, total_batches } => {
                write!(f, "Embedding ({batch}/{total_batches})")
            }
            Self::Stored { file_name, .. } => write!(f, "Stored {file_name}"),
            Self::Persisting => f.write_str("Saving"),
            Self::Finished => f.write_str("Completed"),
        }
    }
}

/// A progress update: the current stage plus the share of loaded documents stored so far.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestProgress {
    pub stage: IngestStage,
    /// In `[0, 1]`; never decreases within a run.
    pub fraction: f32,
}

/// A file that was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedFile {
    pub file_name: String,
    pub documents: usize,
    pub chunks: usize,
}

/// A file that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file_name: String,
    pub error: String,
}

/// Summary of a finished ingestion run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Documents (pages, sheets, whole files) that were stored.
    pub documents_processed: usize,
    /// Number of files that were stored.
    pub files_ingested: usize,
    /// Total chunks written to the store.
    pub chunks_stored: usize,
    /// Per-file breakdown of what was stored, in submission order.
    pub files: Vec<IngestedFile>,
    /// Files skipped because they could not be loaded.
    pub failures: Vec<FileFailure>,
}

impl IngestReport {
    /// One-line outcome for the user, followed by a line per failed file.
    pub fn status_message(&self) -> String {
        let mut message = format!(
            "Successfully processed {} documents from {} files.",
            self.documents_processed, self.files_ingested
        );
        for failure in &self.failures {
            message.push_str(&format!("\nFailed: {} ({})", failure.file_name, failure.error));
        }
        message
    }
}

/// Runs ingestion batches against a shared [`KnowledgeBase`].
pub struct IngestPipeline {
    knowledge_base: Arc<KnowledgeBase>,
    chunker: Arc<dyn Chunker>,
}

impl IngestPipeline {
    pub fn new(knowledge_base: Arc<KnowledgeBase>, chunker: Arc<dyn Chunker>) -> Self {
        Self { knowledge_base, chunker }
    }

    /// Ingest `paths`, reporting progress to `on_progress`.
    ///
    /// Cancellation is checked between files and between embedding batches.
    ///
    /// # Errors
    ///
    /// - [`RagError::NoDocumentsLoaded`] if no file could be loaded
    /// - [`RagError::Cancelled`] if `cancel` fires
    /// - embedding, store or [`RagError::NotInitialized`] errors abort the run
    pub async fn ingest(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(IngestProgress) + Send,
    ) -> Result<IngestReport> {
        let total_files = paths.len();
        let mut report = IngestReport::default();
        let mut loaded: Vec<(String, Vec<Document>)> = Vec::new();

        for (index, path) in paths.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(RagError::Cancelled { operation: "ingestion" });
            }
            let file_name = file_name_of(path);
            on_progress(IngestProgress {
                stage: IngestStage::Loading {
                    file_index: index + 1,
                    total_files,
                    file_name: file_name.clone(),
                },
                fraction: 0.0,
            });

            match load_document(path).await {
                Ok(documents) => loaded.push((file_name, documents)),
                Err(e) => {
                    warn!(file = %file_name, error = %e, "skipping file");
                    report.failures.push(FileFailure { file_name, error: e.to_string() });
                }
            }
        }

        if loaded.is_empty() {
            return Err(RagError::NoDocumentsLoaded);
        }

        let total_documents: usize = loaded.iter().map(|(_, documents)| documents.len()).sum();
        let mut processed = 0usize;

        for (file_name, documents) in loaded {
            if cancel.is_cancelled() {
                return Err(RagError::Cancelled { operation: "ingestion" });
            }
            let fraction = processed as f32 / total_documents as f32;
            on_progress(IngestProgress {
                stage: IngestStage::Splitting { file_name: file_name.clone() },
                fraction,
            });

            let mut chunks = self.chunker.split_documents(&documents);
            for chunk in &mut chunks {
                chunk
                    .metadata
                    .insert(SOURCE_KEY.to_string(), MetadataValue::from(file_name.as_str()));
            }
            let chunk_count = chunks.len();

            self.knowledge_base
                .add(chunks, cancel, |batch, total_batches| {
                    on_progress(IngestProgress {
                        stage: IngestStage::Embedding { batch, total_batches },
                        fraction,
                    })
                })
                .await?;

            processed += documents.len();
            report.documents_processed += documents.len();
            report.chunks_stored += chunk_count;
            report.files.push(IngestedFile {
                file_name: file_name.clone(),
                documents: documents.len(),
                chunks: chunk_count,
            });
            info!(file = %file_name, documents = documents.len(), chunk_count, "ingested file");

            on_progress(IngestProgress {
                stage: IngestStage::Stored { file_name, chunks: chunk_count },
                fraction: processed as f32 / total_documents as f32,
            });
        }
        report.files_ingested = report.files.len();

        on_progress(IngestProgress { stage: IngestStage::Persisting, fraction: 1.0 });
        if let Err(e) = self.knowledge_base.persist().await {
            warn!(error = %e, "failed to persist collection");
        }

        on_progress(IngestProgress { stage: IngestStage::Finished, fraction: 1.0 });
        info!(
            documents = report.documents_processed,
            files = report.files_ingested,
            chunks = report.chunks_stored,
            failures = report.failures.len(),
            "ingestion finished"
        );
        Ok(report)
    }
}
