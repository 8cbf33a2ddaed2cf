//! Interactive session orchestration.
//!
//! A [`Session`] owns the shared [`KnowledgeBase`] and both pipelines. Work is
//! started with [`Session::start_ingest`] and [`Session::ask`], which validate
//! their input, claim the pipeline's [`SingleFlight`] slot and spawn a tokio
//! task. Tasks never touch the front end directly; they post
//! [`SessionEvent`]s to the channel returned by [`Session::new`], and the
//! front end drains it on its own loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::ingest::{IngestPipeline, IngestProgress, IngestReport, IngestStage};
use crate::knowledge_base::{KnowledgeBase, StoreStatus};
use crate::llm::ChatModel;
use crate::query::{QueryPipeline, QueryStage, RagAnswer, validate_query};

/// Allows at most one run of an operation at a time.
#[derive(Debug, Clone)]
pub struct SingleFlight {
    operation: &'static str,
    busy: Arc<AtomicBool>,
}

/// Holds a [`SingleFlight`] slot; dropping it releases the slot, including
/// during a panic unwind.
#[derive(Debug)]
pub struct FlightGuard {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new(operation: &'static str) -> Self {
        Self { operation, busy: Arc::new(AtomicBool::new(false)) }
    }

    /// Claim the slot, or fail with [`RagError::Busy`] if a run is in flight.
    pub fn try_acquire(&self) -> Result<FlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| FlightGuard { busy: Arc::clone(&self.busy) })
            .map_err(|_| RagError::Busy { operation: self.operation })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Something the front end should display.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Ingestion moved forward.
    IngestProgress(IngestProgress),
    /// Ingestion finished; failed files are listed in the report.
    IngestCompleted(IngestReport),
    /// Ingestion stopped before storing everything.
    IngestFailed { message: String },
    /// A query reached a checkpoint.
    QueryProgress(QueryStage),
    /// Response text for a query. Model errors arrive here too, as text.
    Response { query: String, answer: RagAnswer },
    /// A query failed before a response could be produced.
    QueryFailed { message: String },
    /// A one-line status message.
    Status(String),
}

/// A file that has been ingested during this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub chunks: usize,
}

/// Front-end facing handle on the knowledge base and pipelines.
pub struct Session {
    knowledge_base: Arc<KnowledgeBase>,
    ingest: Arc<IngestPipeline>,
    query: Arc<QueryPipeline>,
    events: mpsc::UnboundedSender<SessionEvent>,
    ingest_flight: SingleFlight,
    query_flight: SingleFlight,
    uploaded: Arc<RwLock<Vec<UploadedFile>>>,
    /// Held by the ingestion task for its whole run.
    ingest_running: Arc<Mutex<()>>,
    ingest_cancel: Mutex<CancellationToken>,
    query_cancel: Mutex<CancellationToken>,
}

impl Session {
    /// Create a session and the receiver its events are posted to.
    pub fn new(
        knowledge_base: Arc<KnowledgeBase>,
        chat: Arc<dyn ChatModel>,
        config: &RagConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let chunker: Arc<dyn Chunker> = Arc::new(RecursiveChunker::from_config(config));
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            ingest: Arc::new(IngestPipeline::new(Arc::clone(&knowledge_base), chunker)),
            query: Arc::new(QueryPipeline::new(Arc::clone(&knowledge_base), chat, config)),
            knowledge_base,
            events,
            ingest_flight: SingleFlight::new("Document processing"),
            query_flight: SingleFlight::new("Query"),
            uploaded: Arc::new(RwLock::new(Vec::new())),
            ingest_running: Arc::new(Mutex::new(())),
            ingest_cancel: Mutex::new(CancellationToken::new()),
            query_cancel: Mutex::new(CancellationToken::new()),
        };
        (session, receiver)
    }

    /// The shared knowledge base.
    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge_base
    }

    /// Start ingesting `paths` in the background.
    ///
    /// # Errors
    ///
    /// [`RagError::NoDocumentsLoaded`] for an empty selection and
    /// [`RagError::Busy`] while another ingestion is running. Everything that
    /// happens after the task starts is reported as a [`SessionEvent`].
    pub async fn start_ingest(&self, paths: Vec<PathBuf>) -> Result<JoinHandle<()>> {
        if paths.is_empty() {
            return Err(RagError::NoDocumentsLoaded);
        }
        let guard = self.ingest_flight.try_acquire()?;
        let running = Arc::clone(&self.ingest_running).lock_owned().await;
        let cancel = self.fresh_token(&self.ingest_cancel).await;

        let pipeline = Arc::clone(&self.ingest);
        let uploaded = Arc::clone(&self.uploaded);
        let events = self.events.clone();
        info!(files = paths.len(), "starting ingestion");

        Ok(tokio::spawn(async move {
            // Declared first so it is released last, after the flight slot.
            let _running = running;
            let _guard = guard;
            let mut stored = Vec::new();
            let outcome = pipeline
                .ingest(&paths, &cancel, |progress| {
                    if let IngestStage::Stored { file_name, chunks } = &progress.stage {
                        stored.push(UploadedFile { file_name: file_name.clone(), chunks: *chunks });
                    }
                    let _ = events.send(SessionEvent::IngestProgress(progress));
                })
                .await;

            // Files stored before a failure stay in the knowledge base, so they are listed too.
            record_uploads(&uploaded, &stored).await;
            let event = match outcome {
                Ok(report) => SessionEvent::IngestCompleted(report),
                Err(e) => SessionEvent::IngestFailed { message: e.to_string() },
            };
            let _ = events.send(event);
        }))
    }

    /// Answer `query` with `model` in the background.
    ///
    /// # Errors
    ///
    /// [`RagError::EmptyQuery`] for a blank query and [`RagError::Busy`] while
    /// another query is running.
    pub async fn ask(
        &self,
        query: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<JoinHandle<()>> {
        let query = query.into();
        let model = model.into();
        validate_query(&query)?;
        let guard = self.query_flight.try_acquire()?;
        let cancel = self.fresh_token(&self.query_cancel).await;

        let pipeline = Arc::clone(&self.query);
        let events = self.events.clone();
        debug!(%model, query_len = query.len(), "starting query");

        Ok(tokio::spawn(async move {
            let _guard = guard;
            let stage_events = events.clone();
            let outcome = pipeline
                .answer(&query, &model, &cancel, move |stage| {
                    let _ = stage_events.send(SessionEvent::QueryProgress(stage));
                })
                .await;

            let event = match outcome {
                Ok(answer) => SessionEvent::Response { query, answer },
                Err(e @ RagError::Model { .. }) => SessionEvent::Response {
                    query,
                    answer: RagAnswer {
                        response: e.to_string(),
                        context: String::new(),
                        used_fallback: false,
                    },
                },
                Err(e) => SessionEvent::QueryFailed { message: e.to_string() },
            };
            let _ = events.send(event);
        }))
    }

    async fn fresh_token(&self, slot: &Mutex<CancellationToken>) -> CancellationToken {
        let token = CancellationToken::new();
        *slot.lock().await = token.clone();
        token
    }

    /// Request cancellation of any running ingestion or query.
    pub async fn cancel(&self) {
        self.ingest_cancel.lock().await.cancel();
        self.query_cancel.lock().await.cancel();
    }

    pub fn is_ingesting(&self) -> bool {
        self.ingest_flight.is_busy()
    }

    pub fn is_querying(&self) -> bool {
        self.query_flight.is_busy()
    }

    /// Files ingested during this session, in upload order.
    pub async fn uploaded_files(&self) -> Vec<UploadedFile> {
        self.uploaded.read().await.clone()
    }

    /// Drop `file_name` from the uploaded list and delete its records.
    ///
    /// Returns the number of records deleted.
    pub async fn remove_file(&self, file_name: &str) -> Result<usize> {
        let removed = self.knowledge_base.remove_source(file_name).await?;
        self.uploaded.write().await.retain(|file| file.file_name != file_name);
        let _ = self.events.send(SessionEvent::Status(format!("Removed '{file_name}' from list.")));
        Ok(removed)
    }

    /// Availability and size of the knowledge base.
    pub async fn status(&self) -> Result<StoreStatus> {
        self.knowledge_base.status().await
    }

    /// Cancel running work and clear the collection.
    ///
    /// Waits for a running ingestion to stop before clearing, so nothing it
    /// writes survives. Clearing is best effort: failures are logged and
    /// reported as zero.
    pub async fn shutdown(&self) -> usize {
        self.cancel().await;
        let _idle = self.ingest_running.lock().await;
        match self.knowledge_base.clear_all().await {
            Ok(removed) => {
                info!(removed, "cleared collection on shutdown");
                removed
            }
            Err(e) => {
                warn!(error = %e, "failed to clear collection on shutdown");
                0
            }
        }
    }
}

async fn record_uploads(uploaded: &RwLock<Vec<UploadedFile>>, stored: &[UploadedFile]) {
    let mut uploaded = uploaded.write().await;
    for file in stored {
        match uploaded.iter_mut().find(|entry| entry.file_name == file.file_name) {
            Some(entry) => entry.chunks += file.chunks,
            None => uploaded.push(UploadedFile {
                file_name: file.file_name.clone(),
                chunks: file.chunks,
            }),
        }
    }
}
