//! On-disk vector store backed by redb.
//!
//! Each record is split across two tables keyed by a monotonically increasing
//! sequence number, so iteration order on reopen matches insertion order:
//!
//! - `records`: JSON-encoded id and chunk
//! - `embeddings`: raw `f32` values
//!
//! Every record is also cached in memory; search is a linear scan of the cache.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::document::{Chunk, SearchResult, VectorRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, rank};

const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("records");
const EMBEDDINGS: TableDefinition<u64, &[u8]> = TableDefinition::new("embeddings");

const BACKEND: &str = "redb";

#[derive(Serialize)]
struct StoredChunkRef<'a> {
    id: &'a str,
    chunk: &'a Chunk,
}

#[derive(Deserialize)]
struct StoredChunk {
    id: String,
    chunk: Chunk,
}

struct Entry {
    seq: u64,
    record: VectorRecord,
}

#[derive(Default)]
struct State {
    entries: Vec<Entry>,
    next_seq: u64,
}

fn db_err(e: impl Into<redb::Error>) -> RagError {
    let e = e.into();
    error!(backend = BACKEND, error = %e, "database operation failed");
    RagError::store(BACKEND, e)
}

fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % size_of::<f32>() != 0 {
        return Err(RagError::store(
            BACKEND,
            format!("embedding blob of {} bytes is not a whole number of f32 values", bytes.len()),
        ));
    }
    // Stored bytes carry no alignment guarantee, so read each value unaligned.
    Ok(bytes.chunks_exact(size_of::<f32>()).map(bytemuck::pod_read_unaligned).collect())
}

/// A vector store persisted to a single redb file.
///
/// Writes commit one transaction per call, so a successful [`add`](VectorStore::add)
/// or [`delete`](VectorStore::delete) is durable when it returns and
/// [`persist`](VectorStore::persist) has nothing left to do.
///
/// # Example
///
/// ```rust,ignore
/// use orinda_rag::{PersistentVectorStore, VectorStore};
///
/// let store = PersistentVectorStore::open("./orinda_chroma_db/orinda_rag_collection.redb")?;
/// println!("{} records", store.count().await?);
/// ```
pub struct PersistentVectorStore {
    db: Database,
    path: PathBuf,
    state: RwLock<State>,
}

impl PersistentVectorStore {
    /// Open the collection file at `path`, creating it and its parent directory if needed.
    ///
    /// Existing records are loaded into memory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path).map_err(db_err)?;

        let txn = db.begin_write().map_err(db_err)?;
        txn.open_table(RECORDS).map_err(db_err)?;
        txn.open_table(EMBEDDINGS).map_err(db_err)?;
        txn.commit().map_err(db_err)?;

        let state = Self::load(&db)?;
        info!(
            path = %path.display(),
            records = state.entries.len(),
            "opened persistent collection"
        );

        Ok(Self { db, path, state: RwLock::new(state) })
    }

    /// Location of the collection file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(db: &Database) -> Result<State> {
        let txn = db.begin_read().map_err(db_err)?;
        let records = txn.open_table(RECORDS).map_err(db_err)?;
        let embeddings = txn.open_table(EMBEDDINGS).map_err(db_err)?;

        let mut state = State::default();
        for entry in records.iter().map_err(db_err)? {
            let (key, value) = entry.map_err(db_err)?;
            let seq = key.value();
            let stored: StoredChunk = serde_json::from_slice(value.value())
                .map_err(|e| RagError::store(BACKEND, format!("record {seq} is unreadable: {e}")))?;
            let Some(blob) = embeddings.get(seq).map_err(db_err)? else {
                return Err(RagError::store(BACKEND, format!("record {seq} has no embedding")));
            };
            let embedding = decode_embedding(blob.value())?;

            state.entries.push(Entry {
                seq,
                record: VectorRecord { id: stored.id, chunk: stored.chunk, embedding },
            });
            state.next_seq = seq + 1;
        }
        Ok(state)
    }

    /// Remove the entries matching `predicate` in one transaction.
    async fn remove_where(&self, predicate: impl Fn(&VectorRecord) -> bool) -> Result<usize> {
        let mut state = self.state.write().await;
        let doomed: Vec<u64> =
            state.entries.iter().filter(|e| predicate(&e.record)).map(|e| e.seq).collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut records = txn.open_table(RECORDS).map_err(db_err)?;
            let mut embeddings = txn.open_table(EMBEDDINGS).map_err(db_err)?;
            for &seq in &doomed {
                records.remove(seq).map_err(db_err)?;
                embeddings.remove(seq).map_err(db_err)?;
            }
        }
        txn.commit().map_err(db_err)?;

        state.entries.retain(|e| !predicate(&e.record));
        debug!(removed = doomed.len(), remaining = state.entries.len(), "deleted records");
        Ok(doomed.len())
    }
}

#[async_trait]
impl VectorStore for PersistentVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let first_seq = state.next_seq;

        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut chunks = txn.open_table(RECORDS).map_err(db_err)?;
            let mut embeddings = txn.open_table(EMBEDDINGS).map_err(db_err)?;
            for (seq, record) in (first_seq..).zip(&records) {
                let chunk_ref = StoredChunkRef { id: &record.id, chunk: &record.chunk };
                let json = serde_json::to_vec(&chunk_ref).map_err(|e| RagError::store(BACKEND, e))?;
                chunks.insert(seq, json.as_slice()).map_err(db_err)?;
                let blob: &[u8] = bytemuck::cast_slice(&record.embedding);
                embeddings.insert(seq, blob).map_err(db_err)?;
            }
        }
        txn.commit().map_err(db_err)?;

        let added = records.len();
        state.entries.extend((first_seq..).zip(records).map(|(seq, record)| Entry { seq, record }));
        state.next_seq = first_seq + added as u64;
        debug!(added, total = state.entries.len(), "stored records");
        Ok(())
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let state = self.state.read().await;
        Ok(rank(state.entries.iter().map(|e| &e.record), embedding, top_k))
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.remove_where(|record| ids.contains(record.id.as_str())).await
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        self.remove_where(|record| record.chunk.source() == source).await
    }

    async fn ids(&self) -> Result<Vec<String>> {
        Ok(self.state.read().await.entries.iter().map(|e| e.record.id.clone()).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.entries.len())
    }
}
