//! Data types for documents, chunks, vector records, and search results.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata key holding the originating file name of a chunk.
pub const SOURCE_KEY: &str = "source";

/// A metadata value attached to a document or chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A textual value such as a file name.
    Text(String),
    /// A numeric value such as a page number.
    Number(f64),
}

impl MetadataValue {
    /// Return the value as a string slice if it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Number(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

/// Key-value metadata carried by documents, chunks and records.
pub type Metadata = HashMap<String, MetadataValue>;

/// Raw text extracted from one logical unit of a file (a PDF page, a sheet, a whole document).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// The extracted text.
    pub text: String,
    /// Metadata attached by the loader.
    pub metadata: Metadata,
}

impl Document {
    /// Create a document with empty metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), metadata: Metadata::new() }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A bounded-length segment of a [`Document`], the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// Metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: Metadata,
}

impl Chunk {
    /// The originating file name, or `"unknown"` if the chunk was never stamped.
    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).and_then(MetadataValue::as_str).unwrap_or("unknown")
    }
}

/// A [`Chunk`] stored in the vector store together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// Unique identifier generated at ingestion time.
    pub id: String,
    /// The stored chunk.
    pub chunk: Chunk,
    /// The vector embedding of the chunk's text.
    pub embedding: Vec<f32>,
}

impl VectorRecord {
    /// Create a record with a freshly generated identifier.
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), chunk, embedding }
    }
}

/// A retrieved [`VectorRecord`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved record.
    pub record: VectorRecord,
    /// Relevance in `[0, 1]`; higher is more relevant.
    pub score: f32,
}
