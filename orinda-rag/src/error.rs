//! Error types for the `orinda-rag` crate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why a single file could not be turned into documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    /// The file extension is not one of the supported formats.
    UnsupportedType,
    /// The file could not be read from disk.
    Unreadable,
    /// The file was read but its contents could not be parsed.
    Corrupt,
    /// The file parsed but contained no extractable text.
    Empty,
}

impl fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UnsupportedType => "unsupported file type",
            Self::Unreadable => "unreadable file",
            Self::Corrupt => "corrupt file",
            Self::Empty => "empty file",
        };
        f.write_str(label)
    }
}

/// Coarse classification of a [`RagError`], stable for matching and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Load(LoadErrorKind),
    NotInitialized,
    Embedding,
    VectorStore,
    Model,
    EmptyQuery,
    NoDocumentsLoaded,
    Busy,
    Cancelled,
    Config,
    Io,
}

/// Errors that can occur in ingestion and retrieval operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A single file could not be loaded.
    #[error("{message}")]
    Load {
        /// The file that failed.
        path: PathBuf,
        /// Classification of the failure.
        kind: LoadErrorKind,
        /// Human-readable description shown to the user.
        message: String,
    },

    /// The vector store is not available.
    #[error("Vector database not initialized: {reason}")]
    NotInitialized {
        /// Why the store is unavailable.
        reason: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStore {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model call failed.
    #[error("Error calling model '{model}': {message}")]
    Model {
        /// The model identifier that was requested.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// The query was empty or whitespace only.
    #[error("Please enter a query.")]
    EmptyQuery,

    /// None of the files in an ingestion batch could be loaded.
    #[error("No documents were successfully loaded.")]
    NoDocumentsLoaded,

    /// Another run of the same operation is still in flight.
    #[error("{operation} is already in progress")]
    Busy {
        /// The operation that was rejected.
        operation: &'static str,
    },

    /// The run was cancelled before completing.
    #[error("{operation} was cancelled")]
    Cancelled {
        /// The operation that was cancelled.
        operation: &'static str,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A filesystem error outside of document loading.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Build a load error for `path`.
    pub fn load(path: impl Into<PathBuf>, kind: LoadErrorKind, message: impl Into<String>) -> Self {
        Self::Load { path: path.into(), kind, message: message.into() }
    }

    /// Build a vector store error tagged with the backend name.
    pub fn store(backend: &str, message: impl fmt::Display) -> Self {
        Self::VectorStore { backend: backend.to_string(), message: message.to_string() }
    }

    /// Return the coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Load { kind, .. } => ErrorKind::Load(*kind),
            Self::NotInitialized { .. } => ErrorKind::NotInitialized,
            Self::Embedding { .. } => ErrorKind::Embedding,
            Self::VectorStore { .. } => ErrorKind::VectorStore,
            Self::Model { .. } => ErrorKind::Model,
            Self::EmptyQuery => ErrorKind::EmptyQuery,
            Self::NoDocumentsLoaded => ErrorKind::NoDocumentsLoaded,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_classifies_load_errors() {
        let err =
            RagError::load("a.txt", LoadErrorKind::UnsupportedType, "Unsupported file type: .txt");
        assert_eq!(err.kind(), ErrorKind::Load(LoadErrorKind::UnsupportedType));
        assert_eq!(err.to_string(), "Unsupported file type: .txt");
    }

    #[test]
    fn not_initialized_message_is_readable() {
        let err = RagError::NotInitialized { reason: "embedding backend unreachable".into() };
        assert_eq!(
            err.to_string(),
            "Vector database not initialized: embedding backend unreachable"
        );
    }
}
