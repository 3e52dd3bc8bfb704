//! Error types for the semantic code search engine.
//!
//! This module provides structured error types using thiserror for
//! better error handling and actionable error messages. Lower layers
//! enrich errors with context; the orchestrator is the boundary where
//! the taxonomy below surfaces to callers.

use crate::types::CodebaseId;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type surfaced by indexing and search operations.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Missing or invalid configuration: unknown provider, zero
    /// dimension with no override, incompatible collection dimension.
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// Search against a codebase that has no collection yet.
    /// User-facing; callers should prompt for an index run.
    #[error("Codebase '{path}' is not indexed. Run indexing first.")]
    NotIndexed { path: PathBuf },

    /// Another writer holds the lock for this codebase.
    #[error("Codebase '{id}' is busy with another indexing operation. Retry once it completes.")]
    Busy { id: CodebaseId },

    /// A cancellation token tripped before the operation could start.
    #[error("Operation cancelled before any work was done")]
    Cancelled,

    /// File system errors
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Embedding provider failure, after internal retries.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Underlying database failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Snapshot persistence failure.
    #[error("Snapshot error for '{path}': {reason}")]
    Snapshot { path: PathBuf, reason: String },

    /// General errors where a structured variant does not fit.
    #[error("{0}")]
    General(String),
}

impl IndexError {
    /// Stable status code for programmatic handling in protocol responses.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG_ERROR",
            Self::NotIndexed { .. } => "NOT_INDEXED",
            Self::Busy { .. } => "BUSY",
            Self::Cancelled => "CANCELLED",
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::FileWrite { .. } => "FILE_WRITE_ERROR",
            Self::Embedding(e) => e.status_code(),
            Self::Store(_) => "STORE_ERROR",
            Self::Snapshot { .. } => "SNAPSHOT_ERROR",
            Self::General(_) => "GENERAL_ERROR",
        }
    }
}

/// Errors from embedding providers.
///
/// Transient failures are retried inside the provider wrapper and only
/// surface once the retry budget is spent.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Rate limit, 5xx, or network failure. Retried with backoff.
    #[error("Transient embedding failure ({provider}): {reason}")]
    Transient { provider: String, reason: String },

    /// Auth failure or unknown model. Aborts the indexing run.
    #[error(
        "Embedding provider '{provider}' failed permanently: {reason}\nSuggestion: check credentials and model name"
    )]
    Permanent { provider: String, reason: String },

    /// A single input exceeds the provider limit even after truncation.
    #[error("Input of {actual} tokens exceeds the provider limit of {limit} after truncation")]
    Oversize { actual: usize, limit: usize },

    /// Provider returned vectors of the wrong length.
    #[error(
        "Embedding dimension mismatch: expected {expected}, got {actual}\nSuggestion: ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "EMBEDDING_TRANSIENT",
            Self::Permanent { .. } | Self::Oversize { .. } | Self::DimensionMismatch { .. } => {
                "EMBEDDING_ERROR"
            }
        }
    }

    /// Whether the retry wrapper should attempt this call again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Errors specific to the vector store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to serialize vector data: {0}")]
    Serialization(String),

    #[error(
        "Vector dimension mismatch: collection expects {expected}, chunk '{chunk_id}' has {actual}"
    )]
    DimensionMismatch {
        chunk_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid filter expression: {reason}")]
    InvalidFilter { reason: String },

    /// Write issued against a collection that was never created.
    #[error("No collection exists for codebase '{id}'. Create one before writing.")]
    CollectionMissing { id: String },
}

/// Result type alias for orchestrator-level operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Maps raw io failures into the structured file variants, so the
/// offending path always travels with the error.
pub trait IoResultExt<T> {
    /// Convert an io error into [`IndexError::FileRead`] for `path`.
    fn read_err(self, path: &std::path::Path) -> Result<T, IndexError>;

    /// Convert an io error into [`IndexError::FileWrite`] for `path`.
    fn write_err(self, path: &std::path::Path) -> Result<T, IndexError>;
}

impl<T> IoResultExt<T> for Result<T, std::io::Error> {
    fn read_err(self, path: &std::path::Path) -> Result<T, IndexError> {
        self.map_err(|source| IndexError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_err(self, path: &std::path::Path) -> Result<T, IndexError> {
        self.map_err(|source| IndexError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}
