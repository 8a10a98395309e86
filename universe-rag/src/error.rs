//! Error types for the `universe-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in RAG operations.
///
/// Configuration and index-lifecycle variants need operator action (rebuild
/// or reconfigure). Provider variants are transient and callers are expected
/// to degrade gracefully; see [`RagError::is_recoverable`].
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error (bad chunk parameters, missing credentials, ...).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A nearest-neighbor query was issued with `k == 0`.
    #[error("Invalid k: {0} (must be greater than zero)")]
    InvalidK(usize),

    /// An index build was attempted with no chunks.
    #[error("Cannot build an index from an empty corpus")]
    EmptyCorpus,

    /// No persisted index exists at the given path.
    #[error("Index not found at {}", path.display())]
    IndexNotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// A persisted index cannot be used with the active embedding provider.
    #[error("Corrupt index at {}: {reason}", path.display())]
    CorruptIndex {
        /// The path of the persisted index.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// A vector has a different dimensionality than the index expects.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimensionality of the index.
        expected: usize,
        /// The dimensionality of the offending vector.
        actual: usize,
    },

    /// The embedding provider could not produce embeddings.
    #[error("Embedding unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A filesystem operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An index could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Returns `true` for runtime provider failures that should be turned into
    /// a degraded response instead of failing the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RagError::EmbeddingUnavailable { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RagError::Io { path: path.into(), source }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RagError::CorruptIndex { path: path.into(), reason: reason.into() }
    }

    pub(crate) fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        RagError::EmbeddingUnavailable { provider: provider.into(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
