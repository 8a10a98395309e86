//! Error types for the `universe-chain` crate.

use thiserror::Error;
use universe_model::ModelError;
use universe_rag::RagError;

/// Errors returned by the QA chain and its cache.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Retrieval-layer failure (index lifecycle, embedding provider, ...).
    #[error(transparent)]
    Rag(#[from] RagError),

    /// Generation-layer failure.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Invalid chain configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChainError {
    /// Returns `true` for transient provider failures, which the chain turns
    /// into a degraded answer instead of an error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ChainError::Rag(e) => e.is_recoverable(),
            ChainError::Model(e) => e.is_recoverable(),
            ChainError::Config(_) => false,
        }
    }
}

/// A convenience result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;
