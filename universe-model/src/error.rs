//! Error types for the `universe-model` crate.

use thiserror::Error;

/// Errors produced by answer generators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The backend failed while producing an answer (transport, HTTP status,
    /// malformed stream). Callers turn this into a degraded answer.
    #[error("Generation failed ({backend}): {message}")]
    GenerationFailed {
        /// Name of the generator that failed.
        backend: String,
        /// What went wrong.
        message: String,
    },

    /// The generator was misconfigured (unknown provider, missing credentials, ...).
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ModelError {
    /// Returns `true` for runtime backend failures.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ModelError::GenerationFailed { .. })
    }

    pub(crate) fn generation(backend: impl Into<String>, message: impl Into<String>) -> Self {
        ModelError::GenerationFailed { backend: backend.into(), message: message.into() }
    }
}

/// A convenience result type for generation.
pub type Result<T> = std::result::Result<T, ModelError>;
