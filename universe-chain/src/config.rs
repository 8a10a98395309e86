//! Configuration for QA chains and their indexes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use universe_model::BackendProvider;
use universe_rag::{DEFAULT_HASHING_DIMENSIONS, EmbeddingKind, RagError};

use crate::error::{ChainError, Result};

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 4;
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
/// Default generation budget.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;

/// Highest temperature accepted by the hosted backends.
const MAX_TEMPERATURE: f32 = 2.0;

/// Configuration of one QA chain.
///
/// Two configs with the same [`ChainKey`] share a cached chain in
/// [`ChainManager`](crate::ChainManager); the remaining fields only take
/// effect when that chain is first created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainConfig {
    /// Hosted chat backend.
    pub backend_provider: BackendProvider,
    /// Model name passed to the backend.
    pub model_name: String,
    /// Embedding backend for the index and for queries.
    pub embedding_kind: EmbeddingKind,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Generation budget.
    pub max_output_tokens: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            backend_provider: BackendProvider::Zhipu,
            model_name: BackendProvider::Zhipu.default_model().to_string(),
            embedding_kind: EmbeddingKind::Hashing,
            top_k: DEFAULT_TOP_K,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

pub(crate) fn validate_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(RagError::InvalidK(top_k).into());
    }
    Ok(())
}

pub(crate) fn validate_temperature(temperature: f32) -> Result<()> {
    if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
        return Err(ChainError::Config(format!(
            "temperature must be within 0.0..={MAX_TEMPERATURE}, got {temperature}"
        )));
    }
    Ok(())
}

impl ChainConfig {
    /// Create a new builder for constructing a [`ChainConfig`].
    pub fn builder() -> ChainConfigBuilder {
        ChainConfigBuilder::default()
    }

    /// The cache identity of this config.
    pub fn key(&self) -> ChainKey {
        ChainKey {
            backend_provider: self.backend_provider,
            model_name: self.model_name.clone(),
            embedding_kind: self.embedding_kind,
        }
    }

    /// Check that parameters are usable.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidK`] if `top_k == 0`.
    /// - [`ChainError::Config`] for an empty model name, an out-of-range
    ///   temperature or a zero token budget.
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(ChainError::Config("model_name must not be empty".into()));
        }
        validate_top_k(self.top_k)?;
        validate_temperature(self.temperature)?;
        if self.max_output_tokens == 0 {
            return Err(ChainError::Config("max_output_tokens must be greater than zero".into()));
        }
        if !self.backend_provider.supported_models().contains(&self.model_name.as_str()) {
            warn!(
                provider = %self.backend_provider,
                model = %self.model_name,
                "model is not in the provider's known model list"
            );
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`ChainConfig`].
#[derive(Debug, Clone, Default)]
pub struct ChainConfigBuilder {
    config: ChainConfig,
    model_name: Option<String>,
}

impl ChainConfigBuilder {
    /// Set the chat backend. Without an explicit model, its default model is used.
    pub fn backend_provider(mut self, provider: BackendProvider) -> Self {
        self.config.backend_provider = provider;
        self
    }

    /// Set the model name.
    pub fn model_name(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    /// Set the embedding backend.
    pub fn embedding_kind(mut self, kind: EmbeddingKind) -> Self {
        self.config.embedding_kind = kind;
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set the generation budget.
    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.config.max_output_tokens = tokens;
        self
    }

    /// Build the [`ChainConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`ChainConfig::validate`].
    pub fn build(self) -> Result<ChainConfig> {
        let mut config = self.config;
        config.model_name = self
            .model_name
            .unwrap_or_else(|| config.backend_provider.default_model().to_string());
        config.validate()?;
        Ok(config)
    }
}

/// Identity of a cached chain: `(backend_provider, model_name, embedding_kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainKey {
    /// Hosted chat backend.
    pub backend_provider: BackendProvider,
    /// Model name.
    pub model_name: String,
    /// Embedding backend.
    pub embedding_kind: EmbeddingKind,
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.backend_provider, self.model_name, self.embedding_kind)
    }
}

/// Where the index lives and how it is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSettings {
    /// Persisted index file.
    pub index_path: PathBuf,
    /// Corpus used to build the index when `index_path` does not exist.
    pub corpus_dir: Option<PathBuf>,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Number of chunks sent to the embedding provider per call.
    pub embed_batch_size: usize,
    /// Width of [`EmbeddingKind::Hashing`] vectors.
    pub hashing_dimensions: usize,
    /// Model cache for [`EmbeddingKind::Local`].
    pub model_cache_dir: Option<PathBuf>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("vector_db/index.json"),
            corpus_dir: Some(PathBuf::from("knowledge_db")),
            chunk_size: 500,
            chunk_overlap: 150,
            embed_batch_size: 32,
            hashing_dimensions: DEFAULT_HASHING_DIMENSIONS,
            model_cache_dir: None,
        }
    }
}

impl IndexSettings {
    /// Settings for an index at `index_path` built from `corpus_dir`.
    pub fn new(index_path: impl Into<PathBuf>, corpus_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            corpus_dir: Some(corpus_dir.into()),
            ..Self::default()
        }
    }

    /// Check chunking and batching parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Config`] if `chunk_size == 0`,
    /// `chunk_overlap >= chunk_size`, `embed_batch_size == 0` or
    /// `hashing_dimensions == 0`.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(ChainError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({}), and chunk_size must be positive",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embed_batch_size == 0 {
            return Err(ChainError::Config("embed_batch_size must be greater than zero".into()));
        }
        if self.hashing_dimensions == 0 {
            return Err(ChainError::Config("hashing_dimensions must be greater than zero".into()));
        }
        Ok(())
    }
}

/// API keys for the hosted backends.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Key for [`BackendProvider::Zhipu`].
    pub zhipu_api_key: Option<String>,
    /// Key for [`BackendProvider::OpenAI`] chat and embeddings.
    pub openai_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("zhipu_api_key", &redact(&self.zhipu_api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Credentials {
    /// Read keys from the environment, loading a `.env` file first if present.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self {
            zhipu_api_key: non_empty(std::env::var(BackendProvider::Zhipu.api_key_env()).ok()),
            openai_api_key: non_empty(std::env::var(BackendProvider::OpenAI.api_key_env()).ok()),
        }
    }

    /// Set the Zhipu key.
    pub fn with_zhipu_key(mut self, key: impl Into<String>) -> Self {
        self.zhipu_api_key = non_empty(Some(key.into()));
        self
    }

    /// Set the OpenAI key.
    pub fn with_openai_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = non_empty(Some(key.into()));
        self
    }

    /// The key for `provider`, if configured.
    pub fn api_key(&self, provider: BackendProvider) -> Option<&str> {
        match provider {
            BackendProvider::Zhipu => self.zhipu_api_key.as_deref(),
            BackendProvider::OpenAI => self.openai_api_key.as_deref(),
        }
    }

    /// The key for `provider`, or a configuration error naming its variable.
    pub fn require(&self, provider: BackendProvider) -> Result<&str> {
        self.api_key(provider).ok_or_else(|| {
            ChainError::Config(format!(
                "no API key for {provider}; set {}",
                provider.api_key_env()
            ))
        })
    }
}
