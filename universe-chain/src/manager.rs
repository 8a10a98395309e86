//! Memoized construction of QA chains.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info, warn};
use universe_model::{AnswerGenerator, ChatCompletionsClient, ChatConfig};
use universe_rag::{EmbeddingProvider, RagError, Retriever, VectorIndex, load_corpus};

use crate::chain::QaChain;
use crate::config::{ChainConfig, ChainKey, Credentials, IndexSettings};
use crate::error::{ChainError, Result};
use crate::index::{build_index, embedding_provider, load_index};
use crate::prompt::PromptTemplate;

/// Builds a [`QaChain`] for a configuration.
#[async_trait]
pub trait ChainFactory: Send + Sync {
    /// Create a chain for `config`.
    async fn create(&self, config: &ChainConfig) -> Result<QaChain>;
}

/// Caches one [`QaChain`] per [`ChainKey`].
///
/// Concurrent first requests for the same key run the factory once. A failed
/// construction is not cached, so the next request retries it. Different
/// keys are constructed independently.
pub struct ChainManager {
    factory: Arc<dyn ChainFactory>,
    chains: Mutex<HashMap<ChainKey, Arc<OnceCell<Arc<QaChain>>>>>,
}

impl std::fmt::Debug for ChainManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainManager").finish_non_exhaustive()
    }
}

impl ChainManager {
    /// Create an empty cache around `factory`.
    pub fn new(factory: Arc<dyn ChainFactory>) -> Self {
        Self { factory, chains: Mutex::new(HashMap::new()) }
    }

    /// The chain for `config`, creating it on first use.
    ///
    /// Only the key fields of `config` select the chain; `top_k`, temperature
    /// and the token budget apply when the chain is created.
    ///
    /// # Errors
    ///
    /// Invalid configuration, or whatever the factory returns.
    pub async fn get_chain(&self, config: &ChainConfig) -> Result<Arc<QaChain>> {
        config.validate()?;
        let key = config.key();

        let cell = {
            let mut chains = self.chains.lock().await;
            Arc::clone(chains.entry(key.clone()).or_default())
        };

        let chain = cell
            .get_or_try_init(|| async {
                info!(key = %key, "creating QA chain");
                match self.factory.create(config).await {
                    Ok(chain) => Ok(Arc::new(chain)),
                    Err(e) => {
                        warn!(key = %key, error = %e, "QA chain creation failed");
                        Err(e)
                    }
                }
            })
            .await?;
        debug!(key = %key, "QA chain ready");
        Ok(Arc::clone(chain))
    }

    /// Drop every cached chain.
    pub async fn clear(&self) {
        let mut chains = self.chains.lock().await;
        let dropped = chains.len();
        chains.clear();
        info!(dropped, "chain cache cleared");
    }

    /// Number of chains constructed and cached.
    pub async fn len(&self) -> usize {
        self.chains.lock().await.values().filter(|cell| cell.initialized()).count()
    }

    /// Returns `true` if no chain is cached.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// The production [`ChainFactory`].
///
/// For each chain it:
///
/// 1. creates a [`ChatCompletionsClient`] for the configured backend, unless
///    a generator was supplied with [`with_generator`](Self::with_generator);
/// 2. creates the embedding provider for `config.embedding_kind`;
/// 3. loads the index from `settings.index_path`, or builds and persists it
///    from `settings.corpus_dir` when no index exists yet.
///
/// Loading and building are serialized, and chains whose embedding providers
/// share a fingerprint share one index handle.
#[derive(Clone)]
pub struct DefaultChainFactory {
    settings: IndexSettings,
    credentials: Credentials,
    prompt: PromptTemplate,
    generator: Option<Arc<dyn AnswerGenerator>>,
    indexes: Arc<Mutex<HashMap<String, Arc<RwLock<VectorIndex>>>>>,
}

impl std::fmt::Debug for DefaultChainFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultChainFactory")
            .field("settings", &self.settings)
            .field("credentials", &self.credentials)
            .field("generator", &self.generator.as_ref().map(|g| g.name().to_string()))
            .finish_non_exhaustive()
    }
}

impl DefaultChainFactory {
    /// Create a factory over one index location.
    pub fn new(settings: IndexSettings, credentials: Credentials) -> Self {
        Self {
            settings,
            credentials,
            prompt: PromptTemplate::default(),
            generator: None,
            indexes: Arc::default(),
        }
    }

    /// Use `prompt` for every chain.
    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    /// Use `generator` for every chain instead of a hosted backend.
    pub fn with_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    fn generator_for(&self, config: &ChainConfig) -> Result<Arc<dyn AnswerGenerator>> {
        if let Some(generator) = &self.generator {
            return Ok(Arc::clone(generator));
        }
        let key = self.credentials.require(config.backend_provider)?;
        let client = ChatCompletionsClient::new(ChatConfig::new(
            config.backend_provider,
            key,
            config.model_name.clone(),
        ))?;
        Ok(Arc::new(client))
    }

    /// The shared index for `provider`, loading or building it on first use.
    async fn index_for(
        &self,
        provider: &Arc<dyn EmbeddingProvider>,
    ) -> Result<Arc<RwLock<VectorIndex>>> {
        let mut indexes = self.indexes.lock().await;
        let fingerprint = provider.fingerprint();
        if let Some(index) = indexes.get(&fingerprint) {
            debug!(%fingerprint, "reusing loaded index");
            return Ok(Arc::clone(index));
        }

        let settings = &self.settings;
        let index = match load_index(&settings.index_path, provider.as_ref()) {
            Ok(index) => {
                info!(path = %settings.index_path.display(), entries = index.len(), "index loaded");
                index
            }
            Err(ChainError::Rag(RagError::IndexNotFound { path })) => {
                let Some(corpus_dir) = &settings.corpus_dir else {
                    return Err(RagError::IndexNotFound { path }.into());
                };
                info!(
                    path = %path.display(),
                    corpus = %corpus_dir.display(),
                    "no index found, building from corpus"
                );
                let documents = load_corpus(corpus_dir)?;
                build_index(&documents, settings, Arc::clone(provider)).await?
            }
            Err(e) => return Err(e),
        };

        let index = Arc::new(RwLock::new(index));
        indexes.insert(fingerprint, Arc::clone(&index));
        Ok(index)
    }
}

#[async_trait]
impl ChainFactory for DefaultChainFactory {
    async fn create(&self, config: &ChainConfig) -> Result<QaChain> {
        self.settings.validate()?;
        let generator = self.generator_for(config)?;
        let provider =
            embedding_provider(config.embedding_kind, &self.settings, &self.credentials).await?;
        let index = self.index_for(&provider).await?;

        let retriever = Retriever::shared(index, provider).await?;
        QaChain::builder()
            .config(config.clone())
            .retriever(retriever)
            .generator(generator)
            .prompt(self.prompt.clone())
            .index_path(self.settings.index_path.clone())
            .build()
    }
}
