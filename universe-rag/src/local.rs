//! Local sentence-embedding provider backed by `fastembed`.
//!
//! This module is only available when the `fastembed` feature is enabled.
//! Model files are downloaded into the cache directory on first use; all
//! inference runs on tokio's blocking pool.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{debug, info};

use crate::embedding::{EmbeddingProvider, verify_batch};
use crate::error::{RagError, Result};

const PROVIDER: &str = "fastembed";

/// An [`EmbeddingProvider`] running a sentence-embedding model in-process.
///
/// Defaults to `BAAI/bge-small-zh-v1.5`, a compact bilingual model suited to
/// the Chinese/English corpus.
///
/// # Example
///
/// ```rust,ignore
/// use universe_rag::local::LocalEmbeddingProvider;
///
/// let provider = LocalEmbeddingProvider::new(None).await?;
/// let embedding = provider.embed("(G)I-DLE 出道于 2018 年").await?;
/// ```
pub struct LocalEmbeddingProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl LocalEmbeddingProvider {
    /// Load the default model, caching files under `cache_dir` if given.
    pub async fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
        Self::with_model(EmbeddingModel::BGESmallZHV15, cache_dir).await
    }

    /// Load a specific fastembed model.
    ///
    /// The output width is probed once at load time.
    pub async fn with_model(model: EmbeddingModel, cache_dir: Option<PathBuf>) -> Result<Self> {
        let model_name = format!("{model:?}");
        info!(provider = PROVIDER, model = %model_name, "loading local embedding model");

        let (model, dimensions) = tokio::task::spawn_blocking(move || {
            let mut options = InitOptions::new(model).with_show_download_progress(false);
            if let Some(dir) = cache_dir {
                options = options.with_cache_dir(dir);
            }
            let embedder = TextEmbedding::try_new(options)
                .map_err(|e| RagError::ConfigError(format!("failed to load model: {e}")))?;
            let probe = embedder
                .embed(vec!["probe"], None)
                .map_err(|e| RagError::unavailable(PROVIDER, format!("probe failed: {e}")))?;
            let dimensions = probe.first().map(Vec::len).unwrap_or_default();
            Ok::<_, RagError>((embedder, dimensions))
        })
        .await
        .map_err(|e| RagError::unavailable(PROVIDER, format!("loader task failed: {e}")))??;

        info!(provider = PROVIDER, model = %model_name, dimensions, "local embedding model ready");
        Ok(Self { model: Arc::new(model), model_name, dimensions })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::unavailable(PROVIDER, "model returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");

        let model = Arc::clone(&self.model);
        let owned: Vec<String> = texts.iter().map(|t| (*t).to_string()).collect();
        let vectors = tokio::task::spawn_blocking(move || model.embed(owned, None))
            .await
            .map_err(|e| RagError::unavailable(PROVIDER, format!("inference task failed: {e}")))?
            .map_err(|e| RagError::unavailable(PROVIDER, format!("inference failed: {e}")))?;

        verify_batch(PROVIDER, texts.len(), self.dimensions, &vectors)?;
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn fingerprint(&self) -> String {
        format!("fastembed:{}:{}", self.model_name, self.dimensions)
    }
}
