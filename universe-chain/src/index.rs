//! Building and loading the knowledge-base index.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use universe_rag::{
    Chunk, Chunker, Document, EmbeddingKind, EmbeddingProvider, HashingEmbeddingProvider,
    IndexDescriptor, RagError, RecursiveChunker, VectorIndex,
};

use crate::config::{Credentials, IndexSettings};
use crate::error::{ChainError, Result};

/// Create the embedding provider for `kind`.
///
/// # Errors
///
/// Returns [`ChainError::Config`] if a required key is missing or the crate
/// was built without the backend's feature, and
/// [`RagError::EmbeddingUnavailable`] if a local model cannot be loaded.
pub async fn embedding_provider(
    kind: EmbeddingKind,
    settings: &IndexSettings,
    credentials: &Credentials,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match kind {
        EmbeddingKind::Hashing => Arc::new(HashingEmbeddingProvider::new(settings.hashing_dimensions)),
        EmbeddingKind::OpenAI => openai_provider(credentials)?,
        EmbeddingKind::Local => local_provider(settings).await?,
    };
    debug!(%kind, fingerprint = %provider.fingerprint(), "embedding provider ready");
    Ok(provider)
}

#[cfg(feature = "openai")]
fn openai_provider(credentials: &Credentials) -> Result<Arc<dyn EmbeddingProvider>> {
    let key = credentials.require(universe_model::BackendProvider::OpenAI)?;
    Ok(Arc::new(universe_rag::openai::OpenAIEmbeddingProvider::new(key)?))
}

#[cfg(not(feature = "openai"))]
fn openai_provider(_credentials: &Credentials) -> Result<Arc<dyn EmbeddingProvider>> {
    Err(ChainError::Config("OpenAI embeddings require the `openai` feature".into()))
}

#[cfg(feature = "fastembed")]
async fn local_provider(settings: &IndexSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider =
        universe_rag::local::LocalEmbeddingProvider::new(settings.model_cache_dir.clone()).await?;
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "fastembed"))]
async fn local_provider(_settings: &IndexSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    Err(ChainError::Config("local embeddings require the `fastembed` feature".into()))
}

/// Chunk, embed and index `documents`, then persist the index to
/// `settings.index_path`.
///
/// # Errors
///
/// - [`ChainError::Config`] for invalid settings.
/// - [`RagError::EmptyCorpus`] if the documents produce no chunks.
/// - [`RagError::EmbeddingUnavailable`] if the provider fails.
/// - [`RagError::Io`] if the index cannot be written.
pub async fn build_index(
    documents: &[Document],
    settings: &IndexSettings,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<VectorIndex> {
    settings.validate()?;
    let chunker = RecursiveChunker::new(settings.chunk_size, settings.chunk_overlap)?;

    let mut chunks: Vec<Chunk> = documents.iter().flat_map(|doc| chunker.chunk(doc)).collect();
    if chunks.is_empty() {
        return Err(RagError::EmptyCorpus.into());
    }
    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        provider = provider.name(),
        "embedding corpus"
    );

    let total = chunks.len();
    let mut embedded = 0;
    for batch in chunks.chunks_mut(settings.embed_batch_size) {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let embeddings = provider.embed_batch(&texts).await?;
        for (chunk, embedding) in batch.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }
        embedded += batch.len();
        debug!(embedded, total, "embedded batch");
    }

    let mut index = VectorIndex::new(IndexDescriptor::for_provider(provider.as_ref()));
    index.build(chunks)?;
    index.persist(&settings.index_path)?;
    Ok(index)
}

/// Load the index persisted at `path` for use with `provider`.
///
/// # Errors
///
/// [`RagError::IndexNotFound`] or [`RagError::CorruptIndex`], see
/// [`VectorIndex::load`].
pub fn load_index(path: impl AsRef<Path>, provider: &dyn EmbeddingProvider) -> Result<VectorIndex> {
    VectorIndex::open(path, IndexDescriptor::for_provider(provider)).map_err(ChainError::from)
}
