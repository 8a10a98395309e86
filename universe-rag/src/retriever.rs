//! Query-time retrieval over a shared [`VectorIndex`].

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::{IndexDescriptor, VectorIndex};

/// Embeds query text and looks it up in a vector index.
///
/// The index is shared behind an `RwLock`, so a rebuild or reload performed
/// through [`index`](Retriever::index) is seen by later retrievals.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use universe_rag::{HashingEmbeddingProvider, Retriever};
///
/// let retriever = Retriever::new(index, Arc::new(HashingEmbeddingProvider::default()))?;
/// let results = retriever.retrieve("When did (G)I-DLE debut?", 4).await?;
/// ```
#[derive(Clone)]
pub struct Retriever {
    index: Arc<RwLock<VectorIndex>>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever").field("provider", &self.provider.fingerprint()).finish()
    }
}

fn check_compatible(descriptor: &IndexDescriptor, provider: &dyn EmbeddingProvider) -> Result<()> {
    if provider.dimensions() != descriptor.dimensions {
        return Err(RagError::DimensionMismatch {
            expected: descriptor.dimensions,
            actual: provider.dimensions(),
        });
    }
    let fingerprint = provider.fingerprint();
    if fingerprint != descriptor.provider {
        return Err(RagError::ConfigError(format!(
            "index was built with '{}', retriever uses '{fingerprint}'",
            descriptor.provider
        )));
    }
    Ok(())
}

impl Retriever {
    /// Wrap `index` for retrieval with `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the provider's width differs
    /// from the index, or [`RagError::ConfigError`] if the index was built with
    /// a different provider.
    pub fn new(index: VectorIndex, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        check_compatible(index.descriptor(), provider.as_ref())?;
        Ok(Self { index: Arc::new(RwLock::new(index)), provider })
    }

    /// Retrieve from an index that is already shared with other owners.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub async fn shared(
        index: Arc<RwLock<VectorIndex>>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        check_compatible(index.read().await.descriptor(), provider.as_ref())?;
        Ok(Self { index, provider })
    }

    /// The shared index handle.
    pub fn index(&self) -> Arc<RwLock<VectorIndex>> {
        Arc::clone(&self.index)
    }

    /// The embedding provider used for queries.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Number of entries currently in the index.
    pub async fn index_len(&self) -> usize {
        self.index.read().await.len()
    }

    /// Return up to `k` chunks most similar to `query`, best first.
    ///
    /// An empty index yields an empty list without calling the provider.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidK`] if `k == 0`.
    /// - [`RagError::EmbeddingUnavailable`] if the provider fails.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(RagError::InvalidK(k));
        }
        if self.index.read().await.is_empty() {
            debug!(k, "retrieval skipped, index is empty");
            return Ok(Vec::new());
        }

        debug!(provider = self.provider.name(), query_len = query.len(), "embedding query");
        let vector = self.provider.embed(query).await?;

        let results = self.index.read().await.query(&vector, k)?;
        debug!(k, returned = results.len(), "retrieval complete");
        Ok(results)
    }
}
