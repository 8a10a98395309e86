//! Embedding provider trait for generating vector embeddings from text.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. The output dimensionality is fixed per instance, and
/// [`embed_batch`](EmbeddingProvider::embed_batch) returns exactly one vector
/// per input, in input order.
///
/// The default [`embed_batch`](EmbeddingProvider::embed_batch) implementation
/// calls [`embed`](EmbeddingProvider::embed) sequentially; backends that
/// support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use universe_rag::{EmbeddingProvider, HashingEmbeddingProvider};
///
/// let provider = HashingEmbeddingProvider::new(256);
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Identity persisted alongside an index so that an index built with one
    /// provider is never queried with another.
    fn fingerprint(&self) -> String {
        format!("{}:{}", self.name(), self.dimensions())
    }
}

/// Check that a provider response has one vector per input, each of the
/// advertised width.
pub fn verify_batch(
    provider: &str,
    expected_len: usize,
    dimensions: usize,
    vectors: &[Vec<f32>],
) -> Result<()> {
    if vectors.len() != expected_len {
        return Err(RagError::unavailable(
            provider,
            format!("expected {expected_len} embeddings, got {}", vectors.len()),
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(RagError::unavailable(
            provider,
            format!("expected {dimensions}-dimensional embeddings, got {}", bad.len()),
        ));
    }
    Ok(())
}

/// The closed set of embedding backends a chain can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingKind {
    /// Local feature-hashing encoder ([`HashingEmbeddingProvider`]).
    Hashing,
    /// Local sentence-embedding model (requires the `fastembed` feature).
    Local,
    /// Remote OpenAI embeddings API (requires the `openai` feature).
    #[serde(rename = "openai")]
    OpenAI,
}

impl EmbeddingKind {
    /// The canonical configuration string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingKind::Hashing => "hashing",
            EmbeddingKind::Local => "local",
            EmbeddingKind::OpenAI => "openai",
        }
    }
}

impl fmt::Display for EmbeddingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashing" => Ok(EmbeddingKind::Hashing),
            "local" | "m3e" => Ok(EmbeddingKind::Local),
            "openai" => Ok(EmbeddingKind::OpenAI),
            other => Err(RagError::ConfigError(format!("unsupported embedding kind: {other}"))),
        }
    }
}

/// Default width of [`HashingEmbeddingProvider`] vectors.
pub const DEFAULT_HASHING_DIMENSIONS: usize = 512;

/// A local, deterministic encoder based on the hashing trick.
///
/// Each text is lowercased and split into word tokens; every token and every
/// character trigram of `#token#` is hashed (FNV-1a) into a signed bucket.
/// The resulting vector is L2-normalized. No model files and no network are
/// needed, and identical text always yields identical vectors across
/// processes, which makes persisted indexes reloadable.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider producing `dimensions`-wide vectors.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();

        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            self.accumulate(&mut vector, token.as_bytes(), 1.0);

            let padded: Vec<char> = std::iter::once('#')
                .chain(token.chars())
                .chain(std::iter::once('#'))
                .collect();
            for window in padded.windows(3) {
                let gram: String = window.iter().collect();
                self.accumulate(&mut vector, gram.as_bytes(), 0.5);
            }
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSIONS)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.encode(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.encode(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing-v1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn hashing_is_deterministic_and_normalized() {
        let provider = HashingEmbeddingProvider::new(128);
        let a = provider.embed("(G)I-DLE debuted in 2018").await.unwrap();
        let b = provider.embed("(G)I-DLE debuted in 2018").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn overlapping_text_scores_higher() {
        let provider = HashingEmbeddingProvider::default();
        let query = provider.embed("when did they debut").await.unwrap();
        let related = provider.embed("the group will debut with latata").await.unwrap();
        let unrelated = provider.embed("pepperoni pizza recipe").await.unwrap();
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let provider = HashingEmbeddingProvider::new(64);
        let batch = provider.embed_batch(&["alpha", "beta"]).await.unwrap();
        assert_eq!(batch[0], provider.embed("alpha").await.unwrap());
        assert_eq!(batch[1], provider.embed("beta").await.unwrap());
    }

    #[tokio::test]
    async fn text_without_tokens_is_a_zero_vector() {
        let provider = HashingEmbeddingProvider::new(16);
        assert!(provider.embed("  ...  ").await.unwrap().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn fingerprint_includes_dimensions() {
        assert_eq!(HashingEmbeddingProvider::new(32).fingerprint(), "hashing-v1:32");
    }

    #[test]
    fn embedding_kind_parses_aliases() {
        assert_eq!("m3e".parse::<EmbeddingKind>().unwrap(), EmbeddingKind::Local);
        assert_eq!("OpenAI".parse::<EmbeddingKind>().unwrap(), EmbeddingKind::OpenAI);
        assert_eq!("hashing".parse::<EmbeddingKind>().unwrap(), EmbeddingKind::Hashing);
        assert!("word2vec".parse::<EmbeddingKind>().is_err());
    }

    #[test]
    fn verify_batch_rejects_wrong_shapes() {
        assert!(verify_batch("p", 2, 3, &[vec![0.0; 3]]).is_err());
        assert!(verify_batch("p", 1, 3, &[vec![0.0; 2]]).is_err());
        assert!(verify_batch("p", 1, 3, &[vec![0.0; 3]]).is_ok());
    }
}
