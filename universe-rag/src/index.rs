//! Persistent vector index with exact cosine-similarity search.
//!
//! [`VectorIndex`] owns the embedded chunks of one corpus. It moves through
//! [`IndexState`]: `Empty → Building → Ready` on [`build`](VectorIndex::build)
//! and `Empty → Loading → Ready` on [`load`](VectorIndex::load); a ready index
//! can be rebuilt or reloaded in place. Failed transitions restore the
//! previous state and entries.
//!
//! Search is a linear scan: the corpus is small, and an exact scan is
//! deterministic for a static index. Scores are cosine similarities and ties
//! keep insertion order.
//!
//! # On-disk format
//!
//! A single JSON document:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "dimensions": 512,
//!   "provider": "hashing-v1:512",
//!   "created_at": "2025-01-01T00:00:00Z",
//!   "entries": [ { "id": "doc_0", "document_id": "doc", "sequence_index": 0, ... } ]
//! }
//! ```

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::document::{Chunk, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Version of the persisted layout written by [`VectorIndex::persist`].
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// What an index was built with. Two indexes are interchangeable only if
/// their descriptors are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Width of every stored vector.
    pub dimensions: usize,
    /// Fingerprint of the embedding provider.
    pub provider: String,
}

impl IndexDescriptor {
    /// Create a descriptor from raw parts.
    pub fn new(dimensions: usize, provider: impl Into<String>) -> Self {
        Self { dimensions, provider: provider.into() }
    }

    /// Describe indexes built with `provider`.
    pub fn for_provider(provider: &dyn EmbeddingProvider) -> Self {
        Self::new(provider.dimensions(), provider.fingerprint())
    }
}

/// Lifecycle state of a [`VectorIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// No entries; queries return nothing.
    Empty,
    /// Entries are being validated and installed.
    Building,
    /// A persisted index is being read.
    Loading,
    /// Entries are installed and searchable.
    Ready,
}

#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    format_version: u32,
    dimensions: usize,
    provider: &'a str,
    created_at: DateTime<Utc>,
    entries: &'a [Chunk],
}

#[derive(Deserialize)]
struct PersistedIndex {
    format_version: u32,
    dimensions: usize,
    provider: String,
    entries: Vec<Chunk>,
}

/// An in-memory vector index that can be persisted to and loaded from disk.
///
/// # Example
///
/// ```rust,ignore
/// use universe_rag::{IndexDescriptor, VectorIndex};
///
/// let mut index = VectorIndex::new(IndexDescriptor::for_provider(&provider));
/// index.build(embedded_chunks)?;
/// index.persist("vector_db/index.json")?;
///
/// let results = index.query(&query_vector, 4)?;
/// ```
#[derive(Debug, Clone)]
pub struct VectorIndex {
    descriptor: IndexDescriptor,
    state: IndexState,
    entries: Vec<Chunk>,
    /// L2 norm of each entry's embedding, parallel to `entries`.
    norms: Vec<f32>,
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

impl VectorIndex {
    /// Create an empty index for vectors described by `descriptor`.
    pub fn new(descriptor: IndexDescriptor) -> Self {
        Self { descriptor, state: IndexState::Empty, entries: Vec::new(), norms: Vec::new() }
    }

    /// Load a persisted index, failing unless it matches `descriptor`.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn open(path: impl AsRef<Path>, descriptor: IndexDescriptor) -> Result<Self> {
        let mut index = Self::new(descriptor);
        index.load(path)?;
        Ok(index)
    }

    /// The descriptor this index enforces.
    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    /// The current lifecycle state.
    pub fn state(&self) -> IndexState {
        self.state
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The stored chunks in insertion order.
    pub fn entries(&self) -> &[Chunk] {
        &self.entries
    }

    /// Replace the index contents with `chunks`.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyCorpus`] if `chunks` is empty.
    /// - [`RagError::DimensionMismatch`] if any embedding has the wrong width.
    /// - [`RagError::ConfigError`] if any embedding has a non-finite component.
    ///
    /// On error the previous state and entries are kept.
    pub fn build(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            error!(provider = %self.descriptor.provider, "refusing to build an index from an empty corpus");
            return Err(RagError::EmptyCorpus);
        }

        let previous = self.state;
        self.state = IndexState::Building;
        match self.validate_entries(&chunks) {
            Ok(norms) => {
                self.entries = chunks;
                self.norms = norms;
                self.state = IndexState::Ready;
                info!(
                    entries = self.entries.len(),
                    dimensions = self.descriptor.dimensions,
                    provider = %self.descriptor.provider,
                    "vector index built"
                );
                Ok(())
            }
            Err(e) => {
                self.state = previous;
                error!(error = %e, "vector index build failed");
                Err(e)
            }
        }
    }

    fn validate_entries(&self, chunks: &[Chunk]) -> Result<Vec<f32>> {
        chunks
            .iter()
            .map(|chunk| {
                if chunk.embedding.len() != self.descriptor.dimensions {
                    return Err(RagError::DimensionMismatch {
                        expected: self.descriptor.dimensions,
                        actual: chunk.embedding.len(),
                    });
                }
                if chunk.embedding.iter().any(|x| !x.is_finite()) {
                    return Err(RagError::ConfigError(format!(
                        "chunk '{}' has a non-finite embedding",
                        chunk.id
                    )));
                }
                Ok(l2_norm(&chunk.embedding))
            })
            .collect()
    }

    /// Write the index to `path` as a single JSON file.
    ///
    /// The file is written to a uniquely named sibling and renamed into
    /// place, so readers never observe a partial index and concurrent
    /// writers never share a temp file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the index is not ready, and
    /// [`RagError::Io`] / [`RagError::Serialization`] on write failures.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.state != IndexState::Ready {
            return Err(RagError::ConfigError(format!(
                "cannot persist an index in state {:?}",
                self.state
            )));
        }

        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;

        let persisted = PersistedIndexRef {
            format_version: INDEX_FORMAT_VERSION,
            dimensions: self.descriptor.dimensions,
            provider: &self.descriptor.provider,
            created_at: Utc::now(),
            entries: &self.entries,
        };

        // Each writer gets its own temp file; it is removed if anything fails.
        let bytes = serde_json::to_vec(&persisted)?;
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| RagError::io(parent, e))?;
        tmp.write_all(&bytes).map_err(|e| RagError::io(tmp.path().to_path_buf(), e))?;
        tmp.as_file().sync_all().map_err(|e| RagError::io(tmp.path().to_path_buf(), e))?;
        tmp.persist(path).map_err(|e| RagError::io(path, e.error))?;

        info!(path = %path.display(), entries = self.entries.len(), "vector index persisted");
        Ok(())
    }

    /// Replace the index contents with the index persisted at `path`.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFound`] if `path` does not exist.
    /// - [`RagError::CorruptIndex`] if the file cannot be parsed, has an
    ///   unknown format version, was built with a different provider or
    ///   dimensionality, or holds malformed entries.
    /// - [`RagError::Io`] if the file cannot be read.
    ///
    /// On error the previous state and entries are kept.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RagError::IndexNotFound { path: path.to_path_buf() });
        }

        let previous = self.state;
        self.state = IndexState::Loading;
        match self.read_persisted(path) {
            Ok((entries, norms)) => {
                self.entries = entries;
                self.norms = norms;
                self.state = IndexState::Ready;
                info!(path = %path.display(), entries = self.entries.len(), "vector index loaded");
                Ok(())
            }
            Err(e) => {
                self.state = previous;
                error!(path = %path.display(), error = %e, "vector index load failed");
                Err(e)
            }
        }
    }

    fn read_persisted(&self, path: &Path) -> Result<(Vec<Chunk>, Vec<f32>)> {
        let bytes = fs::read(path).map_err(|e| RagError::io(path, e))?;
        let persisted: PersistedIndex = serde_json::from_slice(&bytes)
            .map_err(|e| RagError::corrupt(path, format!("unreadable index file: {e}")))?;

        if persisted.format_version != INDEX_FORMAT_VERSION {
            return Err(RagError::corrupt(
                path,
                format!("unsupported format version {}", persisted.format_version),
            ));
        }
        if persisted.dimensions != self.descriptor.dimensions {
            return Err(RagError::corrupt(
                path,
                format!(
                    "stored dimensionality {} does not match the active provider ({})",
                    persisted.dimensions, self.descriptor.dimensions
                ),
            ));
        }
        if persisted.provider != self.descriptor.provider {
            return Err(RagError::corrupt(
                path,
                format!(
                    "index was built with '{}', active provider is '{}'",
                    persisted.provider, self.descriptor.provider
                ),
            ));
        }
        if persisted.entries.is_empty() {
            return Err(RagError::corrupt(path, "index holds no entries"));
        }

        let norms = self
            .validate_entries(&persisted.entries)
            .map_err(|e| RagError::corrupt(path, format!("malformed entry: {e}")))?;
        Ok((persisted.entries, norms))
    }

    /// Return up to `k` entries most similar to `vector`, best first.
    ///
    /// An empty index yields an empty result.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidK`] if `k == 0`.
    /// - [`RagError::DimensionMismatch`] if `vector` has the wrong width.
    /// - [`RagError::ConfigError`] if `vector` has a non-finite component.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(RagError::InvalidK(k));
        }
        if vector.len() != self.descriptor.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.descriptor.dimensions,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(RagError::ConfigError("query vector has a non-finite component".into()));
        }
        if self.state != IndexState::Ready {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(vector);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(i, (chunk, norm))| {
                let score = if query_norm == 0.0 || *norm == 0.0 {
                    0.0
                } else {
                    dot(&chunk.embedding, vector) / (query_norm * norm)
                };
                (i, score)
            })
            .collect();

        // Stable sort: equal scores stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        debug!(k, returned = scored.len(), "vector index query");
        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchResult { chunk: self.entries[i].clone(), score })
            .collect())
    }
}
