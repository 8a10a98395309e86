//! Retrieval layer for the Universe knowledge-base QA system.
//!
//! This crate provides:
//! - Documents, chunks and character-based chunking strategies
//! - Embedding providers (feature hashing, local models, OpenAI)
//! - A persistent vector index with exact cosine search
//! - A retriever over a shared index
//! - Folding conversation history into a standalone question
//! - Loading the scraped corpus from disk
//!
//! ## Features
//!
//! - `openai` (default): [`openai::OpenAIEmbeddingProvider`]
//! - `fastembed`: [`local::LocalEmbeddingProvider`]
//! - `full`: everything

pub mod chunking;
pub mod context;
pub mod corpus;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod retriever;

#[cfg(feature = "fastembed")]
pub mod local;
#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker, split};
pub use context::{HISTORY_WINDOW, enhance};
pub use corpus::load_corpus;
pub use document::{
    Chunk, ConversationTurn, Document, DocumentMetadata, SearchResult, UNKNOWN_SOURCE,
};
pub use embedding::{
    DEFAULT_HASHING_DIMENSIONS, EmbeddingKind, EmbeddingProvider, HashingEmbeddingProvider,
    verify_batch,
};
pub use error::{RagError, Result};
pub use index::{INDEX_FORMAT_VERSION, IndexDescriptor, IndexState, VectorIndex};
pub use retriever::Retriever;
