//! Data types for documents, chunks, and search results.

use serde::{Deserialize, Serialize};

/// Fallback source label for chunks whose document carries no source.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Provenance attached to a [`Document`] and inherited by its chunks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Where the text came from (URL or file path).
    #[serde(default)]
    pub source: String,
    /// Human-readable title.
    #[serde(default)]
    pub title: String,
    /// Capture time as reported by the producer, kept verbatim.
    #[serde(default)]
    pub timestamp: String,
    /// Language code of the content.
    #[serde(default)]
    pub language: String,
}

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub content: String,
    /// Provenance of the document.
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a document with empty metadata.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), content: content.into(), metadata: DocumentMetadata::default() }
    }

    /// Set the document's source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = source.into();
        self
    }

    /// Set the document's title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = title.into();
        self
    }

    /// Set the document's language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.metadata.language = language.into();
        self
    }
}

/// A segment of a [`Document`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk, `{document_id}_{sequence_index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of this chunk within its parent document.
    pub sequence_index: usize,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Empty until embedded.
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Metadata inherited from the parent document.
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Chunk {
    /// The source label reported to callers.
    pub fn source(&self) -> &str {
        if self.metadata.source.is_empty() { UNKNOWN_SOURCE } else { &self.metadata.source }
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The cosine similarity score (higher is more relevant).
    pub score: f32,
}

/// One exchange in a chat session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    /// What the user asked.
    pub user_message: String,
    /// What the assistant replied.
    pub assistant_message: String,
}

impl ConversationTurn {
    /// Create a turn from a user message and the assistant's reply.
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self { user_message: user.into(), assistant_message: assistant.into() }
    }
}
