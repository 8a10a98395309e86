//! The answer-generation capability shared by every backend.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// One item of a generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// A piece of answer text.
    Text(String),
    /// The backend failed. Always the last item of its stream.
    Error(String),
}

/// A lazy, finite, single-use stream of answer fragments.
///
/// Nothing is sent to the backend until the stream is first polled, and
/// dropping it abandons the request.
pub type TextStream = Pin<Box<dyn Stream<Item = Fragment> + Send>>;

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on the number of generated tokens.
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { temperature: 0.1, max_output_tokens: 2048 }
    }
}

/// A fully rendered prompt plus its sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The prompt sent as a single user message.
    pub prompt: String,
    /// Sampling parameters honored by every backend.
    pub config: GenerationConfig,
}

impl GenerationRequest {
    /// Create a request with the default [`GenerationConfig`].
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), config: GenerationConfig::default() }
    }

    /// Replace the sampling parameters.
    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }
}

/// Produces answers from prompts, either all at once or as a stream.
///
/// Backends implement [`generate_stream`](AnswerGenerator::generate_stream);
/// the default [`generate`](AnswerGenerator::generate) drains that stream, so
/// the concatenated text fragments of a successful stream always equal the
/// non-streaming answer.
///
/// # Example
///
/// ```rust,ignore
/// use futures::StreamExt;
/// use universe_model::{AnswerGenerator, Fragment, GenerationRequest};
///
/// let mut stream = generator.generate_stream(GenerationRequest::new("Who are (G)I-DLE?"));
/// while let Some(fragment) = stream.next().await {
///     if let Fragment::Text(text) = fragment {
///         print!("{text}");
///     }
/// }
/// ```
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Stream the answer to `request`.
    ///
    /// A failure is reported as exactly one terminal [`Fragment::Error`].
    fn generate_stream(&self, request: GenerationRequest) -> TextStream;

    /// Produce the whole answer to `request`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::GenerationFailed`] if the stream ends with an error.
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let backend = self.name().to_string();
        collect_text(&backend, self.generate_stream(request)).await
    }
}

/// Drain `stream` into a `String`, failing on the first error fragment.
pub async fn collect_text(backend: &str, mut stream: TextStream) -> Result<String> {
    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        match fragment {
            Fragment::Text(text) => answer.push_str(&text),
            Fragment::Error(message) => return Err(ModelError::generation(backend, message)),
        }
    }
    Ok(answer)
}
