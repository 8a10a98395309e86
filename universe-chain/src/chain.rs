//! The question-answering chain.
//!
//! [`QaChain`] composes a [`Retriever`], a [`PromptTemplate`] and an
//! [`AnswerGenerator`]:
//!
//! 1. fold recent conversation turns into the question;
//! 2. retrieve the `top_k` most similar chunks;
//! 3. join their texts into the context;
//! 4. render the prompt and generate the answer.
//!
//! Transient provider failures (embedding or generation) produce a degraded
//! [`QueryResult`] carrying an apology. Configuration and index errors are
//! returned as [`ChainError`].
//!
//! # Example
//!
//! ```rust,ignore
//! use universe_chain::{ChainConfig, QaChain};
//!
//! let chain = QaChain::builder()
//!     .config(ChainConfig::default())
//!     .retriever(retriever)
//!     .generator(Arc::new(client))
//!     .build()?;
//!
//! let result = chain.answer("When did (G)I-DLE debut?", &[]).await?;
//! println!("{} ({:?})", result.answer, result.sources);
//! ```

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use futures::stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use universe_model::{
    AnswerGenerator, BackendProvider, Fragment, GenerationConfig, GenerationRequest, TextStream,
};
use universe_rag::{ConversationTurn, EmbeddingKind, Retriever, SearchResult, enhance};

use crate::config::{ChainConfig, validate_temperature, validate_top_k};
use crate::error::{ChainError, Result};
use crate::prompt::PromptTemplate;

/// Prefix of every degraded answer.
pub const APOLOGY: &str = "Sorry, an error occurred while processing your question";

/// The outcome of [`QaChain::answer`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// The generated answer, or an apology when a provider failed.
    pub answer: String,
    /// Retrieved chunk texts joined by blank lines.
    pub context: String,
    /// Source of each retrieved chunk, in rank order.
    pub sources: Vec<String>,
}

impl QueryResult {
    /// The result reported when a provider failed.
    pub fn degraded(reason: impl std::fmt::Display) -> Self {
        Self { answer: format!("{APOLOGY}: {reason}"), context: String::new(), sources: Vec::new() }
    }

    /// Returns `true` if this result carries an apology instead of an answer.
    pub fn is_degraded(&self) -> bool {
        self.answer.starts_with(APOLOGY) && self.context.is_empty() && self.sources.is_empty()
    }
}

/// The outcome of [`QaChain::answer_stream`]: eagerly computed context and
/// sources plus the lazy answer stream.
pub struct AnswerStream {
    /// Retrieved chunk texts joined by blank lines.
    pub context: String,
    /// Source of each retrieved chunk, in rank order.
    pub sources: Vec<String>,
    /// The answer, fragment by fragment.
    pub fragments: TextStream,
}

impl std::fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerStream")
            .field("context", &self.context)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

impl AnswerStream {
    fn empty() -> Self {
        Self { context: String::new(), sources: Vec::new(), fragments: Box::pin(stream::empty()) }
    }

    fn failed(reason: String) -> Self {
        Self {
            context: String::new(),
            sources: Vec::new(),
            fragments: Box::pin(stream::iter([Fragment::Error(reason)])),
        }
    }

    /// Drain the stream into a [`QueryResult`].
    ///
    /// An error fragment yields [`QueryResult::degraded`], as
    /// [`QaChain::answer`] does.
    pub async fn into_result(self) -> QueryResult {
        use futures::StreamExt;

        let mut answer = String::new();
        let mut fragments = self.fragments;
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Fragment::Text(text) => answer.push_str(&text),
                Fragment::Error(reason) => return QueryResult::degraded(reason),
            }
        }
        QueryResult { answer, context: self.context, sources: self.sources }
    }
}

/// A snapshot of a chain's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Hosted chat backend.
    pub backend_provider: BackendProvider,
    /// Model name.
    pub model_name: String,
    /// Embedding backend.
    pub embedding_kind: EmbeddingKind,
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Generation budget.
    pub max_output_tokens: u32,
    /// Entries in the index.
    pub index_size: usize,
    /// Where the index is persisted, if known.
    pub index_path: Option<PathBuf>,
}

/// Join chunk texts into the context and collect their sources.
fn assemble(results: &[SearchResult]) -> (String, Vec<String>) {
    let context =
        results.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join("\n\n");
    let sources = results.iter().map(|r| r.chunk.source().to_string()).collect();
    (context, sources)
}

/// A question-answering chain over one index and one generator.
///
/// `top_k` and `temperature` can be adjusted between calls; each call works
/// on a snapshot taken when it starts.
pub struct QaChain {
    config: RwLock<ChainConfig>,
    retriever: Retriever,
    generator: Arc<dyn AnswerGenerator>,
    prompt: PromptTemplate,
    index_path: Option<PathBuf>,
}

impl std::fmt::Debug for QaChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QaChain")
            .field("config", &self.config())
            .field("generator", &self.generator.name())
            .field("index_path", &self.index_path)
            .finish_non_exhaustive()
    }
}

/// What a request needs once retrieval is done.
struct Prepared {
    request: GenerationRequest,
    context: String,
    sources: Vec<String>,
}

impl QaChain {
    /// Create a new [`QaChainBuilder`].
    pub fn builder() -> QaChainBuilder {
        QaChainBuilder::default()
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> ChainConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The retriever this chain queries.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Change the number of retrieved chunks for later calls.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidK`](universe_rag::RagError::InvalidK) if `top_k == 0`.
    pub fn set_top_k(&self, top_k: usize) -> Result<()> {
        validate_top_k(top_k)?;
        self.config.write().unwrap_or_else(PoisonError::into_inner).top_k = top_k;
        info!(top_k, "top_k updated");
        Ok(())
    }

    /// Change the sampling temperature for later calls.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Config`] if `temperature` is out of range.
    pub fn set_temperature(&self, temperature: f32) -> Result<()> {
        validate_temperature(temperature)?;
        self.config.write().unwrap_or_else(PoisonError::into_inner).temperature = temperature;
        info!(temperature, "temperature updated");
        Ok(())
    }

    /// Describe this chain.
    pub async fn info(&self) -> ChainInfo {
        let config = self.config();
        ChainInfo {
            backend_provider: config.backend_provider,
            model_name: config.model_name,
            embedding_kind: config.embedding_kind,
            top_k: config.top_k,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            index_size: self.retriever.index_len().await,
            index_path: self.index_path.clone(),
        }
    }

    /// Retrieve context and render the generation request.
    ///
    /// `Ok(Err(e))` carries a recoverable provider error.
    async fn prepare(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<std::result::Result<Prepared, ChainError>> {
        let config = self.config();
        let enhanced = enhance(question, history);

        let results = match self.retriever.retrieve(&enhanced, config.top_k).await {
            Ok(results) => results,
            Err(e) if e.is_recoverable() => return Ok(Err(e.into())),
            Err(e) => {
                error!(error = %e, "retrieval failed");
                return Err(e.into());
            }
        };
        if results.is_empty() {
            debug!("no chunks retrieved, answering without context");
        }

        let (context, sources) = assemble(&results);
        let prompt = self.prompt.render(&context, &enhanced);
        let request = GenerationRequest::new(prompt).with_config(GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        });
        Ok(Ok(Prepared { request, context, sources }))
    }

    /// Answer `question` in the context of `history`.
    ///
    /// A blank question returns an empty [`QueryResult`] without retrieval or
    /// generation.
    ///
    /// # Errors
    ///
    /// Configuration and index errors. Provider failures are reported
    /// through [`QueryResult::degraded`] instead.
    pub async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<QueryResult> {
        if question.trim().is_empty() {
            return Ok(QueryResult::default());
        }

        let prepared = match self.prepare(question, history).await? {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(error = %e, "embedding provider failed, returning degraded answer");
                return Ok(QueryResult::degraded(e));
            }
        };

        match self.generator.generate(prepared.request).await {
            Ok(answer) => {
                info!(
                    generator = self.generator.name(),
                    sources = prepared.sources.len(),
                    answer_len = answer.len(),
                    "question answered"
                );
                Ok(QueryResult { answer, context: prepared.context, sources: prepared.sources })
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "generation failed, returning degraded answer");
                Ok(QueryResult::degraded(e))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`answer`](Self::answer), but stream the answer text.
    ///
    /// Context and sources are computed before this returns. An embedding
    /// failure yields a stream holding a single error fragment and no sources.
    ///
    /// # Errors
    ///
    /// Configuration and index errors.
    pub async fn answer_stream(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<AnswerStream> {
        if question.trim().is_empty() {
            return Ok(AnswerStream::empty());
        }

        match self.prepare(question, history).await? {
            Ok(prepared) => Ok(AnswerStream {
                fragments: self.generator.generate_stream(prepared.request),
                context: prepared.context,
                sources: prepared.sources,
            }),
            Err(e) => {
                warn!(error = %e, "embedding provider failed, streaming an error");
                Ok(AnswerStream::failed(e.to_string()))
            }
        }
    }
}

/// Builder for [`QaChain`].
#[derive(Default)]
pub struct QaChainBuilder {
    config: Option<ChainConfig>,
    retriever: Option<Retriever>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    prompt: Option<PromptTemplate>,
    index_path: Option<PathBuf>,
}

impl QaChainBuilder {
    /// Set the chain configuration. Defaults to [`ChainConfig::default`].
    pub fn config(mut self, config: ChainConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the retriever (required).
    pub fn retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the answer generator (required).
    pub fn generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the prompt. Defaults to [`PromptTemplate::default`].
    pub fn prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Record where the index is persisted, for [`QaChain::info`].
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = Some(path.into());
        self
    }

    /// Build the [`QaChain`].
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Config`] if the retriever or generator is
    /// missing, or if the configuration is invalid.
    pub fn build(self) -> Result<QaChain> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let retriever = self
            .retriever
            .ok_or_else(|| ChainError::Config("a retriever is required".into()))?;
        let generator = self
            .generator
            .ok_or_else(|| ChainError::Config("an answer generator is required".into()))?;

        Ok(QaChain {
            config: RwLock::new(config),
            retriever,
            generator,
            prompt: self.prompt.unwrap_or_default(),
            index_path: self.index_path,
        })
    }
}
