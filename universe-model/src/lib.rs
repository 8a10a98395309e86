//! # universe-model
//!
//! Answer generators for the Universe knowledge-base QA system.
//!
//! ## Overview
//!
//! Every backend implements [`AnswerGenerator`], which streams
//! [`Fragment`]s for a [`GenerationRequest`]:
//!
//! - [`ChatCompletionsClient`] - Zhipu (GLM) and OpenAI (GPT) over the
//!   OpenAI-compatible `/chat/completions` endpoint with SSE streaming
//! - [`MockGenerator`] - offline generator for tests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use universe_model::{AnswerGenerator, BackendProvider, ChatCompletionsClient, GenerationRequest};
//!
//! let client = ChatCompletionsClient::from_env(BackendProvider::Zhipu, None)?;
//! let answer = client.generate(GenerationRequest::new("Who are (G)I-DLE?")).await?;
//! ```
//!
//! ## Supported Models
//!
//! | Provider | Default | Key variable |
//! |----------|---------|--------------|
//! | `zhipu` | `glm-4-flash` | `ZHIPUAI_API_KEY` |
//! | `openai` | `gpt-3.5-turbo` | `OPENAI_API_KEY` |

pub mod chat;
pub mod error;
pub mod generation;
pub mod mock;
pub mod provider;

pub use chat::{ChatCompletionsClient, ChatConfig};
pub use error::{ModelError, Result};
pub use generation::{
    AnswerGenerator, Fragment, GenerationConfig, GenerationRequest, TextStream, collect_text,
};
pub use mock::MockGenerator;
pub use provider::BackendProvider;
