//! OpenAI-compatible chat-completions backends (Zhipu, OpenAI).

mod client;
mod config;

pub use client::ChatCompletionsClient;
pub use config::{ChatConfig, DEFAULT_TIMEOUT};
