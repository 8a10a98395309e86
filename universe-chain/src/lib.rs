//! # universe-chain
//!
//! Question answering over the Universe knowledge base.
//!
//! ## Overview
//!
//! - [`QaChain`] - retrieve, prompt and generate for one question
//! - [`ChainManager`] - one cached chain per provider, model and embedding kind
//! - [`DefaultChainFactory`] - loads or builds the index and connects the backend
//! - [`build_index`] / [`load_index`] - index entry points
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use universe_chain::{ChainConfig, ChainManager, Credentials, DefaultChainFactory, IndexSettings};
//!
//! let factory = DefaultChainFactory::new(IndexSettings::default(), Credentials::from_env());
//! let manager = ChainManager::new(Arc::new(factory));
//!
//! let chain = manager.get_chain(&ChainConfig::default()).await?;
//! let result = chain.answer("What is (G)I-DLE's debut song?", &[]).await?;
//! println!("{}\n\nSources: {:?}", result.answer, result.sources);
//! ```

pub mod chain;
pub mod config;
pub mod error;
pub mod index;
pub mod manager;
pub mod prompt;

pub use chain::{APOLOGY, AnswerStream, ChainInfo, QaChain, QaChainBuilder, QueryResult};
pub use config::{
    ChainConfig, ChainConfigBuilder, ChainKey, Credentials, DEFAULT_MAX_OUTPUT_TOKENS,
    DEFAULT_TEMPERATURE, DEFAULT_TOP_K, IndexSettings,
};
pub use error::{ChainError, Result};
pub use index::{build_index, embedding_provider, load_index};
pub use manager::{ChainFactory, ChainManager, DefaultChainFactory};
pub use prompt::{DEFAULT_QA_TEMPLATE, PromptTemplate};
