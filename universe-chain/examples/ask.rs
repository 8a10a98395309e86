//! Ask the knowledge base a question from the command line.
//!
//! ```bash
//! export ZHIPUAI_API_KEY=...
//! cargo run -p universe-chain --example ask -- "When did (G)I-DLE debut?"
//! ```
//!
//! The index is loaded from `vector_db/index.json`, or built from
//! `knowledge_db/` on first run.

use std::sync::Arc;

use anyhow::Context;
use universe_chain::{ChainConfig, ChainManager, Credentials, DefaultChainFactory, IndexSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = universe_telemetry::init("universe-ask");

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        anyhow::bail!("usage: ask <question>");
    }

    let factory = DefaultChainFactory::new(IndexSettings::default(), Credentials::from_env());
    let manager = ChainManager::new(Arc::new(factory));
    let chain = manager
        .get_chain(&ChainConfig::default())
        .await
        .context("failed to prepare the QA chain")?;

    let result = chain.answer(&question, &[]).await?;
    println!("{}\n", result.answer);
    for (rank, source) in result.sources.iter().enumerate() {
        println!("[{}] {source}", rank + 1);
    }
    Ok(())
}
