//! The question-answering prompt.

use crate::error::{ChainError, Result};

const CONTEXT: &str = "{context}";
const QUESTION: &str = "{question}";

/// Prompt used when none is configured.
pub const DEFAULT_QA_TEMPLATE: &str = "You are a professional (G)I-DLE knowledge assistant. \
Answer the user's question based on the context below.

Context: {context}
Question: {question}

Answer accurately, concisely and in a friendly tone. If you don't know the answer, say you don't know.

Answer:";

/// A prompt with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_QA_TEMPLATE.to_string() }
    }
}

impl PromptTemplate {
    /// Validate and wrap `template`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Config`] unless both placeholders appear.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT, QUESTION] {
            if !template.contains(placeholder) {
                return Err(ChainError::Config(format!(
                    "prompt template is missing the {placeholder} placeholder"
                )));
            }
        }
        Ok(Self { template })
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute both placeholders in one pass.
    ///
    /// Placeholder-like text inside `context` or `question` is left alone.
    pub fn render(&self, context: &str, question: &str) -> String {
        self.template
            .split(CONTEXT)
            .map(|piece| piece.replace(QUESTION, question))
            .collect::<Vec<_>>()
            .join(context)
    }
}
