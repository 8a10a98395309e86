//! The closed set of hosted chat backends.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Zhipu AI's OpenAI-compatible endpoint.
pub const ZHIPU_API_BASE: &str = "https://open.bigmodel.cn/api/paas/v4";

/// The OpenAI API.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// A hosted chat-completions backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Zhipu AI (GLM models).
    Zhipu,
    /// OpenAI (GPT models).
    #[serde(rename = "openai")]
    OpenAI,
}

impl BackendProvider {
    /// The canonical configuration string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendProvider::Zhipu => "zhipu",
            BackendProvider::OpenAI => "openai",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            BackendProvider::Zhipu => "glm-4-flash",
            BackendProvider::OpenAI => "gpt-3.5-turbo",
        }
    }

    /// Models known to work with the chat-completions endpoint.
    pub fn supported_models(&self) -> &'static [&'static str] {
        match self {
            BackendProvider::Zhipu => &["glm-4-flash", "glm-4-air", "glm-4-plus", "glm-4"],
            BackendProvider::OpenAI => &["gpt-3.5-turbo", "gpt-4", "gpt-4-turbo", "gpt-4o-mini"],
        }
    }

    /// API base URL.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            BackendProvider::Zhipu => ZHIPU_API_BASE,
            BackendProvider::OpenAI => OPENAI_API_BASE,
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            BackendProvider::Zhipu => "ZHIPUAI_API_KEY",
            BackendProvider::OpenAI => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for BackendProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendProvider {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zhipu" | "zhipuai" => Ok(BackendProvider::Zhipu),
            "openai" => Ok(BackendProvider::OpenAI),
            other => Err(ModelError::ConfigError(format!("unsupported model provider: {other}"))),
        }
    }
}
