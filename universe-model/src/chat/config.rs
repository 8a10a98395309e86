//! Connection settings for chat-completions backends.

use std::time::Duration;

use crate::error::{ModelError, Result};
use crate::provider::BackendProvider;

/// Default per-request timeout, covering the whole streamed response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for [`ChatCompletionsClient`](super::ChatCompletionsClient).
#[derive(Clone)]
pub struct ChatConfig {
    /// Which hosted backend this talks to.
    pub provider: BackendProvider,
    /// Bearer token.
    pub api_key: String,
    /// Model name sent with every request.
    pub model: String,
    /// API base URL, without the trailing `/chat/completions`.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ChatConfig {
    /// Create a config for `provider` with its default base URL.
    pub fn new(
        provider: BackendProvider,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: model.into(),
            base_url: provider.default_base_url().to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read the API key from the provider's environment variable.
    ///
    /// Uses the provider's default model when `model` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ConfigError`] if the variable is unset or empty.
    pub fn from_env(provider: BackendProvider, model: Option<&str>) -> Result<Self> {
        let var = provider.api_key_env();
        let api_key = std::env::var(var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ModelError::ConfigError(format!("{var} environment variable not set")))?;
        Ok(Self::new(provider, api_key, model.unwrap_or(provider.default_model())))
    }

    /// Point at an OpenAI-compatible endpoint other than the provider default.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
