//! Streaming chat-completions client.

use async_stream::stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::config::ChatConfig;
use crate::error::{ModelError, Result};
use crate::generation::{AnswerGenerator, Fragment, GenerationRequest, TextStream};
use crate::provider::BackendProvider;

/// [`AnswerGenerator`] for OpenAI-compatible `/chat/completions` endpoints.
///
/// Serves both Zhipu and OpenAI. Requests always stream (`"stream": true`);
/// the non-streaming [`generate`](AnswerGenerator::generate) drains the same
/// stream.
///
/// # Example
///
/// ```rust,ignore
/// use universe_model::{BackendProvider, ChatCompletionsClient, ChatConfig};
///
/// let client = ChatCompletionsClient::new(ChatConfig::new(
///     BackendProvider::Zhipu,
///     std::env::var("ZHIPUAI_API_KEY")?,
///     "glm-4-flash",
/// ))?;
/// ```
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    config: ChatConfig,
}

impl ChatCompletionsClient {
    /// Create a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ConfigError`] if the API key or model is empty.
    pub fn new(config: ChatConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ModelError::ConfigError(format!(
                "{} API key must not be empty",
                config.provider
            )));
        }
        if config.model.trim().is_empty() {
            return Err(ModelError::ConfigError("model name must not be empty".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Create a client whose key comes from the provider's environment variable.
    pub fn from_env(provider: BackendProvider, model: Option<&str>) -> Result<Self> {
        Self::new(ChatConfig::from_env(provider, model)?)
    }

    /// The backend this client talks to.
    pub fn provider(&self) -> BackendProvider {
        self.config.provider
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

// ── Chat completions wire types ────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

fn request_body(model: &str, request: &GenerationRequest) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage { role: "user", content: request.prompt.clone() }],
        temperature: request.config.temperature,
        max_tokens: request.config.max_output_tokens,
        stream: true,
    }
}

/// Decoded meaning of one SSE `data:` payload.
#[derive(Debug, PartialEq)]
enum Event {
    Text(String),
    Done,
    Failed(String),
}

fn decode_event(data: &str) -> Event {
    let data = data.trim();
    if data == "[DONE]" {
        return Event::Done;
    }
    match serde_json::from_str::<ChatChunk>(data) {
        Ok(ChatChunk { error: Some(err), .. }) => Event::Failed(err.message),
        Ok(chunk) => Event::Text(
            chunk.choices.into_iter().filter_map(|choice| choice.delta.content).collect(),
        ),
        Err(e) => Event::Failed(format!("malformed stream chunk: {e}")),
    }
}

#[async_trait]
impl AnswerGenerator for ChatCompletionsClient {
    fn name(&self) -> &str {
        self.config.provider.as_str()
    }

    fn generate_stream(&self, request: GenerationRequest) -> TextStream {
        let http = self.http.clone();
        let url = format!("{}/chat/completions", self.config.base_url);
        let api_key = self.config.api_key.clone();
        let provider = self.config.provider;
        let body = request_body(&self.config.model, &request);

        Box::pin(stream! {
            debug!(
                %provider,
                prompt_len = request.prompt.len(),
                temperature = request.config.temperature,
                max_tokens = request.config.max_output_tokens,
                "starting chat completion"
            );

            let response = match http.post(&url).bearer_auth(&api_key).json(&body).send().await {
                Ok(response) => response,
                Err(e) => {
                    error!(%provider, error = %e, timeout = e.is_timeout(), "request failed");
                    yield Fragment::Error(format!("request failed: {e}"));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let detail = serde_json::from_str::<ErrorResponse>(&text)
                    .map(|e| e.error.message)
                    .unwrap_or(text);
                error!(%provider, %status, "API error");
                yield Fragment::Error(format!("API returned {status}: {detail}"));
                return;
            }

            let mut events = response.bytes_stream().eventsource();
            let mut finished = false;
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        error!(%provider, error = %e, "stream interrupted");
                        yield Fragment::Error(format!("stream error: {e}"));
                        return;
                    }
                };
                match decode_event(&event.data) {
                    Event::Done => {
                        finished = true;
                        break;
                    }
                    Event::Text(text) if text.is_empty() => {}
                    Event::Text(text) => {
                        yield Fragment::Text(text);
                    }
                    Event::Failed(message) => {
                        error!(%provider, %message, "backend reported an error mid-stream");
                        yield Fragment::Error(message);
                        return;
                    }
                }
            }
            if !finished {
                error!(%provider, "stream ended before [DONE]");
                yield Fragment::Error("stream ended before [DONE]".to_string());
                return;
            }
            debug!(%provider, "chat completion finished");
        })
    }
}
