//! HTTP client for OpenAI-compatible chat completion services

use super::retry::RetryPolicy;
use super::stream::{fragment_stream, FragmentStream};
use crate::config::{GenerationConfig, LLMServiceConfig};
use crate::error::{KbgateError, Result};
use futures::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Chat message for completion requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Generation parameters for one completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionOptions {
    /// Same parameters with incremental delivery enabled
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(KbgateError::InvalidInput(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(KbgateError::InvalidInput(
                "max_tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        GenerationConfig::default().into()
    }
}

impl From<GenerationConfig> for CompletionOptions {
    fn from(config: GenerationConfig) -> Self {
        Self {
            stream: false,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Request body sent to the upstream service
///
/// Always holds exactly one system message, at position 0.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: &str,
        turns: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<Self> {
        options.validate()?;

        if turns.is_empty() {
            return Err(KbgateError::InvalidInput(
                "conversation must contain at least one turn".to_string(),
            ));
        }
        if turns.iter().any(|m| m.role == Role::System) {
            return Err(KbgateError::InvalidInput(
                "conversation turns must not contain system messages".to_string(),
            ));
        }

        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(turns);

        Ok(Self {
            model: model.into(),
            messages,
            stream: options.stream,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        })
    }
}

/// Outcome of a completion: buffered text or live fragments
pub enum CompletionResult {
    Text(String),
    Stream(FragmentStream),
}

impl CompletionResult {
    /// Buffer the whole answer, draining the stream if there is one
    pub async fn into_text(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Stream(stream) => {
                stream
                    .try_fold(String::new(), |mut text, fragment| async move {
                        text.push_str(&fragment);
                        Ok(text)
                    })
                    .await
            }
        }
    }

    /// View the result as fragments; buffered text becomes a single fragment
    pub fn into_stream(self) -> FragmentStream {
        match self {
            Self::Text(text) => Box::pin(futures::stream::once(async move { Ok(text) })),
            Self::Stream(stream) => stream,
        }
    }
}

impl std::fmt::Debug for CompletionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Stream(_) => f.debug_tuple("Stream").finish_non_exhaustive(),
        }
    }
}

/// Retrying client for a remote chat completion endpoint
///
/// Holds only fixed configuration and a connection pool; no state is kept
/// between calls.
pub struct CompletionClient {
    http_client: reqwest::Client,
    config: LLMServiceConfig,
    api_key: String,
    retry: RetryPolicy,
}

impl CompletionClient {
    /// Create new client from configuration
    pub fn new(config: LLMServiceConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| KbgateError::Config("API key not configured".to_string()))?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| KbgateError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let retry = RetryPolicy::new(config.max_attempts, config.retry_base_delay());

        Ok(Self {
            http_client,
            config,
            api_key,
            retry,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    pub fn endpoint(&self) -> &str {
        &self.config.url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send `turns` after the system prompt and return the answer
    ///
    /// Transient failures are retried for the whole request; once a stream has
    /// been handed back, later failures arrive as stream errors.
    pub async fn complete(
        &self,
        turns: Vec<ChatMessage>,
        system_prompt: &str,
        options: CompletionOptions,
    ) -> Result<CompletionResult> {
        let request = CompletionRequest::new(&self.config.model, system_prompt, turns, options)?;

        tracing::debug!(
            "Chat completion: model={}, messages={}, stream={}",
            request.model,
            request.messages.len(),
            request.stream
        );

        if request.stream {
            let stream = self
                .retry
                .run(|attempt| self.open_stream(&request, attempt))
                .await?;
            Ok(CompletionResult::Stream(stream))
        } else {
            let text = self
                .retry
                .run(|attempt| self.fetch_text(&request, attempt))
                .await?;
            Ok(CompletionResult::Text(text))
        }
    }

    /// One-turn buffered completion with default generation options
    pub async fn simple_complete(&self, user_message: &str, system_prompt: &str) -> Result<String> {
        self.complete(
            vec![ChatMessage::user(user_message)],
            system_prompt,
            CompletionOptions::default(),
        )
        .await?
        .into_text()
        .await
    }

    fn build_request(&self, request: &CompletionRequest) -> reqwest::RequestBuilder {
        self.http_client
            .post(&self.config.url)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        attempt: u32,
    ) -> Result<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!("Upstream returned HTTP {}: {}", status, body);
        Err(KbgateError::from_status(status.as_u16(), body, attempt + 1))
    }

    async fn fetch_text(&self, request: &CompletionRequest, attempt: u32) -> Result<String> {
        let builder = self.build_request(request).timeout(self.config.timeout());
        let response = self.send(builder, attempt).await?;
        let body = response.bytes().await?;
        parse_completion_body(&body)
    }

    async fn open_stream(&self, request: &CompletionRequest, attempt: u32) -> Result<FragmentStream> {
        let timeout = self.config.timeout();
        let response = tokio::time::timeout(timeout, self.send(self.build_request(request), attempt))
            .await
            .map_err(|_| {
                KbgateError::Network(format!("no response headers within {:?}", timeout))
            })??;

        Ok(fragment_stream(response.bytes_stream(), timeout))
    }
}

/// Extract `choices[0].message.content` from a buffered response body
pub fn parse_completion_body(body: &[u8]) -> Result<String> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| KbgateError::Unknown(format!("invalid JSON in completion response: {}", e)))?;

    let first = value
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .ok_or_else(|| {
            KbgateError::MalformedResponse("response has no choices".to_string())
        })?;

    first
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            KbgateError::MalformedResponse("first choice has no message content".to_string())
        })
}
