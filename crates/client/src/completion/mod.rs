//! Text-completion client.
//!
//! ### Protocol
//!
//! - **Endpoint**: `POST {completion_endpoint}/chat/completions` (OpenAI-compatible)
//! - **Authentication**: `Authorization: Bearer <api key>`
//! - **Request**: one user message, `temperature = 0`
//! - **Errors**: 401/403, 429 and other non-success statuses map to distinct
//!   [`CompletionError`] variants; no retries are attempted here.

pub mod error;
pub mod prompt;

pub use error::CompletionError;
pub use prompt::{build_prompt, extract_json_object, parse_answer, render_template};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};

use pagewise_core::AppConfig;

/// Answers a prompt with free text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Completion client configuration.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Base URL, without the `/chat/completions` suffix.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Request timeout (default: 60s).
    pub timeout: Duration,
    pub user_agent: String,
}

impl CompletionConfig {
    /// Build from application config.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::MissingApiKey` if no API key is configured.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, CompletionError> {
        let api_key = config.require_api_key().map_err(|_| CompletionError::MissingApiKey)?;
        Ok(Self {
            endpoint: config.completion_endpoint.clone(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completion client.
#[derive(Debug, Clone)]
pub struct OpenAiCompletionClient {
    http: reqwest::Client,
    config: Arc<CompletionConfig>,
}

impl OpenAiCompletionClient {
    /// Create a new client with the given configuration.
    pub fn new(config: CompletionConfig) -> Result<Self, CompletionError> {
        if config.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| CompletionError::Network(Arc::new(e)))?;

        Ok(Self { http, config: Arc::new(config) })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let start = Instant::now();
        let body = ChatRequest {
            model: &self.config.model,
            temperature: 0.0,
            messages: [ChatMessage { role: "user", content: prompt }],
        };

        let http_response = self
            .http
            .post(self.url())
            .bearer_auth(&self.config.api_key)
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = http_response.status();
        tracing::debug!("completion API response status: {}", status);

        if status == 401 || status == 403 {
            return Err(CompletionError::AuthError);
        }

        if status == 429 {
            return Err(CompletionError::RateLimited);
        }

        if status.is_client_error() || status.is_server_error() {
            return Err(CompletionError::HttpError { status: status.as_u16() });
        }

        let bytes = http_response.bytes().await?;
        let parsed: ChatResponse = serde_json::from_slice(&bytes).map_err(|e| CompletionError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        tracing::debug!("completion finished in {:?}, {} chars", start.elapsed(), content.len());
        Ok(content)
    }
}
