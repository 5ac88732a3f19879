//! OpenAI-compatible completion backend implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, trace};

use tidytask_core::defaults::{COMPLETION_BASE_URL, COMPLETION_TIMEOUT_SECS, GEN_MODEL};
use tidytask_core::{
    ChatMessage, Completion, CompletionBackend, CompletionRequest, Error, Result, TokenUsage,
};

use super::error::{to_tidytask_error, OpenAIErrorCode};
use super::types::*;

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Endpoint root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Sent as a bearer token. Local servers usually need none.
    pub api_key: Option<String>,
    pub gen_model: String,
    /// Per-call HTTP timeout.
    pub timeout_seconds: u64,
    /// OpenRouter attribution headers.
    pub http_referer: Option<String>,
    pub x_title: Option<String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: COMPLETION_BASE_URL.to_string(),
            api_key: None,
            gen_model: GEN_MODEL.to_string(),
            timeout_seconds: COMPLETION_TIMEOUT_SECS,
            http_referer: None,
            x_title: None,
        }
    }
}

impl OpenAIConfig {
    /// Read configuration from the environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
    /// | `OPENAI_API_KEY` | none (empty counts as none) |
    /// | `OPENAI_GEN_MODEL` | `gpt-4o-mini` |
    /// | `OPENAI_TIMEOUT` | `30` seconds |
    /// | `OPENAI_HTTP_REFERER`, `OPENAI_X_TITLE` | none |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            gen_model: std::env::var("OPENAI_GEN_MODEL").unwrap_or(defaults.gen_model),
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
            http_referer: std::env::var("OPENAI_HTTP_REFERER").ok(),
            x_title: std::env::var("OPENAI_X_TITLE").ok(),
        }
    }
}

/// OpenAI-compatible completion backend.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Build the HTTP client. Fails only if TLS setup fails.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            base_url = %config.base_url,
            model = %config.gen_model,
            timeout_secs = config.timeout_seconds,
            "Initializing OpenAI-compatible completion backend"
        );

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build a POST request with authentication and optional headers.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        if let Some(ref referer) = self.config.http_referer {
            req = req.header("HTTP-Referer", referer);
        }
        if let Some(ref title) = self.config.x_title {
            req = req.header("X-Title", title);
        }

        req.header("Content-Type", "application/json")
    }
}

#[async_trait]
impl CompletionBackend for OpenAIBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let start = Instant::now();

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system.filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.extend(request.messages);

        let prompt_len: usize = messages.iter().map(|m| m.content.len()).sum();
        debug!(
            subsystem = "inference",
            component = "openai",
            op = "complete",
            model = %self.config.gen_model,
            prompt_len,
            "Sending completion request"
        );

        let body = ChatCompletionRequest {
            model: self.config.gen_model.clone(),
            messages,
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            stream: false,
        };

        let response = self
            .build_request("/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(Error::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body: OpenAIErrorResponse = response
                .json()
                .await
                .unwrap_or_else(|_| OpenAIErrorResponse::unknown());
            let code = OpenAIErrorCode::from_response(status.as_u16(), &body.error.error_type);
            return Err(to_tidytask_error(
                code,
                &format!("{} returned {}", self.config.base_url, body.error.message),
            ));
        }

        let result: ChatCompletionResponse = response.json().await.map_err(|e| {
            Error::ExternalService(format!("Failed to decode completion response: {}", e))
        })?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::ExternalService("Completion returned no choices".into()))?;

        let usage = result
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        trace!(response = %content, "Completion response body");
        debug!(
            subsystem = "inference",
            component = "openai",
            op = "complete",
            response_len = content.len(),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            duration_ms = start.elapsed().as_millis() as u64,
            "Completion finished"
        );

        Ok(Completion { content, usage })
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}
