// ABOUTME: OpenAI-compatible LLM provider adapter with streaming support
// ABOUTME: Works against OpenAI, Groq, Ollama, or any /chat/completions endpoint
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! # OpenAI-Compatible Provider
//!
//! Adapter for any backend speaking the OpenAI chat-completions wire format.
//! This is the primary provider slot by default.
//!
//! ## Configuration
//!
//! - `OPENAI_API_KEY`: bearer token
//! - `OPENAI_BASE_URL`: API root (default `https://api.openai.com/v1`)
//! - `OPENAI_MODEL`: model name (default `gpt-4o-mini`)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

use super::{
    create_sse_stream, ChatMessage, ChatRequest, ChatResponse, ChatStream, LlmCapabilities,
    LlmProvider, StreamChunk, TokenUsage,
};
use crate::errors::AppError;

/// Environment variable for the API key
const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Default API root
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Default model
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Connection timeout, separate from the per-call hard timeout
const CONNECT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// API Request/Response Types (OpenAI wire format)
// ============================================================================

/// Chat completions request body
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Message structure in the OpenAI wire format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for ApiMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().to_owned(),
            content: msg.content.clone(),
        }
    }
}

/// Chat completions response body
#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Streaming chunk structure
#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    choices: Vec<ApiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    delta: ApiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Error response body
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Configuration for an OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// API root, e.g. `https://api.groq.com/openai/v1`
    pub base_url: String,
    /// Bearer token; optional for local servers
    pub api_key: Option<String>,
    /// Model to request
    pub model: String,
    /// Hard per-call timeout
    pub timeout: Duration,
}

/// Provider adapter for OpenAI-compatible chat completion endpoints
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
}

impl OpenAiCompatibleProvider {
    /// Create a provider with explicit configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create a provider from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not set.
    pub fn from_env(timeout: Duration) -> Result<Self, AppError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| AppError::config(format!("Missing {API_KEY_ENV} environment variable")))?;

        Self::new(OpenAiCompatibleConfig {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned()),
            api_key: Some(api_key),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_owned()),
            timeout,
        })
    }

    /// Build the URL for an endpoint under the API root
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.config.base_url.trim_end_matches('/'))
    }

    /// Issue a request with bearer auth applied when configured
    fn request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(self.api_url(endpoint));
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> ApiRequest {
        ApiRequest {
            model: self.config.model.clone(),
            messages: request.messages.iter().map(ApiMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: stream.then_some(true),
        }
    }

    /// Translate a transport-level failure into the stable error taxonomy
    fn translate_request_error(e: &reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::provider_timeout("openai")
        } else {
            AppError::provider_error("openai", format!("Request failed: {e}"))
        }
    }

    /// Translate a non-success HTTP status into the stable error taxonomy
    fn translate_status(status: reqwest::StatusCode, body: &str) -> AppError {
        let detail = serde_json::from_str::<ApiErrorResponse>(body)
            .map(|r| r.error.message)
            .unwrap_or_else(|_| body.chars().take(200).collect());

        match status.as_u16() {
            429 => AppError::provider_rate_limited("openai", detail),
            code => AppError::provider_error("openai", format!("HTTP {code}: {detail}")),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn display_name(&self) -> &'static str {
        "OpenAI-compatible"
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::STREAMING | LlmCapabilities::SYSTEM_MESSAGES | LlmCapabilities::JSON_MODE
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, request), fields(model = %self.config.model))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        debug!("Sending chat completion request");

        let response = self
            .request("chat/completions")
            .json(&self.build_body(request, false))
            .send()
            .await
            .map_err(|e| {
                error!("Completion request failed: {e}");
                Self::translate_request_error(&e)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::provider_error("openai", format!("Failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(Self::translate_status(status, &body));
        }

        let api_response: ApiResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::provider_error("openai", format!("Failed to parse response: {e}"))
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::provider_error("openai", "API returned no choices"))?;

        let content = choice.message.content.unwrap_or_default();
        debug!(
            "Received {} chars, finish_reason: {:?}",
            content.len(),
            choice.finish_reason
        );

        Ok(ChatResponse {
            content,
            model: api_response.model,
            usage: api_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason,
        })
    }

    #[instrument(skip(self, request), fields(model = %self.config.model))]
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        debug!("Sending streaming chat completion request");

        let response = self
            .request("chat/completions")
            .json(&self.build_body(request, true))
            .send()
            .await
            .map_err(|e| {
                error!("Streaming request failed: {e}");
                Self::translate_request_error(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::translate_status(status, &body));
        }

        Ok(create_sse_stream(
            response.bytes_stream(),
            |json_str| match serde_json::from_str::<ApiStreamChunk>(json_str) {
                Ok(chunk) => chunk.choices.into_iter().next().map(|choice| {
                    Ok(StreamChunk {
                        delta: choice.delta.content.unwrap_or_default(),
                        is_final: choice.finish_reason.is_some(),
                        finish_reason: choice.finish_reason,
                    })
                }),
                Err(e) => {
                    warn!("Skipping malformed stream chunk: {e}");
                    None
                }
            },
            "openai",
        ))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<bool, AppError> {
        let mut builder = self.client.get(self.api_url("models"));
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::provider_error("openai", format!("Health check failed: {e}")))?;

        Ok(response.status().is_success())
    }
}
