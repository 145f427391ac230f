// ABOUTME: Google Gemini LLM provider adapter used as the fallback backend
// ABOUTME: Speaks the generateContent/streamGenerateContent REST API
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! # Gemini Provider
//!
//! Adapter for the Google Gemini `generateContent` API, used as the fallback
//! provider slot by default.
//!
//! ## Configuration
//!
//! - `GEMINI_API_KEY`: API key from Google AI Studio
//! - `GEMINI_MODEL`: model name (default `gemini-2.5-flash`)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

use super::{
    create_sse_stream, ChatMessage, ChatRequest, ChatResponse, ChatStream, LlmCapabilities,
    LlmProvider, MessageRole, StreamChunk, TokenUsage,
};
use crate::errors::AppError;

/// Environment variable for the Gemini API key
const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Default model
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
/// Base URL for the Gemini API
const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Connection timeout, separate from the per-call hard timeout
const CONNECT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// API Request/Response Types
// ============================================================================

/// Gemini API request structure
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

/// Content block: an optional role plus text parts
#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<ContentPart>,
}

/// Text part of a content block
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContentPart {
    text: String,
}

/// Generation configuration
#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

/// Gemini API response structure
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

/// Response candidate
#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

/// Usage metadata from the Gemini API response
#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates: Option<u32>,
    #[serde(rename = "totalTokenCount")]
    total: Option<u32>,
}

/// Error payload wrapper from the Gemini API
#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Configuration for the Gemini provider
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key
    pub api_key: String,
    /// Model to request
    pub model: String,
    /// Hard per-call timeout
    pub timeout: Duration,
}

/// Google Gemini LLM provider
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    /// Create a provider with explicit configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: GeminiConfig) -> Result<Self, AppError> {
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
    /// Returns an error if `GEMINI_API_KEY` is not set.
    pub fn from_env(timeout: Duration) -> Result<Self, AppError> {
        let api_key = env::var(GEMINI_API_KEY_ENV).map_err(|_| {
            AppError::config(format!("{GEMINI_API_KEY_ENV} environment variable not set"))
        })?;

        Self::new(GeminiConfig {
            api_key,
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_owned()),
            timeout,
        })
    }

    /// Build the API URL for a method on the configured model
    fn build_url(&self, method: &str) -> String {
        format!(
            "{API_BASE_URL}/models/{}:{method}?key={}",
            self.config.model, self.config.api_key
        )
    }

    /// Gemini role names: "user" for user/system, "model" for assistant
    const fn convert_role(role: MessageRole) -> &'static str {
        match role {
            MessageRole::System | MessageRole::User => "user",
            MessageRole::Assistant => "model",
        }
    }

    /// Convert chat messages into contents plus the separate system instruction
    fn convert_messages(messages: &[ChatMessage]) -> (Vec<GeminiContent>, Option<GeminiContent>) {
        let mut contents = Vec::new();
        let mut system_instruction = None;

        for message in messages {
            if message.role == MessageRole::System {
                system_instruction = Some(GeminiContent {
                    role: None,
                    parts: vec![ContentPart {
                        text: message.content.clone(),
                    }],
                });
            } else {
                contents.push(GeminiContent {
                    role: Some(Self::convert_role(message.role).to_owned()),
                    parts: vec![ContentPart {
                        text: message.content.clone(),
                    }],
                });
            }
        }

        (contents, system_instruction)
    }

    fn build_body(request: &ChatRequest) -> GeminiRequest {
        let (contents, system_instruction) = Self::convert_messages(&request.messages);

        let generation_config = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            })
        } else {
            None
        };

        GeminiRequest {
            contents,
            system_instruction,
            generation_config,
        }
    }

    /// Translate a transport-level failure into the stable error taxonomy
    fn translate_request_error(e: &reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::provider_timeout("gemini")
        } else {
            AppError::provider_error("gemini", format!("Request failed: {e}"))
        }
    }

    /// Translate a non-success HTTP status into the stable error taxonomy
    fn translate_status(status: u16, body: &str) -> AppError {
        let detail = serde_json::from_str::<GeminiErrorResponse>(body)
            .map(|r| r.error.message)
            .unwrap_or_else(|_| body.chars().take(200).collect());

        match status {
            429 => AppError::provider_rate_limited("gemini", detail),
            code => AppError::provider_error("gemini", format!("HTTP {code}: {detail}")),
        }
    }

    /// Extract the first text part of the first candidate
    fn extract_content(response: &GeminiResponse) -> Result<String, AppError> {
        response
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .map(|part| part.text.clone())
            .ok_or_else(|| AppError::provider_error("gemini", "No content in response"))
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn display_name(&self) -> &'static str {
        "Google Gemini"
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::STREAMING | LlmCapabilities::SYSTEM_MESSAGES | LlmCapabilities::JSON_MODE
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, request), fields(model = %self.config.model))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        debug!("Sending chat completion request to Gemini");

        let response = self
            .client
            .post(self.build_url("generateContent"))
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| {
                error!("Gemini request failed: {e}");
                Self::translate_request_error(&e)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::provider_error("gemini", format!("Failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(Self::translate_status(status.as_u16(), &body));
        }

        let gemini_response: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::provider_error("gemini", format!("Failed to parse response: {e}"))
        })?;

        let content = Self::extract_content(&gemini_response)?;
        let finish_reason = gemini_response
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.finish_reason.clone());

        Ok(ChatResponse {
            content,
            model: self.config.model.clone(),
            usage: gemini_response.usage_metadata.map(|u| TokenUsage {
                prompt_tokens: u.prompt.unwrap_or(0),
                completion_tokens: u.candidates.unwrap_or(0),
                total_tokens: u.total.unwrap_or(0),
            }),
            finish_reason,
        })
    }

    #[instrument(skip(self, request), fields(model = %self.config.model))]
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        debug!("Starting streaming request to Gemini");

        let response = self
            .client
            .post(self.build_url("streamGenerateContent"))
            .query(&[("alt", "sse")])
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| {
                error!("Gemini streaming request failed: {e}");
                Self::translate_request_error(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::translate_status(status.as_u16(), &body));
        }

        // Gemini has no [DONE] marker; the last chunk carries a finishReason
        Ok(create_sse_stream(
            response.bytes_stream(),
            |json_str| match serde_json::from_str::<GeminiResponse>(json_str) {
                Ok(chunk) => {
                    let candidate = chunk.candidates.as_ref().and_then(|c| c.first())?;
                    let delta = candidate
                        .content
                        .as_ref()
                        .and_then(|c| c.parts.first())
                        .map(|p| p.text.clone())
                        .unwrap_or_default();
                    let finish_reason = candidate.finish_reason.clone();
                    Some(Ok(StreamChunk {
                        delta,
                        is_final: finish_reason.is_some(),
                        finish_reason,
                    }))
                }
                Err(e) => {
                    warn!("Skipping malformed Gemini stream chunk: {e}");
                    None
                }
            },
            "gemini",
        ))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<bool, AppError> {
        let url = format!(
            "{API_BASE_URL}/models/{}?key={}",
            self.config.model, self.config.api_key
        );
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::provider_error("gemini", format!("Health check failed: {e}")))?;

        Ok(response.status().is_success())
    }
}
