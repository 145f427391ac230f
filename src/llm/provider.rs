// ABOUTME: Provider chain pairing a primary and fallback LLM backend
// ABOUTME: Applies the retry-once-on-fallback policy for timeouts and 5xx errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! # Provider Chain
//!
//! Pairs the primary provider with an optional fallback and applies the
//! failover policy: a timeout or 5xx-class provider error is retried exactly
//! once against the fallback; a provider rate-limit response is surfaced
//! immediately with no retry. Construction reads environment configuration
//! once; per-request state lives entirely on the stack.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{
    ChatRequest, ChatResponse, ChatStream, GeminiProvider, LlmProvider, OpenAiCompatibleProvider,
    StreamChunk,
};
use crate::config::{AiConfig, LlmBackend};
use crate::errors::{AppError, AppResult, ErrorCode};

/// Primary + optional fallback provider pair
#[derive(Clone)]
pub struct ProviderChain {
    primary: Arc<dyn LlmProvider>,
    fallback: Option<Arc<dyn LlmProvider>>,
}

impl ProviderChain {
    /// Create a chain from already-constructed providers
    #[must_use]
    pub fn new(primary: Arc<dyn LlmProvider>, fallback: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { primary, fallback }
    }

    /// Build the configured provider pair from environment credentials
    ///
    /// # Errors
    ///
    /// Returns an error if a required API key is missing for a configured
    /// backend.
    pub fn from_env(config: &AiConfig) -> AppResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let primary = Self::build_backend(config.primary, timeout)?;
        info!(
            "Primary LLM provider: {} (model {})",
            primary.display_name(),
            primary.default_model()
        );

        let fallback = match config.fallback {
            Some(backend) if backend == config.primary => {
                warn!("Fallback provider matches primary; disabling fallback");
                None
            }
            Some(backend) => {
                let provider = Self::build_backend(backend, timeout)?;
                info!(
                    "Fallback LLM provider: {} (model {})",
                    provider.display_name(),
                    provider.default_model()
                );
                Some(provider)
            }
            None => None,
        };

        Ok(Self { primary, fallback })
    }

    fn build_backend(backend: LlmBackend, timeout: Duration) -> AppResult<Arc<dyn LlmProvider>> {
        Ok(match backend {
            LlmBackend::OpenAi => Arc::new(OpenAiCompatibleProvider::from_env(timeout)?),
            LlmBackend::Gemini => Arc::new(GeminiProvider::from_env(timeout)?),
        })
    }

    /// Name of the primary provider
    #[must_use]
    pub fn primary_name(&self) -> &'static str {
        self.primary.name()
    }

    /// Whether an error qualifies for the single fallback retry.
    ///
    /// Rate limiting does not: a 429 is surfaced immediately rather than
    /// hammering a second provider within the same request.
    const fn should_fail_over(error: &AppError) -> bool {
        matches!(
            error.code,
            ErrorCode::ProviderTimeout | ErrorCode::ProviderError
        )
    }

    /// Perform a blocking completion with the failover policy applied.
    ///
    /// Returns the response together with the provider that produced it, so
    /// the caller can target a corrective re-prompt at the same backend.
    ///
    /// # Errors
    ///
    /// Returns `ProviderRateLimited` immediately on a 429, or
    /// `ProviderUnavailable` once both providers have failed.
    pub async fn complete(
        &self,
        request: &ChatRequest,
    ) -> AppResult<(ChatResponse, Arc<dyn LlmProvider>)> {
        match self.primary.complete(request).await {
            Ok(response) => Ok((response, Arc::clone(&self.primary))),
            Err(primary_error) => {
                let Some(fallback) = self.try_fallback(&primary_error) else {
                    return Err(Self::exhausted(primary_error, None));
                };
                match fallback.complete(request).await {
                    Ok(response) => Ok((response, Arc::clone(fallback))),
                    Err(fallback_error) => {
                        Err(Self::exhausted(primary_error, Some(fallback_error)))
                    }
                }
            }
        }
    }

    /// Open a streaming completion with the failover policy applied.
    ///
    /// Failover covers only the initial request; once deltas are flowing the
    /// stream is never retried (the caller may already have consumed output).
    /// A backend without native streaming is bridged from a blocking call.
    ///
    /// # Errors
    ///
    /// Same policy as [`Self::complete`].
    pub async fn stream(&self, request: &ChatRequest) -> AppResult<(ChatStream, &'static str)> {
        match Self::open_stream(&self.primary, request).await {
            Ok(stream) => Ok((stream, self.primary.name())),
            Err(primary_error) => {
                let Some(fallback) = self.try_fallback(&primary_error) else {
                    return Err(Self::exhausted(primary_error, None));
                };
                match Self::open_stream(fallback, request).await {
                    Ok(stream) => Ok((stream, fallback.name())),
                    Err(fallback_error) => {
                        Err(Self::exhausted(primary_error, Some(fallback_error)))
                    }
                }
            }
        }
    }

    /// Decide whether the fallback should be attempted for this error
    fn try_fallback(&self, error: &AppError) -> Option<&Arc<dyn LlmProvider>> {
        if !Self::should_fail_over(error) {
            return None;
        }
        let fallback = self.fallback.as_ref()?;
        warn!(
            provider = error.context.provider.as_deref().unwrap_or("unknown"),
            "Primary provider failed ({}), retrying once on {}",
            error.code.description(),
            fallback.display_name()
        );
        Some(fallback)
    }

    async fn open_stream(
        provider: &Arc<dyn LlmProvider>,
        request: &ChatRequest,
    ) -> AppResult<ChatStream> {
        if provider.capabilities().supports_streaming() {
            provider.complete_stream(request).await
        } else {
            // Bridge: a single final chunk carrying the whole completion
            let response = provider.complete(request).await?;
            let chunk = StreamChunk {
                delta: response.content,
                is_final: true,
                finish_reason: response.finish_reason,
            };
            Ok(Box::pin(tokio_stream::once(Ok(chunk))))
        }
    }

    /// Collapse one or two provider failures into the surfaced error
    fn exhausted(primary: AppError, fallback: Option<AppError>) -> AppError {
        match fallback {
            None => primary,
            Some(fallback) => AppError::provider_unavailable(format!(
                "Primary failed: {primary}. Fallback failed: {fallback}"
            )),
        }
    }
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChain")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|p| p.name()))
            .finish()
    }
}
