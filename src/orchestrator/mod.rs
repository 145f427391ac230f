// ABOUTME: Core request orchestration across cache, quota, providers, and persistence
// ABOUTME: Owns the cache/quota decisions and the streaming turn lifecycle
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! # Orchestrator
//!
//! The coordinator behind every generation endpoint. Each request flows
//! through fingerprint → cache → quota → prompt → provider chain →
//! validator → persistence, in that order:
//!
//! - a cache hit returns immediately and is free (no quota, no provider);
//! - quota is reserved only after a confirmed cache miss, so no rollback is
//!   needed on the common path;
//! - a schema violation triggers at most one corrective re-prompt, aimed at
//!   the provider that produced the malformed reply;
//! - chat turns persist the user message before any provider call, and the
//!   assistant message only after the full reply is assembled — dropping a
//!   stream mid-flight never leaves partial history behind.
//!
//! The orchestrator holds its collaborators by value/Arc, injected at
//! construction.

mod fingerprint;

pub use fingerprint::GenerationRequest;

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_stream::Stream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::cache::{factory::Cache, CacheKey};
use crate::config::AiConfig;
use crate::database::{sessions::MessageMeta, ChatMessageRecord, SessionStore};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::llm::{
    ChatMessage, ChatRequest, MessageRole, ProviderChain, TokenUsage,
};
use crate::models::{
    ArtifactKind, ChatReply, GeneratedArtifact, Goal, MealPlan, MealPlanOverrides,
    ProgressAnalysis, ProgressEntry, UserProfile, WorkoutOverrides, WorkoutPlan,
};
use crate::prompts;
use crate::quota::QuotaTracker;
use crate::validator;

// ============================================================================
// Configuration
// ============================================================================

/// Orchestrator tuning, derived from [`AiConfig`]
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Max tokens per generation
    pub max_tokens: u32,
    /// TTL for cached chat replies
    pub chat_ttl: Duration,
    /// TTL for cached plans
    pub plan_ttl: Duration,
    /// TTL for cached analyses
    pub analysis_ttl: Duration,
    /// Conversation window size for chat prompts
    pub history_window: u32,
    /// Concurrent SSE streams allowed per user
    pub max_streams_per_user: usize,
}

impl From<&AiConfig> for OrchestratorConfig {
    fn from(ai: &AiConfig) -> Self {
        Self {
            max_tokens: ai.max_tokens,
            chat_ttl: Duration::from_secs(ai.chat_ttl_secs),
            plan_ttl: Duration::from_secs(ai.plan_ttl_secs),
            analysis_ttl: Duration::from_secs(ai.analysis_ttl_secs),
            history_window: ai.history_window,
            max_streams_per_user: ai.max_streams_per_user,
        }
    }
}

impl OrchestratorConfig {
    /// TTL class for an artifact kind
    #[must_use]
    pub const fn ttl_for(&self, kind: ArtifactKind) -> Duration {
        match kind {
            ArtifactKind::ChatReply => self.chat_ttl,
            ArtifactKind::WorkoutPlan | ArtifactKind::MealPlan => self.plan_ttl,
            ArtifactKind::ProgressAnalysis => self.analysis_ttl,
        }
    }
}

// ============================================================================
// Streaming Types
// ============================================================================

/// Event emitted by a streaming chat turn
#[derive(Debug)]
pub enum TurnEvent {
    /// An incremental token delta, in order
    Delta(String),
    /// The turn completed; carries the persisted assistant message
    Completed(ChatMessageRecord),
}

/// Pull-based stream of turn events. Dropping the stream cancels the
/// upstream provider request and discards any partial output.
pub type TurnStream = Pin<Box<dyn Stream<Item = AppResult<TurnEvent>> + Send>>;

/// A completed non-streaming chat turn
#[derive(Debug)]
pub struct ChatTurn {
    /// The persisted user message
    pub user_message: ChatMessageRecord,
    /// The persisted assistant reply
    pub assistant_message: ChatMessageRecord,
}

// ============================================================================
// Stream Limiter
// ============================================================================

/// Per-user bound on concurrent streaming connections
struct StreamLimiter {
    permits: DashMap<Uuid, Arc<Semaphore>>,
    max_per_user: usize,
}

impl StreamLimiter {
    fn new(max_per_user: usize) -> Self {
        Self {
            permits: DashMap::new(),
            max_per_user,
        }
    }

    /// Try to claim a stream slot; the permit releases on drop
    fn acquire(&self, user_id: Uuid) -> AppResult<OwnedSemaphorePermit> {
        let semaphore = {
            let entry = self
                .permits
                .entry(user_id)
                .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_user)));
            Arc::clone(entry.value())
        };

        semaphore
            .try_acquire_owned()
            .map_err(|_| AppError::stream_limit_exceeded(self.max_per_user).with_user_id(user_id))
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Cleanup sentinel for streaming turns.
///
/// Dropped without being finished, it marks a client disconnect: the stream
/// was abandoned mid-flight, the provider request has been aborted, and the
/// partial text was discarded. Not a user-visible error.
struct TurnGuard {
    fingerprint: String,
    finished: bool,
}

impl TurnGuard {
    fn new(fingerprint: &str) -> Self {
        Self {
            fingerprint: fingerprint.to_owned(),
            finished: false,
        }
    }

    /// Mark the turn as terminated normally (completed or errored in-band)
    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                code = ?ErrorCode::ClientDisconnected,
                fingerprint = %self.fingerprint,
                "Streaming turn dropped before completion; partial output discarded"
            );
        }
    }
}

/// Outcome of a validated provider completion
struct ValidatedCompletion {
    artifact: GeneratedArtifact,
    usage: Option<TokenUsage>,
    provider: &'static str,
}

/// Prepared chat context: prompt window, fingerprint, and cache key
struct PreparedChat {
    messages: Vec<ChatMessage>,
    transcript: String,
    fingerprint: String,
    key: CacheKey,
}

/// The core coordinator for all generation requests
#[derive(Clone)]
pub struct Orchestrator {
    providers: ProviderChain,
    cache: Cache,
    quota: QuotaTracker,
    store: SessionStore,
    limiter: Arc<StreamLimiter>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Assemble an orchestrator from its collaborators
    #[must_use]
    pub fn new(
        providers: ProviderChain,
        cache: Cache,
        quota: QuotaTracker,
        store: SessionStore,
        config: OrchestratorConfig,
    ) -> Self {
        let limiter = Arc::new(StreamLimiter::new(config.max_streams_per_user));
        Self {
            providers,
            cache,
            quota,
            store,
            limiter,
            config,
        }
    }

    // ========================================================================
    // Plan / Analysis Generation
    // ========================================================================

    /// Generate a workout plan for the user
    ///
    /// # Errors
    ///
    /// `QuotaExceeded`, `ProviderUnavailable`, or `InvalidGeneration` per the
    /// pipeline contract.
    pub async fn generate_workout_plan(
        &self,
        user: &AuthContext,
        profile: &UserProfile,
        overrides: &WorkoutOverrides,
    ) -> AppResult<WorkoutPlan> {
        let prompt = prompts::workout_plan(profile, overrides);
        match self
            .generate(user, ArtifactKind::WorkoutPlan, prompt)
            .await?
        {
            GeneratedArtifact::WorkoutPlan(plan) => Ok(plan),
            other => Err(unexpected_kind(other.kind())),
        }
    }

    /// Generate a meal plan for the user
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::generate_workout_plan`].
    pub async fn generate_meal_plan(
        &self,
        user: &AuthContext,
        profile: &UserProfile,
        overrides: &MealPlanOverrides,
    ) -> AppResult<MealPlan> {
        let prompt = prompts::meal_plan(profile, overrides);
        match self.generate(user, ArtifactKind::MealPlan, prompt).await? {
            GeneratedArtifact::MealPlan(plan) => Ok(plan),
            other => Err(unexpected_kind(other.kind())),
        }
    }

    /// Analyze logged progress against the user's goals
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::generate_workout_plan`].
    pub async fn analyze_progress(
        &self,
        user: &AuthContext,
        entries: &[ProgressEntry],
        goals: &[Goal],
    ) -> AppResult<ProgressAnalysis> {
        if entries.is_empty() {
            return Err(AppError::invalid_input(
                "At least one progress entry is required",
            ));
        }
        let prompt = prompts::progress_analysis(entries, goals);
        match self
            .generate(user, ArtifactKind::ProgressAnalysis, prompt)
            .await?
        {
            GeneratedArtifact::ProgressAnalysis(analysis) => Ok(analysis),
            other => Err(unexpected_kind(other.kind())),
        }
    }

    /// Shared pipeline: fingerprint → cache → quota → provider → validate →
    /// cache write
    async fn generate(
        &self,
        user: &AuthContext,
        kind: ArtifactKind,
        prompt: String,
    ) -> AppResult<GeneratedArtifact> {
        let fingerprint = GenerationRequest {
            kind,
            user_id: user.user_id,
            prompt: &prompt,
        }
        .fingerprint();
        let key = CacheKey::new(user.user_id, kind, fingerprint.clone());

        if let Some(artifact) = self.cache.get::<GeneratedArtifact>(&key).await? {
            debug!(%kind, fingerprint = %fingerprint, "Response cache hit");
            return Ok(artifact);
        }

        self.quota.check_and_reserve(user.user_id, user.tier).await?;

        let request = ChatRequest::new(vec![ChatMessage::user(prompt.clone())])
            .with_max_tokens(self.config.max_tokens);
        let completed = self
            .complete_validated(kind, request, &prompt, &fingerprint)
            .await
            .map_err(|e| e.with_user_id(user.user_id))?;

        self.cache
            .set(&key, &completed.artifact, self.config.ttl_for(kind))
            .await?;

        Ok(completed.artifact)
    }

    /// Call the provider chain and validate the reply, with at most one
    /// corrective re-prompt aimed at the provider that answered
    async fn complete_validated(
        &self,
        kind: ArtifactKind,
        request: ChatRequest,
        correction_context: &str,
        fingerprint: &str,
    ) -> AppResult<ValidatedCompletion> {
        let started = Instant::now();
        let (response, provider) = self
            .providers
            .complete(&request)
            .await
            .map_err(|e| e.with_fingerprint(fingerprint))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        match validator::parse(kind, &response.content) {
            Ok(artifact) => {
                debug!(%kind, fingerprint, provider = provider.name(), latency_ms, "Generation validated");
                Ok(ValidatedCompletion {
                    artifact,
                    usage: response.usage,
                    provider: provider.name(),
                })
            }
            Err(validation) => {
                warn!(
                    %kind, fingerprint, provider = provider.name(), latency_ms,
                    "Generation failed validation; issuing one corrective re-prompt"
                );
                let correction =
                    prompts::correction(correction_context, &response.content, &validation);
                let retry = ChatRequest::new(vec![ChatMessage::user(correction)])
                    .with_max_tokens(self.config.max_tokens);

                let second = provider
                    .complete(&retry)
                    .await
                    .map_err(|e| e.with_fingerprint(fingerprint))?;

                match validator::parse(kind, &second.content) {
                    Ok(artifact) => Ok(ValidatedCompletion {
                        artifact,
                        usage: second.usage,
                        provider: provider.name(),
                    }),
                    Err(e) => {
                        warn!(%kind, fingerprint, provider = provider.name(), "Corrective re-prompt still invalid");
                        Err(AppError::invalid_generation(e.to_string())
                            .with_fingerprint(fingerprint)
                            .with_provider(provider.name()))
                    }
                }
            }
        }
    }

    // ========================================================================
    // Chat
    // ========================================================================

    /// Handle a chat turn, returning the full reply once generated.
    ///
    /// The user message is durable before any provider call; the assistant
    /// reply is appended after validation. A cache hit still appends the
    /// reply so persisted history remains causally complete.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for empty content, `ResourceNotFound` for a foreign
    /// session, plus the shared pipeline errors.
    pub async fn chat(
        &self,
        session_id: &str,
        user: &AuthContext,
        content: &str,
    ) -> AppResult<ChatTurn> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::invalid_input("Message content must not be empty"));
        }

        let session = self
            .store
            .get_or_create_session(session_id, user.user_id, content)
            .await?;
        let user_message = self
            .store
            .append_message(&session.id, MessageRole::User, content, MessageMeta::default())
            .await?;

        let prepared = self.prepare_chat(session_id, user.user_id).await?;

        if let Some(reply) = self.cached_reply(&prepared).await? {
            debug!(fingerprint = %prepared.fingerprint, "Chat cache hit");
            let assistant_message = self
                .append_assistant(session_id, &reply.text, None, "cache")
                .await?;
            return Ok(ChatTurn {
                user_message,
                assistant_message,
            });
        }

        self.quota.check_and_reserve(user.user_id, user.tier).await?;

        let request = ChatRequest::new(prepared.messages.clone())
            .with_max_tokens(self.config.max_tokens);
        let completed = self
            .complete_validated(
                ArtifactKind::ChatReply,
                request,
                &prepared.transcript,
                &prepared.fingerprint,
            )
            .await
            .map_err(|e| e.with_user_id(user.user_id))?;

        let GeneratedArtifact::ChatReply(reply) = &completed.artifact else {
            return Err(unexpected_kind(completed.artifact.kind()));
        };

        let assistant_message = self
            .append_assistant(session_id, &reply.text, completed.usage, completed.provider)
            .await?;

        if let Err(e) = self
            .cache
            .set(
                &prepared.key,
                &completed.artifact,
                self.config.ttl_for(ArtifactKind::ChatReply),
            )
            .await
        {
            warn!("Failed to cache chat reply: {e}");
        }

        Ok(ChatTurn {
            user_message,
            assistant_message,
        })
    }

    /// Handle a chat turn as a live token stream.
    ///
    /// Deltas are forwarded in order as they arrive from the provider. The
    /// durable assistant row is committed only after the full response is
    /// assembled; if the caller drops the stream, the partial text is
    /// discarded and no assistant message is ever persisted. The user's
    /// message row, written before the provider call, always survives.
    ///
    /// # Errors
    ///
    /// `StreamLimitExceeded` when the user already holds the maximum number
    /// of open streams, plus the shared pipeline errors.
    pub async fn chat_stream(
        &self,
        session_id: &str,
        user: &AuthContext,
        content: &str,
    ) -> AppResult<TurnStream> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::invalid_input("Message content must not be empty"));
        }

        let permit = self.limiter.acquire(user.user_id)?;

        let session = self
            .store
            .get_or_create_session(session_id, user.user_id, content)
            .await?;
        self.store
            .append_message(&session.id, MessageRole::User, content, MessageMeta::default())
            .await?;

        let prepared = self.prepare_chat(session_id, user.user_id).await?;

        if let Some(reply) = self.cached_reply(&prepared).await? {
            debug!(fingerprint = %prepared.fingerprint, "Chat cache hit (streamed)");
            return Ok(self.stream_cached_reply(session_id, reply, permit));
        }

        self.quota.check_and_reserve(user.user_id, user.tier).await?;

        let request = ChatRequest::new(prepared.messages.clone())
            .with_max_tokens(self.config.max_tokens);
        let (mut llm_stream, provider_name) = self
            .providers
            .stream(&request)
            .await
            .map_err(|e| e.with_fingerprint(&prepared.fingerprint).with_user_id(user.user_id))?;

        let this = self.clone();
        let session_id = session_id.to_owned();

        let stream = async_stream::stream! {
            // Held for the lifetime of the stream; dropping the stream (client
            // disconnect) releases the slot and aborts the provider request
            let _permit = permit;
            let mut guard = TurnGuard::new(&prepared.fingerprint);

            let started = Instant::now();
            let mut full_text = String::new();

            while let Some(chunk_result) = llm_stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        if !chunk.delta.is_empty() {
                            full_text.push_str(&chunk.delta);
                            yield Ok(TurnEvent::Delta(chunk.delta));
                        }
                        if chunk.is_final {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(fingerprint = %prepared.fingerprint, provider = provider_name, "Stream failed mid-flight");
                        guard.finish();
                        yield Err(e.with_fingerprint(&prepared.fingerprint));
                        return;
                    }
                }
            }

            let artifact = match validator::parse(ArtifactKind::ChatReply, &full_text) {
                Ok(artifact) => artifact,
                Err(e) => {
                    guard.finish();
                    yield Err(AppError::invalid_generation(e.to_string())
                        .with_fingerprint(&prepared.fingerprint)
                        .with_provider(provider_name));
                    return;
                }
            };

            // Durable write after full assembly; a failure here must surface
            // so the caller knows the turn did not complete
            guard.finish();
            match this
                .append_assistant(&session_id, &full_text, None, provider_name)
                .await
            {
                Ok(message) => {
                    if let Err(e) = this
                        .cache
                        .set(&prepared.key, &artifact, this.config.ttl_for(ArtifactKind::ChatReply))
                        .await
                    {
                        warn!("Failed to cache chat reply: {e}");
                    }
                    info!(
                        provider = provider_name,
                        latency_ms = started.elapsed().as_millis() as u64,
                        chars = full_text.len(),
                        "Streamed chat turn completed"
                    );
                    yield Ok(TurnEvent::Completed(message));
                }
                Err(e) => {
                    yield Err(e);
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Serve a cached reply over the streaming interface: one delta carrying
    /// the whole text, then the persisted completion event
    fn stream_cached_reply(
        &self,
        session_id: &str,
        reply: ChatReply,
        permit: OwnedSemaphorePermit,
    ) -> TurnStream {
        let this = self.clone();
        let session_id = session_id.to_owned();

        Box::pin(async_stream::stream! {
            let _permit = permit;

            yield Ok(TurnEvent::Delta(reply.text.clone()));

            match this
                .append_assistant(&session_id, &reply.text, None, "cache")
                .await
            {
                Ok(message) => yield Ok(TurnEvent::Completed(message)),
                Err(e) => yield Err(e),
            }
        })
    }

    /// Load the conversation window and derive the fingerprint for this turn
    async fn prepare_chat(&self, session_id: &str, user_id: Uuid) -> AppResult<PreparedChat> {
        let window = self
            .store
            .recent_messages(session_id, self.config.history_window)
            .await?;
        let messages = prompts::chat_messages(&window);
        let transcript = prompts::render_transcript(&messages);
        let fingerprint = GenerationRequest {
            kind: ArtifactKind::ChatReply,
            user_id,
            prompt: &transcript,
        }
        .fingerprint();
        let key = CacheKey::new(user_id, ArtifactKind::ChatReply, fingerprint.clone());

        Ok(PreparedChat {
            messages,
            transcript,
            fingerprint,
            key,
        })
    }

    /// Look up a cached reply for the prepared turn
    async fn cached_reply(&self, prepared: &PreparedChat) -> AppResult<Option<ChatReply>> {
        let artifact = self
            .cache
            .get::<GeneratedArtifact>(&prepared.key)
            .await?;
        Ok(match artifact {
            Some(GeneratedArtifact::ChatReply(reply)) => Some(reply),
            _ => None,
        })
    }

    /// Append the assistant reply with its provenance metadata
    async fn append_assistant(
        &self,
        session_id: &str,
        text: &str,
        usage: Option<TokenUsage>,
        provider: &str,
    ) -> AppResult<ChatMessageRecord> {
        self.store
            .append_message(
                session_id,
                MessageRole::Assistant,
                text,
                MessageMeta {
                    tokens_in: usage.map(|u| u.prompt_tokens),
                    tokens_out: usage.map(|u| u.completion_tokens),
                    provider: Some(provider.to_owned()),
                },
            )
            .await
    }
}

/// Guard against provider-chain plumbing ever crossing artifact kinds
fn unexpected_kind(kind: ArtifactKind) -> AppError {
    AppError::internal(format!("Unexpected artifact kind {kind}"))
}
