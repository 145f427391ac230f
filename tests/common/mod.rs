// ABOUTME: Shared test fixtures: scriptable mock provider and orchestrator harness
// ABOUTME: Builds an in-memory stack (sqlite, cache, quota) for integration tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use anyhow::Result;
use async_trait::async_trait;
use forma_server::auth::AuthContext;
use forma_server::cache::{factory::Cache, CacheConfig};
use forma_server::database::{Database, SessionStore};
use forma_server::errors::AppError;
use forma_server::llm::{
    ChatRequest, ChatResponse, ChatStream, LlmCapabilities, LlmProvider, ProviderChain,
    StreamChunk, TokenUsage,
};
use forma_server::models::UserTier;
use forma_server::orchestrator::{Orchestrator, OrchestratorConfig};
use forma_server::quota::QuotaTracker;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Sample Artifacts
// ============================================================================

pub const VALID_WORKOUT_JSON: &str = r#"{
    "title": "Dumbbell Strength Block",
    "weeks": 4,
    "notes": "Increase load when all sets hit the top of the rep range.",
    "sessions": [
        {"day": "Monday", "focus": "upper body", "exercises": [
            {"name": "Dumbbell Bench Press", "sets": 4, "reps": 8, "rest_secs": 120, "equipment": "dumbbells"},
            {"name": "One-Arm Row", "sets": 3, "reps": 10, "rest_secs": 90, "equipment": "dumbbells"}
        ]},
        {"day": "Thursday", "focus": "lower body", "exercises": [
            {"name": "Goblet Squat", "sets": 4, "reps": 10, "rest_secs": 120, "equipment": "dumbbells"}
        ]}
    ]
}"#;

pub const VALID_MEAL_JSON: &str = r#"{
    "title": "High Protein Week",
    "shopping_list": ["chicken breast", "oats", "greek yogurt"],
    "days": [
        {"day": "Monday", "meals": [
            {"name": "Overnight Oats", "kind": "breakfast", "calories": 450,
             "macros": {"protein_g": 28.0, "carbs_g": 55.0, "fat_g": 12.0}},
            {"name": "Chicken Rice Bowl", "kind": "lunch", "calories": 650,
             "macros": {"protein_g": 45.0, "carbs_g": 70.0, "fat_g": 15.0}}
        ]}
    ]
}"#;

pub const VALID_ANALYSIS_JSON: &str = r#"{
    "summary": "Consistent training with a slight downward weight trend.",
    "trends": [{"metric": "weight", "direction": "improving", "detail": "down 1.2 kg over 3 weeks"}],
    "achievements": ["12 workouts this month"],
    "recommendations": ["Add one recovery day"]
}"#;

// ============================================================================
// Mock Provider
// ============================================================================

/// Scripted behavior for one provider call
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return this text as the completion
    Reply(String),
    /// Stream these deltas, then a final chunk
    ReplyChunks(Vec<String>),
    /// Fail with a provider timeout
    Timeout,
    /// Fail with a rate-limit response
    RateLimited,
    /// Fail with a 5xx-class provider error
    ServerError,
}

/// Scriptable in-process provider with atomic call counters
pub struct MockProvider {
    name: &'static str,
    script: Mutex<VecDeque<MockBehavior>>,
    complete_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    streaming: bool,
}

impl MockProvider {
    pub fn named(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            script: Mutex::new(VecDeque::new()),
            complete_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            streaming: true,
        })
    }

    pub fn named_without_streaming(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            script: Mutex::new(VecDeque::new()),
            complete_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            streaming: false,
        })
    }

    /// Queue the behavior for the next call
    pub fn push(&self, behavior: MockBehavior) {
        self.script.lock().unwrap().push_back(behavior);
    }

    pub fn push_reply(&self, text: &str) {
        self.push(MockBehavior::Reply(text.to_owned()));
    }

    /// Number of blocking completion calls observed
    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    /// Number of streaming calls observed
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Total provider calls observed
    pub fn total_calls(&self) -> usize {
        self.complete_calls() + self.stream_calls()
    }

    fn next_behavior(&self) -> Result<MockBehavior, AppError> {
        self.script.lock().unwrap().pop_front().ok_or_else(|| {
            AppError::provider_error(self.name, "mock script exhausted: unexpected provider call")
        })
    }

    fn behavior_error(&self, behavior: &MockBehavior) -> Option<AppError> {
        match behavior {
            MockBehavior::Timeout => Some(AppError::provider_timeout(self.name)),
            MockBehavior::RateLimited => {
                Some(AppError::provider_rate_limited(self.name, "try later"))
            }
            MockBehavior::ServerError => Some(AppError::provider_error(self.name, "HTTP 500")),
            _ => None,
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn display_name(&self) -> &'static str {
        "Mock Provider"
    }

    fn capabilities(&self) -> LlmCapabilities {
        if self.streaming {
            LlmCapabilities::STREAMING | LlmCapabilities::SYSTEM_MESSAGES
        } else {
            LlmCapabilities::SYSTEM_MESSAGES
        }
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, AppError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.next_behavior()?;
        if let Some(error) = self.behavior_error(&behavior) {
            return Err(error);
        }

        let content = match behavior {
            MockBehavior::Reply(text) => text,
            MockBehavior::ReplyChunks(chunks) => chunks.concat(),
            _ => unreachable!(),
        };

        Ok(ChatResponse {
            content,
            model: "mock-model".to_owned(),
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
            finish_reason: Some("stop".to_owned()),
        })
    }

    async fn complete_stream(&self, _request: &ChatRequest) -> Result<ChatStream, AppError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.next_behavior()?;
        if let Some(error) = self.behavior_error(&behavior) {
            return Err(error);
        }

        let deltas = match behavior {
            MockBehavior::Reply(text) => vec![text],
            MockBehavior::ReplyChunks(chunks) => chunks,
            _ => unreachable!(),
        };

        let mut items: Vec<Result<StreamChunk, AppError>> = deltas
            .into_iter()
            .map(|delta| {
                Ok(StreamChunk {
                    delta,
                    is_final: false,
                    finish_reason: None,
                })
            })
            .collect();
        items.push(Ok(StreamChunk {
            delta: String::new(),
            is_final: true,
            finish_reason: Some("stop".to_owned()),
        }));

        Ok(Box::pin(tokio_stream::iter(items)))
    }

    async fn health_check(&self) -> Result<bool, AppError> {
        Ok(true)
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Fully wired in-memory stack around scripted providers
pub struct TestHarness {
    pub orchestrator: Orchestrator,
    pub store: SessionStore,
    pub quota: QuotaTracker,
    pub primary: Arc<MockProvider>,
    pub fallback: Arc<MockProvider>,
    pub pool: SqlitePool,
}

/// Orchestrator config with short TTLs suitable for tests
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_tokens: 512,
        chat_ttl: Duration::from_secs(60),
        plan_ttl: Duration::from_secs(600),
        analysis_ttl: Duration::from_secs(600),
        history_window: 10,
        max_streams_per_user: 2,
    }
}

pub async fn harness() -> Result<TestHarness> {
    harness_with(10, test_config()).await
}

pub async fn harness_with_limit(free_daily_limit: u32) -> Result<TestHarness> {
    harness_with(free_daily_limit, test_config()).await
}

pub async fn harness_with(
    free_daily_limit: u32,
    config: OrchestratorConfig,
) -> Result<TestHarness> {
    let database = Database::connect("sqlite::memory:").await?;
    let pool = database.pool().clone();

    let cache = Cache::new(CacheConfig {
        enable_background_cleanup: false,
        ..CacheConfig::default()
    })
    .await?;

    let quota = QuotaTracker::new(pool.clone(), free_daily_limit);
    let store = SessionStore::new(pool.clone());

    let primary = MockProvider::named("mock-primary");
    let fallback = MockProvider::named("mock-fallback");
    let providers = ProviderChain::new(
        Arc::clone(&primary) as Arc<dyn LlmProvider>,
        Some(Arc::clone(&fallback) as Arc<dyn LlmProvider>),
    );

    let orchestrator = Orchestrator::new(
        providers,
        cache,
        quota.clone(),
        store.clone(),
        config,
    );

    Ok(TestHarness {
        orchestrator,
        store,
        quota,
        primary,
        fallback,
        pool,
    })
}

/// A fresh free-tier user context
pub fn starter_user() -> AuthContext {
    AuthContext {
        user_id: Uuid::new_v4(),
        tier: UserTier::Starter,
    }
}

/// A fresh paid-tier user context
pub fn professional_user() -> AuthContext {
    AuthContext {
        user_id: Uuid::new_v4(),
        tier: UserTier::Professional,
    }
}
