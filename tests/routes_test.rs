// ABOUTME: Integration tests for the HTTP routes
// ABOUTME: Exercises auth mapping, status codes, and SSE frame format end to end
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{MockBehavior, MockProvider, VALID_WORKOUT_JSON};
use forma_server::auth::AuthManager;
use forma_server::cache::{factory::Cache, CacheConfig};
use forma_server::config::environment::{AiConfig, AuthConfig, DatabaseUrl, ServerConfig};
use forma_server::context::ServerResources;
use forma_server::database::{Database, SessionStore};
use forma_server::llm::{LlmProvider, ProviderChain};
use forma_server::models::UserTier;
use forma_server::orchestrator::{Orchestrator, OrchestratorConfig};
use forma_server::quota::QuotaTracker;
use forma_server::routes;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    primary: Arc<MockProvider>,
    auth: AuthManager,
}

impl TestApp {
    fn bearer(&self, tier: UserTier) -> String {
        let token = self.auth.generate_token(Uuid::new_v4(), tier).unwrap();
        format!("Bearer {token}")
    }
}

async fn test_app(free_daily_limit: u32) -> Result<TestApp> {
    let config = ServerConfig {
        http_port: 0,
        database_url: DatabaseUrl::Memory,
        auth: AuthConfig {
            jwt_secret: "route-test-secret".to_owned(),
            jwt_expiry_hours: 24,
        },
        ai: AiConfig {
            free_daily_limit,
            ..AiConfig::default()
        },
    };

    let database = Database::connect("sqlite::memory:").await?;
    let cache = Cache::new(CacheConfig {
        enable_background_cleanup: false,
        ..CacheConfig::default()
    })
    .await?;
    let quota = QuotaTracker::new(database.pool().clone(), free_daily_limit);
    let store = SessionStore::new(database.pool().clone());

    let primary = MockProvider::named("mock-primary");
    let providers = ProviderChain::new(Arc::clone(&primary) as Arc<dyn LlmProvider>, None);

    let orchestrator = Orchestrator::new(
        providers,
        cache,
        quota,
        store,
        OrchestratorConfig::from(&config.ai),
    );
    let auth = AuthManager::new(
        config.auth.jwt_secret.as_bytes(),
        config.auth.jwt_expiry_hours,
    );

    let resources = Arc::new(ServerResources::new(
        orchestrator,
        auth.clone(),
        Arc::new(config),
    ));

    Ok(TestApp {
        router: routes::router(resources),
        primary,
        auth,
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_missing_bearer_is_unauthorized() -> Result<()> {
    let app = test_app(10).await?;

    let response = app
        .router
        .oneshot(
            Request::post("/ai/workout-plan")
                .header("content-type", "application/json")
                .body(Body::from(json!({}).to_string()))?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_workout_plan_generation() -> Result<()> {
    let app = test_app(10).await?;
    app.primary.push_reply(VALID_WORKOUT_JSON);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::post("/ai/workout-plan")
                .header("authorization", app.bearer(UserTier::Starter))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "overrides": {"duration_minutes": 30, "equipment": ["dumbbells"]}
                    })
                    .to_string(),
                ))?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["title"], "Dumbbell Strength Block");
    Ok(())
}

#[tokio::test]
async fn test_quota_exhaustion_maps_to_429() -> Result<()> {
    let app = test_app(0).await?;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::post("/ai/workout-plan")
                .header("authorization", app.bearer(UserTier::Starter))
                .header("content-type", "application/json")
                .body(Body::from(json!({}).to_string()))?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "QUOTA_EXCEEDED");
    Ok(())
}

#[tokio::test]
async fn test_provider_failure_maps_to_503() -> Result<()> {
    let app = test_app(10).await?;
    app.primary.push(MockBehavior::Timeout);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::post("/ai/workout-plan")
                .header("authorization", app.bearer(UserTier::Starter))
                .header("content-type", "application/json")
                .body(Body::from(json!({}).to_string()))?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn test_chat_returns_single_json_message() -> Result<()> {
    let app = test_app(10).await?;
    app.primary.push_reply("Aim for 8k steps daily.");

    let session_id = Uuid::new_v4();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::post(format!("/chat/sessions/{session_id}/messages"))
                .header("authorization", app.bearer(UserTier::Starter))
                .header("content-type", "application/json")
                .body(Body::from(json!({"content": "How many steps?"}).to_string()))?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"]["role"], "assistant");
    assert_eq!(body["message"]["content"], "Aim for 8k steps daily.");
    Ok(())
}

#[tokio::test]
async fn test_chat_streams_sse_frames_when_accepted() -> Result<()> {
    let app = test_app(10).await?;
    app.primary.push(MockBehavior::ReplyChunks(vec![
        "Hello".to_owned(),
        " there".to_owned(),
    ]));

    let session_id = Uuid::new_v4();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::post(format!("/chat/sessions/{session_id}/messages"))
                .header("authorization", app.bearer(UserTier::Starter))
                .header("content-type", "application/json")
                .header("accept", "text/event-stream")
                .body(Body::from(json!({"content": "hi"}).to_string()))?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    assert!(content_type.starts_with("text/event-stream"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let text = String::from_utf8_lossy(&bytes);

    assert!(text.contains(r#"data: {"delta":"Hello"}"#));
    assert!(text.contains(r#"data: {"delta":" there"}"#));
    assert!(text.contains(r#""done":true"#));
    Ok(())
}

#[tokio::test]
async fn test_empty_message_is_bad_request() -> Result<()> {
    let app = test_app(10).await?;

    let session_id = Uuid::new_v4();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::post(format!("/chat/sessions/{session_id}/messages"))
                .header("authorization", app.bearer(UserTier::Starter))
                .header("content-type", "application/json")
                .body(Body::from(json!({"content": "   "}).to_string()))?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let app = test_app(10).await?;

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    Ok(())
}
