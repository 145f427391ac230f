// ABOUTME: Route module organization for the Forma HTTP API
// ABOUTME: Assembles chat, generation, and health endpoints into one router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! HTTP route definitions.
//!
//! Handlers are thin: authenticate, deserialize, delegate to the
//! orchestrator, serialize. All orchestration logic lives behind the
//! [`crate::orchestrator`] API.

/// Chat conversation routes with SSE streaming
pub mod chat;
/// Plan generation and progress analysis routes
pub mod generate;

pub use chat::ChatRoutes;
pub use generate::GenerateRoutes;

use crate::context::ServerResources;
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the complete API router with shared middleware
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(ChatRoutes::routes(Arc::clone(&resources)))
        .merge(GenerateRoutes::routes(resources))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Liveness probe
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
