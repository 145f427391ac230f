// ABOUTME: Chat route handler with Accept-negotiated SSE streaming
// ABOUTME: POST /chat/sessions/:id/messages returns JSON or a live token stream
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! Chat routes.
//!
//! A single endpoint handles both delivery modes: when the request's
//! `Accept` header is `text/event-stream` the reply is streamed as SSE
//! frames (`data: {"delta": ...}` terminated by
//! `data: {"done": true, "message": {...}}`), otherwise a single JSON object
//! is returned once generation completes.

use crate::context::ServerResources;
use crate::errors::AppError;
use crate::orchestrator::TurnEvent;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;

/// Request body for sending a message
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Message content
    pub content: String,
}

/// Chat routes handler
pub struct ChatRoutes;

impl ChatRoutes {
    /// Create all chat routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/chat/sessions/:session_id/messages",
                post(Self::send_message),
            )
            .with_state(resources)
    }

    /// Whether the caller asked for a live token stream
    fn wants_stream(headers: &HeaderMap) -> bool {
        headers
            .get("accept")
            .and_then(|h| h.to_str().ok())
            .is_some_and(|accept| accept.contains("text/event-stream"))
    }

    /// Send a message; replies as SSE or a single JSON object by Accept header
    async fn send_message(
        State(resources): State<Arc<ServerResources>>,
        Path(session_id): Path<String>,
        headers: HeaderMap,
        Json(request): Json<SendMessageRequest>,
    ) -> Result<Response, AppError> {
        let auth = resources.auth.authenticate(&headers)?;

        if Self::wants_stream(&headers) {
            let turn_stream = resources
                .orchestrator
                .chat_stream(&session_id, &auth, &request.content)
                .await?;

            let sse_stream = async_stream::stream! {
                let mut inner = turn_stream;
                while let Some(event) = inner.next().await {
                    match event {
                        Ok(TurnEvent::Delta(delta)) => {
                            yield Ok::<Event, Infallible>(
                                Event::default().data(json!({ "delta": delta }).to_string()),
                            );
                        }
                        Ok(TurnEvent::Completed(message)) => {
                            yield Ok(Event::default().data(
                                json!({ "done": true, "message": message }).to_string(),
                            ));
                        }
                        Err(e) => {
                            // In-band terminal error frame: headers are long
                            // gone, tokens may already have been delivered
                            yield Ok(Event::default().data(
                                json!({ "error": { "code": e.code, "message": e.message } })
                                    .to_string(),
                            ));
                            return;
                        }
                    }
                }
            };

            return Ok(Sse::new(sse_stream)
                .keep_alive(KeepAlive::default())
                .into_response());
        }

        let turn = resources
            .orchestrator
            .chat(&session_id, &auth, &request.content)
            .await?;

        Ok(Json(json!({ "message": turn.assistant_message })).into_response())
    }
}
