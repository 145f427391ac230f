// ABOUTME: Main library entry point for the Forma Coach API backend
// ABOUTME: Exposes AI orchestration, streaming chat, and generation endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

#![deny(unsafe_code)]

//! # Forma Server
//!
//! Backend service that turns user requests (chat messages, workout-plan
//! requests, meal-plan requests, progress analysis) into validated, persisted
//! AI-generated artifacts, optionally delivered as a live token stream.
//!
//! The core of the service is the [`orchestrator::Orchestrator`], which
//! coordinates the response cache, the per-tier quota tracker, the prompt
//! builder, the LLM provider chain (primary + fallback), the response
//! validator, and the session/message store. All collaborators are passed at
//! construction; there is no global mutable state.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use forma_server::config::environment::ServerConfig;
//! use forma_server::errors::AppResult;
//!
//! fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Forma server configured for port {}", config.http_port);
//!     Ok(())
//! }
//! ```

/// JWT bearer authentication boundary
pub mod auth;

/// Response cache with pluggable backends
pub mod cache;

/// Environment-based configuration
pub mod config;

/// Dependency-injection container shared by route handlers
pub mod context;

/// Session and message persistence
pub mod database;

/// Unified error handling with standard error codes and HTTP responses
pub mod errors;

/// LLM provider abstraction and concrete adapters
pub mod llm;

/// Structured logging setup
pub mod logging;

/// Domain model: tiers, profiles, overrides, generated artifacts
pub mod models;

/// Request orchestration: cache, quota, providers, validation, persistence
pub mod orchestrator;

/// Deterministic prompt assembly
pub mod prompts;

/// Per-user daily quota tracking
pub mod quota;

/// HTTP routes (axum)
pub mod routes;

/// Schema validation and parsing of provider output
pub mod validator;
