// ABOUTME: Configuration module organization
// ABOUTME: Environment-backed settings for server, database, auth, and AI pipeline
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! Configuration management.
//!
//! All configuration is sourced from environment variables; there is no
//! configuration file. See [`environment::ServerConfig::from_env`].

/// Environment variable parsing into typed configuration
pub mod environment;

pub use environment::{AiConfig, AuthConfig, DatabaseUrl, LlmBackend, ServerConfig};
