// ABOUTME: Dependency-injection container shared by all route handlers
// ABOUTME: Wires orchestrator, auth, and config together at startup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! Server resources.
//!
//! Everything a route handler needs, assembled once at startup and shared as
//! an `Arc`. Replaces ambient singletons with explicit construction.

use crate::auth::AuthManager;
use crate::config::ServerConfig;
use crate::orchestrator::Orchestrator;
use std::sync::Arc;

/// Shared server state injected into every route handler
pub struct ServerResources {
    /// The request orchestrator
    pub orchestrator: Orchestrator,
    /// Bearer-token authentication
    pub auth: AuthManager,
    /// Server configuration
    pub config: Arc<ServerConfig>,
}

impl ServerResources {
    /// Assemble the resource container
    #[must_use]
    pub fn new(orchestrator: Orchestrator, auth: AuthManager, config: Arc<ServerConfig>) -> Self {
        Self {
            orchestrator,
            auth,
            config,
        }
    }
}
