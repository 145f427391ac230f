// ABOUTME: Server binary wiring configuration, storage, providers, and routes
// ABOUTME: Runs the axum HTTP server with graceful shutdown on ctrl-c
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! # Forma Server Binary
//!
//! Starts the Forma Coach API: loads configuration from the environment,
//! connects storage, builds the provider chain, and serves the HTTP API.

use anyhow::Result;
use clap::Parser;
use forma_server::{
    auth::AuthManager,
    cache::{factory::Cache, CacheConfig},
    config::environment::ServerConfig,
    context::ServerResources,
    database::{Database, SessionStore},
    llm::ProviderChain,
    logging,
    orchestrator::{Orchestrator, OrchestratorConfig},
    quota::QuotaTracker,
    routes,
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "forma-server")]
#[command(about = "Forma Coach API - AI orchestration and streaming chat backend")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    logging::init_from_env()?;

    info!("Starting Forma Coach API");
    info!("{}", config.summary());

    let database = Database::connect(&config.database_url.to_connection_string()).await?;

    let providers = ProviderChain::from_env(&config.ai)?;
    let cache = Cache::new(CacheConfig::default()).await?;
    let quota = QuotaTracker::new(database.pool().clone(), config.ai.free_daily_limit);
    let store = SessionStore::new(database.pool().clone());

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

    let config = Arc::new(config);
    let resources = Arc::new(ServerResources::new(orchestrator, auth, Arc::clone(&config)));

    let router = routes::router(resources);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolve when ctrl-c is received
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
}
