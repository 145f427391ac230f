// ABOUTME: Database connection management and schema bootstrap
// ABOUTME: SQLite via sqlx with append/read/upsert operations on three tables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! Persistence layer.
//!
//! Schema and migration ownership sit with the wider platform; this
//! subsystem only needs append/read/upsert access to chat sessions, chat
//! messages, and quota counters. [`Database::migrate`] bootstraps those
//! tables idempotently for development and tests.

/// Session and message persistence
pub mod sessions;

pub use sessions::{ChatMessageRecord, ChatSessionRecord, SessionStore};

use crate::errors::{AppError, AppResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// Shared database handle
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the database and bootstrap the schema
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema bootstrap fails.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::config(format!("Invalid database URL {url}: {e}")))?
            .create_if_missing(true);

        // An in-memory database exists per connection; a single connection
        // keeps every handle looking at the same data
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to connect to {url}: {e}")))?;

        let database = Self { pool };
        database.migrate().await?;
        info!("Database ready at {url}");

        Ok(database)
    }

    /// Access the underlying connection pool
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the subsystem's tables if they do not exist
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chat_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_message_at TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create chat_sessions: {e}")))?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chat_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL REFERENCES chat_sessions(id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tokens_in INTEGER,
                tokens_out INTEGER,
                provider TEXT,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create chat_messages: {e}")))?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_chat_messages_session
            ON chat_messages(session_id, seq)
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to index chat_messages: {e}")))?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS quota_counters (
                user_id TEXT NOT NULL,
                day TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, day)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create quota_counters: {e}")))?;

        Ok(())
    }
}
