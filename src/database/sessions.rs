// ABOUTME: Database operations for chat sessions and their ordered messages
// ABOUTME: Append is the only mutation; ordering is creation time plus insert sequence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! # Session/Message Store
//!
//! Durable, strictly ordered log of chat sessions and messages. Messages are
//! append-only and totally ordered by the `seq` autoincrement column, which
//! breaks ties between equal creation timestamps; no component ever reorders
//! or edits historical rows. Appending a message and touching its session
//! happen in one transaction, so a user turn is durably visible before the
//! assistant reply that answers it.

use crate::errors::{AppError, AppResult};
use crate::llm::MessageRole;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Database representation of a chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSessionRecord {
    /// Unique session ID
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Session title (derived from the first message)
    pub title: String,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
    /// Timestamp of the most recent message, if any
    pub last_message_at: Option<String>,
}

/// Database representation of a chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageRecord {
    /// Unique message ID
    pub id: String,
    /// Session this message belongs to
    pub session_id: String,
    /// Insertion sequence; authoritative order within a session
    pub seq: i64,
    /// Sender role (system, user, assistant)
    pub role: String,
    /// Message content
    pub content: String,
    /// Prompt-side token count, when known
    pub tokens_in: Option<i64>,
    /// Completion-side token count, when known
    pub tokens_out: Option<i64>,
    /// Provider that generated the message, for assistant rows
    pub provider: Option<String>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
}

/// Metadata recorded alongside an appended message
#[derive(Debug, Clone, Default)]
pub struct MessageMeta {
    /// Prompt-side token count
    pub tokens_in: Option<u32>,
    /// Completion-side token count
    pub tokens_out: Option<u32>,
    /// Provider identifier
    pub provider: Option<String>,
}

/// Session and message persistence operations
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    /// Create a store over the shared connection pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Session Operations
    // ========================================================================

    /// Fetch a session, enforcing ownership
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn get_session(
        &self,
        session_id: &str,
        user_id: Uuid,
    ) -> AppResult<Option<ChatSessionRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, title, created_at, updated_at, last_message_at
            FROM chat_sessions
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(session_id)
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get session: {e}")))?;

        Ok(row.map(|r| Self::session_from_row(&r)))
    }

    /// Fetch a session or create it on first use.
    ///
    /// Sessions come into existence with their first message; the title is
    /// derived from that message. A session id owned by another user is
    /// reported as not found rather than revealing its existence.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for a foreign session id, or a database
    /// error.
    pub async fn get_or_create_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        title_hint: &str,
    ) -> AppResult<ChatSessionRecord> {
        if let Some(session) = self.get_session(session_id, user_id).await? {
            return Ok(session);
        }

        // The id may exist under a different owner
        let taken = sqlx::query(r"SELECT id FROM chat_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to check session: {e}")))?;
        if taken.is_some() {
            return Err(AppError::not_found("Session"));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let title = derive_title(title_hint);

        sqlx::query(
            r"
            INSERT INTO chat_sessions (id, user_id, title, created_at, updated_at, last_message_at)
            VALUES ($1, $2, $3, $4, $4, NULL)
            ",
        )
        .bind(session_id)
        .bind(user_id.to_string())
        .bind(&title)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create session: {e}")))?;

        Ok(ChatSessionRecord {
            id: session_id.to_owned(),
            user_id: user_id.to_string(),
            title,
            created_at: now.clone(),
            updated_at: now,
            last_message_at: None,
        })
    }

    /// Bump a session's update timestamp
    ///
    /// # Errors
    ///
    /// Returns a database error if the update fails.
    pub async fn touch_session(&self, session_id: &str) -> AppResult<()> {
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(r"UPDATE chat_sessions SET updated_at = $1 WHERE id = $2")
            .bind(&now)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to touch session: {e}")))?;

        Ok(())
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    /// Append a message to a session.
    ///
    /// The insert and the session touch run in one transaction; the message
    /// is visible to readers only with its session timestamps updated.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` if the transaction cannot commit.
    pub async fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        meta: MessageMeta,
    ) -> AppResult<ChatMessageRecord> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let role_str = role.as_str();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::persistence(format!("Failed to open transaction: {e}")))?;

        let result = sqlx::query(
            r"
            INSERT INTO chat_messages (id, session_id, role, content, tokens_in, tokens_out, provider, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(&id)
        .bind(session_id)
        .bind(role_str)
        .bind(content)
        .bind(meta.tokens_in.map(i64::from))
        .bind(meta.tokens_out.map(i64::from))
        .bind(meta.provider.as_deref())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to append message: {e}")))?;

        sqlx::query(
            r"
            UPDATE chat_sessions SET updated_at = $1, last_message_at = $1 WHERE id = $2
            ",
        )
        .bind(&now)
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to update session: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| AppError::persistence(format!("Failed to commit message: {e}")))?;

        Ok(ChatMessageRecord {
            id,
            session_id: session_id.to_owned(),
            seq: result.last_insert_rowid(),
            role: role_str.to_owned(),
            content: content.to_owned(),
            tokens_in: meta.tokens_in.map(i64::from),
            tokens_out: meta.tokens_out.map(i64::from),
            provider: meta.provider,
            created_at: now,
        })
    }

    /// All messages for a session in insertion order
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn list_messages(&self, session_id: &str) -> AppResult<Vec<ChatMessageRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, session_id, seq, role, content, tokens_in, tokens_out, provider, created_at
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY seq ASC
            ",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list messages: {e}")))?;

        Ok(rows.iter().map(Self::message_from_row).collect())
    }

    /// The last `limit` messages of a session, oldest first.
    ///
    /// This is the conversation window fed to the prompt builder; older turns
    /// are truncated away.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn recent_messages(
        &self,
        session_id: &str,
        limit: u32,
    ) -> AppResult<Vec<ChatMessageRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, session_id, seq, role, content, tokens_in, tokens_out, provider, created_at
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY seq DESC
            LIMIT $2
            ",
        )
        .bind(session_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get recent messages: {e}")))?;

        let mut messages: Vec<ChatMessageRecord> =
            rows.iter().map(Self::message_from_row).collect();
        messages.reverse();

        Ok(messages)
    }

    /// Number of messages in a session
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn message_count(&self, session_id: &str) -> AppResult<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) as count FROM chat_messages WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to count messages: {e}")))?;

        Ok(row.get("count"))
    }

    fn session_from_row(r: &sqlx::sqlite::SqliteRow) -> ChatSessionRecord {
        ChatSessionRecord {
            id: r.get("id"),
            user_id: r.get("user_id"),
            title: r.get("title"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
            last_message_at: r.get("last_message_at"),
        }
    }

    fn message_from_row(r: &sqlx::sqlite::SqliteRow) -> ChatMessageRecord {
        ChatMessageRecord {
            id: r.get("id"),
            session_id: r.get("session_id"),
            seq: r.get("seq"),
            role: r.get("role"),
            content: r.get("content"),
            tokens_in: r.get("tokens_in"),
            tokens_out: r.get("tokens_out"),
            provider: r.get("provider"),
            created_at: r.get("created_at"),
        }
    }
}

/// Derive a session title from the first message content
fn derive_title(content: &str) -> String {
    const MAX_TITLE_CHARS: usize = 60;

    let line = content.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return "New conversation".to_owned();
    }
    if line.chars().count() <= MAX_TITLE_CHARS {
        line.to_owned()
    } else {
        let truncated: String = line.chars().take(MAX_TITLE_CHARS).collect();
        format!("{}…", truncated.trim_end())
    }
}
