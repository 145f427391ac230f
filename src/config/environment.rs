// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Parses AI pipeline knobs, provider selection, database URL, and auth secrets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! Environment-based configuration for production deployment.
//!
//! The AI pipeline knobs (`AI_TIMEOUT`, `AI_MAX_TOKENS`, `AI_CACHE_TTL`, ...)
//! are read here once at startup and injected into the orchestrator; nothing
//! else in the codebase reads environment variables at request time.

use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default HTTP port
const DEFAULT_HTTP_PORT: u16 = 8081;
/// Default hard timeout for a single provider call, in seconds
const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;
/// Default max tokens per generation
const DEFAULT_AI_MAX_TOKENS: u32 = 1024;
/// Default chat-reply cache TTL (short: conversations move fast)
const DEFAULT_CHAT_TTL_SECS: u64 = 300;
/// Default plan cache TTL (long: plans are expensive and stable)
const DEFAULT_PLAN_TTL_SECS: u64 = 86_400;
/// Default analysis cache TTL
const DEFAULT_ANALYSIS_TTL_SECS: u64 = 3_600;
/// Default conversation window fed to the prompt builder
const DEFAULT_HISTORY_WINDOW: u32 = 10;
/// Default concurrent SSE streams allowed per user
const DEFAULT_MAX_STREAMS_PER_USER: usize = 2;
/// Default daily AI request ceiling for the free tier
const DEFAULT_FREE_DAILY_LIMIT: u32 = 10;
/// Default JWT expiry
const DEFAULT_JWT_EXPIRY_HOURS: i64 = 24;

/// Type-safe database location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DatabaseUrl {
    /// SQLite database with file path
    SQLite {
        /// Path to the database file
        path: PathBuf,
    },
    /// In-memory SQLite (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from a connection string
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path_str = s.strip_prefix("sqlite:").unwrap_or(s);
        if path_str == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path_str),
            }
        }
    }

    /// Convert to a sqlx connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_owned(),
        }
    }

    /// Whether this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::SQLite {
            path: PathBuf::from("./data/forma.db"),
        }
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_connection_string())
    }
}

/// Which concrete adapter backs a provider slot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// OpenAI-compatible chat completions endpoint (OpenAI, Groq, Ollama, ...)
    OpenAi,
    /// Google Gemini
    Gemini,
}

impl LlmBackend {
    /// Parse from string with fallback to the OpenAI-compatible backend
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gemini" => Self::Gemini,
            _ => Self::OpenAi,
        }
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// AI pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Primary provider backend (`LLM_PRIMARY_PROVIDER`)
    pub primary: LlmBackend,
    /// Fallback provider backend (`LLM_FALLBACK_PROVIDER`, optional)
    pub fallback: Option<LlmBackend>,
    /// Hard per-call provider timeout in seconds (`AI_TIMEOUT`)
    pub timeout_secs: u64,
    /// Max tokens per generation (`AI_MAX_TOKENS`)
    pub max_tokens: u32,
    /// Chat reply cache TTL in seconds (`AI_CACHE_TTL`)
    pub chat_ttl_secs: u64,
    /// Workout/meal plan cache TTL in seconds (`AI_PLAN_CACHE_TTL`)
    pub plan_ttl_secs: u64,
    /// Progress analysis cache TTL in seconds (`AI_ANALYSIS_CACHE_TTL`)
    pub analysis_ttl_secs: u64,
    /// Conversation window size for chat prompts (`AI_HISTORY_WINDOW`)
    pub history_window: u32,
    /// Concurrent SSE streams allowed per user (`AI_MAX_STREAMS_PER_USER`)
    pub max_streams_per_user: usize,
    /// Daily AI request ceiling for the free tier (`AI_FREE_DAILY_LIMIT`)
    pub free_daily_limit: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            primary: LlmBackend::OpenAi,
            fallback: Some(LlmBackend::Gemini),
            timeout_secs: DEFAULT_AI_TIMEOUT_SECS,
            max_tokens: DEFAULT_AI_MAX_TOKENS,
            chat_ttl_secs: DEFAULT_CHAT_TTL_SECS,
            plan_ttl_secs: DEFAULT_PLAN_TTL_SECS,
            analysis_ttl_secs: DEFAULT_ANALYSIS_TTL_SECS,
            history_window: DEFAULT_HISTORY_WINDOW,
            max_streams_per_user: DEFAULT_MAX_STREAMS_PER_USER,
            free_daily_limit: DEFAULT_FREE_DAILY_LIMIT,
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret (`JWT_SECRET`)
    pub jwt_secret: String,
    /// Token validity window (`JWT_EXPIRY_HOURS`)
    pub jwt_expiry_hours: i64,
}

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port (`HTTP_PORT`)
    pub http_port: u16,
    /// Database location (`DATABASE_URL`)
    pub database_url: DatabaseUrl,
    /// Authentication settings
    pub auth: AuthConfig,
    /// AI pipeline settings
    pub ai: AiConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `JWT_SECRET` is missing or a numeric variable
    /// fails to parse.
    pub fn from_env() -> AppResult<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::config("Missing JWT_SECRET environment variable"))?;

        Ok(Self {
            http_port: parse_env("HTTP_PORT", DEFAULT_HTTP_PORT)?,
            database_url: env::var("DATABASE_URL")
                .map(|s| DatabaseUrl::parse_url(&s))
                .unwrap_or_default(),
            auth: AuthConfig {
                jwt_secret,
                jwt_expiry_hours: parse_env("JWT_EXPIRY_HOURS", DEFAULT_JWT_EXPIRY_HOURS)?,
            },
            ai: AiConfig {
                primary: env::var("LLM_PRIMARY_PROVIDER")
                    .map(|s| LlmBackend::from_str_or_default(&s))
                    .unwrap_or(LlmBackend::OpenAi),
                fallback: match env::var("LLM_FALLBACK_PROVIDER") {
                    Ok(s) if s.eq_ignore_ascii_case("none") => None,
                    Ok(s) => Some(LlmBackend::from_str_or_default(&s)),
                    Err(_) => Some(LlmBackend::Gemini),
                },
                timeout_secs: parse_env("AI_TIMEOUT", DEFAULT_AI_TIMEOUT_SECS)?,
                max_tokens: parse_env("AI_MAX_TOKENS", DEFAULT_AI_MAX_TOKENS)?,
                chat_ttl_secs: parse_env("AI_CACHE_TTL", DEFAULT_CHAT_TTL_SECS)?,
                plan_ttl_secs: parse_env("AI_PLAN_CACHE_TTL", DEFAULT_PLAN_TTL_SECS)?,
                analysis_ttl_secs: parse_env("AI_ANALYSIS_CACHE_TTL", DEFAULT_ANALYSIS_TTL_SECS)?,
                history_window: parse_env("AI_HISTORY_WINDOW", DEFAULT_HISTORY_WINDOW)?,
                max_streams_per_user: parse_env(
                    "AI_MAX_STREAMS_PER_USER",
                    DEFAULT_MAX_STREAMS_PER_USER,
                )?,
                free_daily_limit: parse_env("AI_FREE_DAILY_LIMIT", DEFAULT_FREE_DAILY_LIMIT)?,
            },
        })
    }

    /// One-line startup summary safe for logs (no secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "port={} db={} primary={} fallback={} timeout={}s max_tokens={} window={} free_limit={}/day",
            self.http_port,
            self.database_url,
            self.ai.primary,
            self.ai
                .fallback
                .map_or_else(|| "none".to_owned(), |b| b.to_string()),
            self.ai.timeout_secs,
            self.ai.max_tokens,
            self.ai.history_window,
            self.ai.free_daily_limit,
        )
    }
}

/// Parse an optional environment variable, falling back to a default
fn parse_env<T>(name: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| AppError::config(format!("Invalid {name}={raw}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_parsing() {
        assert_eq!(DatabaseUrl::parse_url("sqlite::memory:"), DatabaseUrl::Memory);
        let url = DatabaseUrl::parse_url("sqlite:./data/forma.db");
        assert_eq!(url.to_connection_string(), "sqlite:./data/forma.db");
        assert!(!url.is_memory());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!(LlmBackend::from_str_or_default("gemini"), LlmBackend::Gemini);
        assert_eq!(LlmBackend::from_str_or_default("openai"), LlmBackend::OpenAi);
        assert_eq!(LlmBackend::from_str_or_default("groq"), LlmBackend::OpenAi);
    }

    #[test]
    fn test_summary_has_no_secret() {
        let config = ServerConfig {
            http_port: 8081,
            database_url: DatabaseUrl::Memory,
            auth: AuthConfig {
                jwt_secret: "super-secret".to_owned(),
                jwt_expiry_hours: 24,
            },
            ai: AiConfig::default(),
        };
        assert!(!config.summary().contains("super-secret"));
    }
}
