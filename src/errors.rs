// ABOUTME: Unified error handling with stable error codes and HTTP response mapping
// ABOUTME: Covers the generation pipeline taxonomy (quota, provider, validation, persistence)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! # Unified Error Handling System
//!
//! Centralized error types for the Forma server. Every failure surfaced by
//! the orchestration pipeline maps to a stable [`ErrorCode`] with a defined
//! HTTP status, so route handlers never hand-roll status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Authentication (1000-1999)
    /// Request carried no credentials
    #[serde(rename = "AUTH_REQUIRED")]
    AuthRequired = 1000,
    /// Credentials were present but invalid
    #[serde(rename = "AUTH_INVALID")]
    AuthInvalid = 1001,
    /// Token expired
    #[serde(rename = "AUTH_EXPIRED")]
    AuthExpired = 1002,

    // Quota & throttling (2000-2999)
    /// Daily AI request ceiling reached for the user's tier
    #[serde(rename = "QUOTA_EXCEEDED")]
    QuotaExceeded = 2000,
    /// Too many concurrent streaming connections for one user
    #[serde(rename = "STREAM_LIMIT_EXCEEDED")]
    StreamLimitExceeded = 2001,

    // Validation (3000-3999)
    /// The provided input is invalid
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput = 3000,
    /// A required field is missing
    #[serde(rename = "MISSING_REQUIRED_FIELD")]
    MissingRequiredField = 3001,
    /// A value is outside the acceptable range
    #[serde(rename = "VALUE_OUT_OF_RANGE")]
    ValueOutOfRange = 3002,

    // Resources (4000-4999)
    /// The requested resource was not found
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound = 4000,

    // Providers (5000-5999)
    /// Provider call exceeded the hard timeout
    #[serde(rename = "PROVIDER_TIMEOUT")]
    ProviderTimeout = 5000,
    /// Provider rejected the call with a rate-limit response
    #[serde(rename = "PROVIDER_RATE_LIMITED")]
    ProviderRateLimited = 5001,
    /// Provider returned a 5xx-class or malformed response
    #[serde(rename = "PROVIDER_ERROR")]
    ProviderError = 5002,
    /// Both primary and fallback providers failed
    #[serde(rename = "PROVIDER_UNAVAILABLE")]
    ProviderUnavailable = 5003,
    /// Provider output failed schema validation after the corrective retry
    #[serde(rename = "INVALID_GENERATION")]
    InvalidGeneration = 5004,

    // Client lifecycle (6000-6999)
    /// Caller dropped the connection mid-stream; cleanup signal, never
    /// returned as an HTTP body
    #[serde(rename = "CLIENT_DISCONNECTED")]
    ClientDisconnected = 6000,

    // Configuration (7000-7999)
    /// Configuration error
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError = 7000,

    // Internal (9000-9999)
    /// An internal server error occurred
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError = 9000,
    /// Database operation failed
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError = 9001,
    /// Durable write failed after a successful generation
    #[serde(rename = "PERSISTENCE_FAILURE")]
    PersistenceFailure = 9002,
    /// Serialization/deserialization failed
    #[serde(rename = "SERIALIZATION_ERROR")]
    SerializationError = 9003,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::AuthRequired | Self::AuthInvalid => 401,
            Self::AuthExpired => 403,
            Self::QuotaExceeded | Self::StreamLimitExceeded => 429,
            Self::InvalidInput | Self::MissingRequiredField | Self::ValueOutOfRange => 400,
            Self::ResourceNotFound => 404,
            Self::ProviderTimeout
            | Self::ProviderRateLimited
            | Self::ProviderError
            | Self::ProviderUnavailable => 503,
            Self::InvalidGeneration => 502,
            // nginx convention for "client closed request"; never actually
            // written to the wire because the client is gone
            Self::ClientDisconnected => 499,
            Self::ConfigError
            | Self::InternalError
            | Self::DatabaseError
            | Self::PersistenceFailure
            | Self::SerializationError => 500,
        }
    }

    /// Get a user-facing description of this error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication is required to access this resource",
            Self::AuthInvalid => "The provided authentication credentials are invalid",
            Self::AuthExpired => "The authentication token has expired",
            Self::QuotaExceeded => "Daily AI request limit reached for your plan",
            Self::StreamLimitExceeded => "Too many concurrent streaming requests",
            Self::InvalidInput => "The provided input is invalid",
            Self::MissingRequiredField => "A required field is missing from the request",
            Self::ValueOutOfRange => "The provided value is outside the acceptable range",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::ProviderTimeout => "The AI provider did not respond in time",
            Self::ProviderRateLimited => "The AI provider is rate limiting requests",
            Self::ProviderError => "The AI provider returned an error",
            Self::ProviderUnavailable => "AI generation is temporarily unavailable",
            Self::InvalidGeneration => "The AI provider returned an unusable response",
            Self::ClientDisconnected => "The client disconnected before the response completed",
            Self::ConfigError => "Configuration error encountered",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database operation failed",
            Self::PersistenceFailure => "The response could not be saved; the turn did not complete",
            Self::SerializationError => "Data serialization failed",
        }
    }
}

/// Additional context that can be attached to errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// User ID if available
    pub user_id: Option<Uuid>,
    /// Cache fingerprint of the request, when one was computed
    pub fingerprint: Option<String>,
    /// Provider that produced the failure, when applicable
    pub provider: Option<String>,
    /// Additional key-value context
    pub details: serde_json::Value,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            user_id: None,
            fingerprint: None,
            provider: None,
            details: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    pub context: ErrorContext,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new error with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Attach a user ID to the error context
    #[must_use]
    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.context.user_id = Some(user_id);
        self
    }

    /// Attach the request fingerprint to the error context
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.context.fingerprint = Some(fingerprint.into());
        self
    }

    /// Attach the provider name to the error context
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.context.provider = Some(provider.into());
        self
    }

    /// Attach structured details to the error context
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.context.details = details;
        self
    }

    /// Attach a source error for chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error payload
    pub error: ErrorResponseDetails,
}

/// Body of an HTTP error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    /// Stable error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Structured details, if any
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message: error.message,
                details: error.context.details,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse::from(self);
        (status, Json(body)).into_response()
    }
}

/// Convenience constructors for common errors
impl AppError {
    /// Authentication required
    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, "Authentication required")
    }

    /// Invalid authentication
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Daily quota exhausted
    pub fn quota_exceeded(limit: u32) -> Self {
        Self::new(
            ErrorCode::QuotaExceeded,
            format!("Daily limit of {limit} AI requests reached"),
        )
        .with_details(serde_json::json!({ "limit": limit, "resets": "next UTC day" }))
    }

    /// Per-user concurrent stream ceiling reached
    pub fn stream_limit_exceeded(limit: usize) -> Self {
        Self::new(
            ErrorCode::StreamLimitExceeded,
            format!("At most {limit} concurrent streams are allowed per user"),
        )
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Provider call timed out
    pub fn provider_timeout(provider: impl Into<String>) -> Self {
        let provider = provider.into();
        Self::new(
            ErrorCode::ProviderTimeout,
            format!("{provider} did not respond within the configured timeout"),
        )
        .with_provider(provider)
    }

    /// Provider returned a rate-limit response
    pub fn provider_rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        let provider = provider.into();
        Self::new(
            ErrorCode::ProviderRateLimited,
            format!("{provider}: {}", message.into()),
        )
        .with_provider(provider)
    }

    /// Provider returned a 5xx-class or malformed response
    pub fn provider_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        let provider = provider.into();
        Self::new(
            ErrorCode::ProviderError,
            format!("{provider}: {}", message.into()),
        )
        .with_provider(provider)
    }

    /// Both primary and fallback failed
    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProviderUnavailable, message)
    }

    /// Generation failed schema validation after the corrective retry
    pub fn invalid_generation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidGeneration, message)
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Durable write failed after generation succeeded
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PersistenceFailure, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        match error.source() {
            Some(source) => Self::new(ErrorCode::InternalError, error.to_string()).with_details(
                serde_json::json!({
                    "source": source.to_string()
                }),
            ),
            None => Self::new(ErrorCode::InternalError, error.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::new(ErrorCode::DatabaseError, error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, error.to_string()).with_source(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::QuotaExceeded.http_status(), 429);
        assert_eq!(ErrorCode::ProviderUnavailable.http_status(), 503);
        assert_eq!(ErrorCode::InvalidGeneration.http_status(), 502);
        assert_eq!(ErrorCode::InvalidInput.http_status(), 400);
        assert_eq!(ErrorCode::PersistenceFailure.http_status(), 500);
    }

    #[test]
    fn test_app_error_context() {
        let user = Uuid::new_v4();
        let error = AppError::provider_timeout("openai")
            .with_user_id(user)
            .with_fingerprint("abc123");

        assert_eq!(error.code, ErrorCode::ProviderTimeout);
        assert_eq!(error.context.user_id, Some(user));
        assert_eq!(error.context.fingerprint.as_deref(), Some("abc123"));
        assert_eq!(error.context.provider.as_deref(), Some("openai"));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = AppError::quota_exceeded(10);
        let response = ErrorResponse::from(error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("QUOTA_EXCEEDED"));
        assert!(json.contains("limit"));
    }
}
