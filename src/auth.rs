// ABOUTME: JWT bearer authentication boundary yielding a user id and tier
// ABOUTME: Validates HS256 tokens minted by the external identity exchange
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! Authentication boundary.
//!
//! Token issuance and refresh live with the external identity provider; this
//! module only validates incoming bearer tokens and extracts the caller's
//! identity and tier. Test helpers can mint tokens with the same secret.

use crate::errors::{AppError, AppResult};
use crate::models::UserTier;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audience claim expected in every token
const AUDIENCE: &str = "forma-api";

/// `JWT` claims for user authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Subscription tier
    pub tier: UserTier,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Audience
    pub aud: String,
}

/// Authenticated caller context passed through the pipeline
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    /// Authenticated user ID
    pub user_id: Uuid,
    /// Subscription tier for quota enforcement
    pub tier: UserTier,
}

/// Authentication manager for `JWT` bearer tokens
#[derive(Clone)]
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry_hours: i64,
}

impl AuthManager {
    /// Create a new authentication manager from the shared HS256 secret
    #[must_use]
    pub fn new(secret: &[u8], token_expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            token_expiry_hours,
        }
    }

    /// Generate a token for a user.
    ///
    /// Production tokens come from the identity provider; this exists for
    /// local development and tests, which share the HS256 secret.
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails.
    pub fn generate_token(&self, user_id: Uuid, tier: UserTier) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            tier,
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.token_expiry_hours)).timestamp(),
            aud: AUDIENCE.to_owned(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to encode token: {e}")))
    }

    /// Validate a bearer token and return its claims
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is invalid, the token has expired,
    /// or the claims are malformed.
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_audience(&[AUDIENCE]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!("JWT validation failed: {e}");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::new(
                    crate::errors::ErrorCode::AuthExpired,
                    "Authentication token has expired",
                ),
                _ => AppError::auth_invalid(format!("Invalid token: {e}")),
            }
        })?;

        Ok(data.claims)
    }

    /// Extract and authenticate the caller from request headers
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` when no bearer token is present and
    /// `AuthInvalid`/`AuthExpired` when validation fails.
    pub fn authenticate(&self, headers: &HeaderMap) -> AppResult<AuthContext> {
        let header = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .ok_or_else(AppError::auth_required)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::auth_invalid("Authorization header is not a bearer token"))?;

        let claims = self.validate_token(token)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::auth_invalid("Token subject is not a valid user id"))?;

        Ok(AuthContext {
            user_id,
            tier: claims.tier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn manager() -> AuthManager {
        AuthManager::new(b"test-secret", 24)
    }

    #[test]
    fn test_token_round_trip() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        let token = manager
            .generate_token(user_id, UserTier::Professional)
            .unwrap();

        let claims = manager.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.tier, UserTier::Professional);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = manager()
            .generate_token(Uuid::new_v4(), UserTier::Starter)
            .unwrap();
        let other = AuthManager::new(b"different-secret", 24);
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn test_authenticate_from_headers() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        let token = manager.generate_token(user_id, UserTier::Starter).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );

        let ctx = manager.authenticate(&headers).unwrap();
        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.tier, UserTier::Starter);
    }

    #[test]
    fn test_missing_header_is_auth_required() {
        let err = manager().authenticate(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::AuthRequired);
    }
}
