// ABOUTME: Response cache abstraction keyed by generation fingerprints
// ABOUTME: Pluggable backend support following the provider trait pattern
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! Response cache for expensive generations.
//!
//! Entries are keyed by the request [`Fingerprint`](crate::orchestrator::Fingerprint)
//! (plus user and artifact kind for isolation) and carry a TTL chosen by
//! artifact class: chat replies expire quickly, plans live for a day. An
//! expired entry is never served; eviction is lazy on lookup with a
//! background sweep as backstop.

/// Cache front-end wiring the configured backend
pub mod factory;
/// In-memory cache implementation
pub mod memory;

use crate::errors::AppResult;
use crate::models::ArtifactKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Default maximum entries held by the in-memory backend
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;
/// Default background sweep interval in seconds
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;

/// Cache provider trait for pluggable backend implementations
#[async_trait::async_trait]
pub trait CacheProvider: Send + Sync + Clone {
    /// Create a new cache instance with configuration
    ///
    /// # Errors
    ///
    /// Returns an error if cache initialization fails.
    async fn new(config: CacheConfig) -> AppResult<Self>
    where
        Self: Sized;

    /// Store a value with the given TTL
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails.
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()>;

    /// Retrieve a value; `None` on miss or expiry
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> AppResult<Option<T>>;

    /// Remove a single entry
    ///
    /// # Errors
    ///
    /// Returns an error if invalidation fails.
    async fn invalidate(&self, key: &CacheKey) -> AppResult<()>;

    /// Check if a live (unexpired) entry exists
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check fails.
    async fn exists(&self, key: &CacheKey) -> AppResult<bool>;

    /// Remaining TTL for a key, if present and unexpired
    ///
    /// # Errors
    ///
    /// Returns an error if the TTL check fails.
    async fn ttl(&self, key: &CacheKey) -> AppResult<Option<Duration>>;

    /// Clear all entries (testing/admin)
    ///
    /// # Errors
    ///
    /// Returns an error if the clear operation fails.
    async fn clear_all(&self) -> AppResult<()>;
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries (for the in-memory backend)
    pub max_entries: usize,
    /// Background sweep interval for expired entries
    pub cleanup_interval: Duration,
    /// Enable the background sweep task (disable in tests to avoid
    /// spawning onto the test runtime)
    pub enable_background_cleanup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            enable_background_cleanup: true,
        }
    }
}

/// Structured cache key with per-user isolation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// User the generation belongs to
    pub user_id: Uuid,
    /// Artifact class
    pub kind: ArtifactKind,
    /// Hex fingerprint of the normalized request
    pub fingerprint: String,
}

impl CacheKey {
    /// Create a new cache key
    #[must_use]
    pub const fn new(user_id: Uuid, kind: ArtifactKind, fingerprint: String) -> Self {
        Self {
            user_id,
            kind,
            fingerprint,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user:{}:{}:{}",
            self.user_id, self.kind, self.fingerprint
        )
    }
}
