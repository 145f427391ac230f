// ABOUTME: Cache front-end wiring the configured backend
// ABOUTME: Follows the provider-factory pattern for pluggable cache backends
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

use super::{memory::InMemoryCache, CacheConfig, CacheKey, CacheProvider};
use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unified cache interface.
///
/// Currently backed by the in-memory store; an external backend can be added
/// here without touching call sites.
#[derive(Clone)]
pub struct Cache {
    inner: InMemoryCache,
}

impl Cache {
    /// Create a new cache instance from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if cache initialization fails.
    pub async fn new(config: CacheConfig) -> AppResult<Self> {
        tracing::info!(
            "Initializing in-memory response cache (max entries: {})",
            config.max_entries
        );
        let inner = InMemoryCache::new(config).await?;
        Ok(Self { inner })
    }

    /// Store a value with TTL
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails.
    pub async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        self.inner.set(key, value, ttl).await
    }

    /// Retrieve a value; `None` on miss or expiry
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        self.inner.get(key).await
    }

    /// Remove a single entry
    ///
    /// # Errors
    ///
    /// Returns an error if invalidation fails.
    pub async fn invalidate(&self, key: &CacheKey) -> AppResult<()> {
        self.inner.invalidate(key).await
    }

    /// Check if a live entry exists
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check fails.
    pub async fn exists(&self, key: &CacheKey) -> AppResult<bool> {
        self.inner.exists(key).await
    }

    /// Remaining TTL for a key
    ///
    /// # Errors
    ///
    /// Returns an error if the TTL check fails.
    pub async fn ttl(&self, key: &CacheKey) -> AppResult<Option<Duration>> {
        self.inner.ttl(key).await
    }

    /// Clear all entries
    ///
    /// # Errors
    ///
    /// Returns an error if the clear operation fails.
    pub async fn clear_all(&self) -> AppResult<()> {
        self.inner.clear_all().await
    }
}
