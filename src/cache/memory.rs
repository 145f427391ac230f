// ABOUTME: In-memory cache implementation with LRU eviction and TTL support
// ABOUTME: Includes background cleanup task for expired entries
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

use super::{CacheConfig, CacheKey, CacheProvider};
use crate::errors::AppResult;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// In-memory cache entry with expiration
#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn remaining_ttl(&self) -> Option<Duration> {
        self.expires_at.checked_duration_since(Instant::now())
    }
}

/// In-memory cache with LRU eviction and background cleanup.
///
/// The store is shared (`Arc<RwLock<LruCache>>`) between cache operations and
/// the background sweep task. `LruCache` evicts the least-recently-used entry
/// automatically when capacity is reached.
#[derive(Clone)]
pub struct InMemoryCache {
    store: Arc<RwLock<LruCache<String, Entry>>>,
    shutdown_tx: Option<Arc<tokio::sync::mpsc::Sender<()>>>,
}

impl InMemoryCache {
    /// Fallback capacity when config specifies zero entries
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
        Some(n) => n,
        None => unreachable!(),
    };

    fn new_with_config(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(Self::DEFAULT_CAPACITY);
        let store = Arc::new(RwLock::new(LruCache::new(capacity)));

        let shutdown_tx = if config.enable_background_cleanup {
            let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
            let store_clone = Arc::clone(&store);
            let cleanup_interval = config.cleanup_interval;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(cleanup_interval);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            Self::sweep_expired(&store_clone).await;
                        }
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("Cache sweep task received shutdown signal");
                            break;
                        }
                    }
                }
            });

            Some(Arc::new(shutdown_tx))
        } else {
            None
        };

        Self { store, shutdown_tx }
    }

    /// Remove all expired entries from the store
    async fn sweep_expired(store: &Arc<RwLock<LruCache<String, Entry>>>) {
        let mut guard = store.write().await;

        // Collect keys first; the cache cannot be mutated while iterating
        let expired: Vec<String> = guard
            .iter()
            .filter_map(|(k, v)| v.is_expired().then(|| k.clone()))
            .collect();

        for key in &expired {
            guard.pop(key);
        }

        let removed = expired.len();
        drop(guard);
        if removed > 0 {
            tracing::debug!("Swept {removed} expired cache entries");
        }
    }
}

#[async_trait::async_trait]
impl CacheProvider for InMemoryCache {
    async fn new(config: CacheConfig) -> AppResult<Self> {
        Ok(Self::new_with_config(&config))
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        let serialized = serde_json::to_vec(value)?;
        let entry = Entry::new(serialized, ttl);

        // Eviction happens automatically on push
        self.store.write().await.push(key.to_string(), entry);

        Ok(())
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        let mut store = self.store.write().await;

        // LruCache::get is mutable (updates access order)
        if let Some(entry) = store.get(&key.to_string()) {
            if entry.is_expired() {
                store.pop(&key.to_string());
                drop(store);
                return Ok(None);
            }

            let value: T = serde_json::from_slice(&entry.data)?;
            drop(store);
            return Ok(Some(value));
        }
        drop(store);

        Ok(None)
    }

    async fn invalidate(&self, key: &CacheKey) -> AppResult<()> {
        self.store.write().await.pop(&key.to_string());
        Ok(())
    }

    async fn exists(&self, key: &CacheKey) -> AppResult<bool> {
        let mut store = self.store.write().await;

        if let Some(entry) = store.get(&key.to_string()) {
            if entry.is_expired() {
                store.pop(&key.to_string());
                drop(store);
                return Ok(false);
            }
            drop(store);
            return Ok(true);
        }
        drop(store);

        Ok(false)
    }

    async fn ttl(&self, key: &CacheKey) -> AppResult<Option<Duration>> {
        let store = self.store.write().await;

        // peek avoids disturbing the LRU order
        if let Some(entry) = store.peek(&key.to_string()) {
            if entry.is_expired() {
                return Ok(None);
            }
            let ttl = entry.remaining_ttl();
            drop(store);
            return Ok(ttl);
        }

        Ok(None)
    }

    async fn clear_all(&self) -> AppResult<()> {
        self.store.write().await.clear();
        Ok(())
    }
}

impl Drop for InMemoryCache {
    fn drop(&mut self) {
        // The sweep task exits once all senders are gone; a best-effort nudge
        // lets it stop before the next tick
        if let Some(tx) = &self.shutdown_tx {
            if let Err(e) = tx.try_send(()) {
                tracing::debug!(error = ?e, "Cache shutdown signal send failed (channel likely closed)");
            }
        }
    }
}
