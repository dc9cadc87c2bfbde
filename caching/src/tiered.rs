//! Tiered cache service for Reddit data: a process-local cache fronted by an
//! optional shared external tier for cross-process consistency.
//!
//! The shared tier is strictly best-effort. Every call is bounded by a short
//! timeout and every failure is logged and swallowed; callers never see an
//! error caused by the external cache.

use crate::memory::{CacheStats, InMemoryCache};
use async_trait::async_trait;
use parking_lot::Mutex;
use redlens_core::{CacheConfig, CacheError, UpdateCheckResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// External key/value store shared between processes (e.g. a Redis-style
/// service). Implementations are expected to handle TTLs server-side.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

pub struct TieredCache {
    local: Mutex<InMemoryCache<serde_json::Value>>,
    shared: Option<Arc<dyn SharedCache>>,
    shared_timeout: Duration,
    config: CacheConfig,
}

impl TieredCache {
    pub fn new(config: CacheConfig, shared: Option<Arc<dyn SharedCache>>) -> Self {
        let default_ttl = if config.default_ttl_secs > 0 {
            Some(Duration::from_secs(config.default_ttl_secs))
        } else {
            None
        };

        if shared.is_some() {
            info!("Tiered cache initialized with shared external tier");
        } else {
            info!("Tiered cache initialized (local tier only)");
        }

        Self {
            local: Mutex::new(InMemoryCache::new(config.max_size, default_ttl)),
            shared,
            shared_timeout: Duration::from_millis(config.shared_tier_timeout_ms),
            config,
        }
    }

    /// Look a key up in the shared tier first, falling back to the local
    /// cache. Shared-tier failures are non-fatal.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(shared) = &self.shared {
            match tokio::time::timeout(self.shared_timeout, shared.get(key)).await {
                Ok(Ok(Some(raw))) => match serde_json::from_str(&raw) {
                    Ok(value) => {
                        debug!("Shared cache hit for key: {}", key);
                        return Some(value);
                    }
                    Err(e) => warn!("Discarding malformed shared cache payload for {}: {}", key, e),
                },
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!("Shared cache get failed for {}: {}", key, e),
                Err(_) => warn!(
                    "Shared cache get timed out after {:?} for {}",
                    self.shared_timeout, key
                ),
            }
        }

        self.local.lock().get(key)
    }

    /// Store in both tiers. The local tier always gets the value even when
    /// the shared tier is down.
    pub async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) {
        if let Some(shared) = &self.shared {
            let ttl = ttl.unwrap_or(Duration::from_secs(self.config.default_ttl_secs));
            let payload = value.to_string();
            match tokio::time::timeout(self.shared_timeout, shared.set(key, payload, ttl)).await {
                Ok(Ok(())) => debug!("Mirrored key to shared cache: {}", key),
                Ok(Err(e)) => warn!("Shared cache set failed for {}: {}", key, e),
                Err(_) => warn!(
                    "Shared cache set timed out after {:?} for {}",
                    self.shared_timeout, key
                ),
            }
        }

        self.local.lock().set(key, value, ttl);
    }

    /// Remove a key from both tiers, reporting whether the local entry
    /// existed.
    pub async fn delete(&self, key: &str) -> bool {
        if let Some(shared) = &self.shared {
            match tokio::time::timeout(self.shared_timeout, shared.delete(key)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Shared cache delete failed for {}: {}", key, e),
                Err(_) => warn!("Shared cache delete timed out for {}", key),
            }
        }

        self.local.lock().delete(key)
    }

    pub fn cleanup_expired(&self) -> usize {
        self.local.lock().cleanup_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.local.lock().get_stats()
    }

    async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!("Discarding cache entry with stale shape for {}: {}", key, e);
                None
            }
        }
    }

    async fn set_typed<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(json) => self.set(key, json, Some(ttl)).await,
            Err(e) => warn!("Failed to serialize cache payload for {}: {}", key, e),
        }
    }

    // Domain-level helpers keyed the same way across processes.

    pub async fn get_check_run_results(
        &self,
        subreddit: &str,
        topic: &str,
    ) -> Option<UpdateCheckResult> {
        self.get_typed(&check_run_key(subreddit, topic)).await
    }

    pub async fn set_check_run_results(
        &self,
        subreddit: &str,
        topic: &str,
        results: &UpdateCheckResult,
    ) {
        let ttl = Duration::from_secs(self.config.check_run_ttl_secs);
        self.set_typed(&check_run_key(subreddit, topic), results, ttl)
            .await;
    }

    pub async fn get_subreddit_posts(&self, subreddit: &str) -> Option<serde_json::Value> {
        self.get(&subreddit_posts_key(subreddit)).await
    }

    pub async fn set_subreddit_posts(&self, subreddit: &str, posts: serde_json::Value) {
        // Short TTL keeps listings fresh.
        self.set(&subreddit_posts_key(subreddit), posts, Some(Duration::from_secs(180)))
            .await;
    }

    pub async fn get_trending_posts(&self, subreddit: &str) -> Option<serde_json::Value> {
        self.get(&trending_key(subreddit)).await
    }

    pub async fn set_trending_posts(&self, subreddit: &str, posts: serde_json::Value) {
        let ttl = Duration::from_secs(self.config.trending_ttl_secs);
        self.set(&trending_key(subreddit), posts, Some(ttl)).await;
    }

    /// Drop the listing-level entries for a subreddit after its content is
    /// known to have changed.
    pub async fn invalidate_subreddit(&self, subreddit: &str) {
        self.delete(&subreddit_posts_key(subreddit)).await;
        self.delete(&trending_key(subreddit)).await;
        info!("Invalidated cached data for subreddit: {}", subreddit);
    }
}

fn check_run_key(subreddit: &str, topic: &str) -> String {
    format!("check_run:{}:{}", subreddit, topic)
}

fn subreddit_posts_key(subreddit: &str) -> String {
    format!("subreddit_posts:{}", subreddit)
}

fn trending_key(subreddit: &str) -> String {
    format!("trending:{}", subreddit)
}
