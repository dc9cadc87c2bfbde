use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

// Operations slower than this count against the efficiency score.
const SLOW_OP_THRESHOLD: Duration = Duration::from_millis(1);
const UTILIZATION_TARGET: f64 = 0.75;

/// Point-in-time view of cache performance, including the 0-100 composite
/// efficiency score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
    pub entry_count: usize,
    pub max_size: usize,
    pub utilization_percent: f64,
    pub memory_usage_mb: f64,
    pub oldest_entry_age_seconds: f64,
    pub average_op_time_ms: f64,
    pub slow_op_ratio: f64,
    pub efficiency_score: f64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Option<Duration>,
    access_count: u64,
    last_accessed: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed: now,
        }
    }

    /// An entry is logically absent once its TTL has elapsed, even while it
    /// is still physically present waiting for a sweep.
    fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.created_at.elapsed() > ttl,
            None => false,
        }
    }

    fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed = Instant::now();
    }
}

/// In-process cache with TTL expiry and least-recently-used eviction.
///
/// Callers are expected to wrap this in a lock; all operations take
/// `&mut self` because even reads update recency metadata.
#[derive(Debug)]
pub struct InMemoryCache<V> {
    max_size: usize,
    default_ttl: Option<Duration>,
    store: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    total_requests: u64,
    op_count: u64,
    total_op_time: Duration,
    slow_ops: u64,
}

impl<V: Clone> InMemoryCache<V> {
    pub fn new(max_size: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            max_size: max_size.max(1),
            default_ttl,
            store: HashMap::new(),
            hits: 0,
            misses: 0,
            total_requests: 0,
            op_count: 0,
            total_op_time: Duration::ZERO,
            slow_ops: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        let op_start = Instant::now();
        self.total_requests += 1;

        let expired = match self.store.get(key) {
            None => {
                self.misses += 1;
                self.record_op(op_start);
                return None;
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            // Lazy deletion: expired entries count as misses.
            self.store.remove(key);
            self.misses += 1;
            self.record_op(op_start);
            return None;
        }

        let entry = self.store.get_mut(key).expect("entry checked above");
        entry.touch();
        self.hits += 1;
        let value = entry.value.clone();
        self.record_op(op_start);

        debug!("Cache hit for key: {}", key);
        Some(value)
    }

    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let op_start = Instant::now();
        let key = key.into();
        let ttl = ttl.or(self.default_ttl);

        // Capacity is only enforced for new keys; updating an existing key
        // never evicts.
        if self.store.len() >= self.max_size && !self.store.contains_key(&key) {
            self.evict_lru();
        }

        debug!("Cached value for key: {} (TTL: {:?})", key, ttl);
        self.store.insert(key, CacheEntry::new(value, ttl));
        self.record_op(op_start);
    }

    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.store.remove(key).is_some();
        if removed {
            debug!("Deleted cache key: {}", key);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.hits = 0;
        self.misses = 0;
        self.total_requests = 0;
        self.op_count = 0;
        self.total_op_time = Duration::ZERO;
        self.slow_ops = 0;
        info!("Cache cleared");
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Sweep every expired entry and return how many were removed. Intended
    /// to run periodically, not on every access.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired_keys: Vec<String> = self
            .store
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.store.remove(key);
        }

        if !expired_keys.is_empty() {
            info!("Cleaned up {} expired cache entries", expired_keys.len());
        }

        expired_keys.len()
    }

    pub fn get_stats(&self) -> CacheStats {
        let hit_rate = if self.total_requests > 0 {
            self.hits as f64 / self.total_requests as f64
        } else {
            0.0
        };

        let utilization = self.store.len() as f64 / self.max_size as f64;

        // Shallow estimate: keys plus fixed entry overhead. Values are
        // counted by their inline size only.
        let entry_bytes = std::mem::size_of::<CacheEntry<V>>();
        let total_bytes: usize = self
            .store
            .keys()
            .map(|key| key.len() + entry_bytes)
            .sum();
        let memory_usage_mb = total_bytes as f64 / 1024.0 / 1024.0;

        let oldest_entry_age_seconds = self
            .store
            .values()
            .map(|entry| entry.created_at.elapsed().as_secs_f64())
            .fold(0.0, f64::max);

        let average_op_time_ms = if self.op_count > 0 {
            self.total_op_time.as_secs_f64() * 1000.0 / self.op_count as f64
        } else {
            0.0
        };
        let slow_op_ratio = if self.op_count > 0 {
            self.slow_ops as f64 / self.op_count as f64
        } else {
            0.0
        };

        let efficiency_score = efficiency_score(
            hit_rate,
            utilization,
            average_op_time_ms,
            slow_op_ratio,
        );

        let mut warnings = Vec::new();
        if memory_usage_mb > 100.0 {
            warnings.push(format!("High cache memory usage: {:.1}MB", memory_usage_mb));
        }
        if self.total_requests > 100 && hit_rate < 0.5 {
            warnings.push(format!("Low cache hit rate: {:.1}%", hit_rate * 100.0));
        }
        if average_op_time_ms > 5.0 {
            warnings.push(format!(
                "Slow cache operations: {:.2}ms average",
                average_op_time_ms
            ));
        }

        CacheStats {
            hits: self.hits,
            misses: self.misses,
            total_requests: self.total_requests,
            hit_rate,
            entry_count: self.store.len(),
            max_size: self.max_size,
            utilization_percent: utilization * 100.0,
            memory_usage_mb,
            oldest_entry_age_seconds,
            average_op_time_ms,
            slow_op_ratio,
            efficiency_score,
            warnings,
        }
    }

    /// Evict the entry with the oldest `last_accessed`; ties broken by
    /// whichever is found first.
    fn evict_lru(&mut self) {
        let lru_key = self
            .store
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone());

        if let Some(key) = lru_key {
            self.store.remove(&key);
            debug!("Evicted LRU cache entry: {}", key);
        }
    }

    fn record_op(&mut self, op_start: Instant) {
        let elapsed = op_start.elapsed();
        self.op_count += 1;
        self.total_op_time += elapsed;
        if elapsed > SLOW_OP_THRESHOLD {
            self.slow_ops += 1;
        }
    }
}

/// Composite 0-100 score: hit rate (0-40), distance of utilization from the
/// 75% target (0-30), average operation latency (0-20), slow-operation
/// ratio (0-10).
fn efficiency_score(
    hit_rate: f64,
    utilization: f64,
    average_op_time_ms: f64,
    slow_op_ratio: f64,
) -> f64 {
    let hit_points = hit_rate.clamp(0.0, 1.0) * 40.0;

    let distance = (utilization - UTILIZATION_TARGET).abs() / UTILIZATION_TARGET;
    let utilization_points = (1.0 - distance.min(1.0)) * 30.0;

    let latency_points = (1.0 - (average_op_time_ms / 10.0).min(1.0)) * 20.0;

    let slow_points = (1.0 - slow_op_ratio.clamp(0.0, 1.0)) * 10.0;

    hit_points + utilization_points + latency_points + slow_points
}
