//! Connection pool management over the sqlx SQLite pool: scoped sessions
//! with checkout/checkin accounting, health assessment, sizing
//! recommendations, and an optional background heartbeat that forwards pool
//! gauges to the performance monitor.

use monitoring::PerformanceMonitor;
use parking_lot::Mutex;
use redlens_core::{CoreError, DatabaseConfig, PoolError};
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// Recommendation caps to avoid runaway growth.
const MAX_RECOMMENDED_POOL_SIZE: u32 = 50;
const MAX_RECOMMENDED_OVERFLOW: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolMetrics {
    pub pool_size: u32,
    pub max_overflow: u32,
    pub checked_in: u32,
    pub checked_out: u32,
    pub overflow_in_use: u32,
    pub total_checkouts: u64,
    pub total_checkins: u64,
    pub checkout_failures: u64,
    pub connection_errors: u64,
    pub pool_timeouts: u64,
    pub avg_checkout_time_ms: f64,
    pub max_checkout_time_ms: f64,
    pub pool_utilization_percent: f64,
    pub overflow_utilization_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolHealth {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolHealthStatus {
    pub status: PoolHealth,
    pub utilization_score: f64,
    pub performance_score: f64,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub needs_intervention: bool,
}

/// Recommended capacity adjustments. Produced, never applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolSizingRecommendations {
    pub pool_size: Option<u32>,
    pub max_overflow: Option<u32>,
    pub checkout_timeout_secs: Option<u64>,
}

impl PoolSizingRecommendations {
    pub fn is_empty(&self) -> bool {
        self.pool_size.is_none()
            && self.max_overflow.is_none()
            && self.checkout_timeout_secs.is_none()
    }
}

#[derive(Debug, Default)]
struct PoolCounters {
    total_checkouts: u64,
    total_checkins: u64,
    checkout_failures: u64,
    connection_errors: u64,
    pool_timeouts: u64,
    total_checkout_time_ms: f64,
    max_checkout_time_ms: f64,
}

struct PoolShared {
    counters: Mutex<PoolCounters>,
    monitor: Option<Arc<PerformanceMonitor>>,
}

struct LoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct DatabasePool {
    pool: SqlitePool,
    config: DatabaseConfig,
    shared: Arc<PoolShared>,
    heartbeat: Mutex<Option<LoopHandle>>,
}

impl DatabasePool {
    pub async fn connect(
        config: DatabaseConfig,
        monitor: Option<Arc<PerformanceMonitor>>,
    ) -> Result<Self, CoreError> {
        // Overflow connections share one sqlx pool; the nominal size is only
        // used for utilization accounting.
        let max_connections = config.pool_size + config.max_overflow;

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.checkout_timeout_secs))
            .max_lifetime(Duration::from_secs(config.recycle_secs))
            .connect(&config.url)
            .await
            .map_err(|e| {
                error!("Failed to create database pool: {}", e);
                CoreError::Pool(PoolError::Connection {
                    reason: e.to_string(),
                })
            })?;

        info!(
            "Initialized database pool with pool_size={}, max_overflow={}, monitoring={}",
            config.pool_size,
            config.max_overflow,
            if monitor.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            pool,
            config,
            shared: Arc::new(PoolShared {
                counters: Mutex::new(PoolCounters::default()),
                monitor,
            }),
            heartbeat: Mutex::new(None),
        })
    }

    /// Acquire a scoped database session. The connection is checked back in
    /// when the session drops, on every exit path.
    ///
    /// A checkout timeout is reported as [`PoolError::Exhausted`], distinct
    /// from a generic connection failure.
    pub async fn get_session(&self) -> Result<PoolSession, CoreError> {
        let checkout_start = Instant::now();

        match self.pool.acquire().await {
            Ok(conn) => {
                let wait_ms = checkout_start.elapsed().as_secs_f64() * 1000.0;
                self.shared.counters.lock().total_checkouts += 1;

                if let Some(monitor) = &self.shared.monitor {
                    monitor.record_metric(
                        "database_session_checkout_time",
                        wait_ms,
                        "ms",
                        None,
                    );
                }

                Ok(PoolSession {
                    conn: Some(conn),
                    acquired_at: Instant::now(),
                    shared: Arc::clone(&self.shared),
                })
            }
            Err(sqlx::Error::PoolTimedOut) => {
                let timeout_ms = self.config.checkout_timeout_secs * 1000;
                {
                    let mut counters = self.shared.counters.lock();
                    counters.pool_timeouts += 1;
                    counters.checkout_failures += 1;
                }
                error!("Database pool exhausted after {}ms", timeout_ms);

                if let Some(monitor) = &self.shared.monitor {
                    monitor.record_metric("database_pool_timeout", 1.0, "count", None);
                }

                Err(CoreError::Pool(PoolError::Exhausted { timeout_ms }))
            }
            Err(e) => {
                {
                    let mut counters = self.shared.counters.lock();
                    counters.connection_errors += 1;
                    counters.checkout_failures += 1;
                }
                error!("Database connection error: {}", e);

                if let Some(monitor) = &self.shared.monitor {
                    monitor.record_metric("database_connection_error", 1.0, "count", None);
                }

                Err(CoreError::Pool(PoolError::Connection {
                    reason: e.to_string(),
                }))
            }
        }
    }

    pub fn get_pool_metrics(&self) -> PoolMetrics {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;
        let checked_out = size.saturating_sub(idle);
        let overflow_in_use = checked_out.saturating_sub(self.config.pool_size);

        let counters = self.shared.counters.lock();
        let avg_checkout_time_ms = if counters.total_checkins > 0 {
            counters.total_checkout_time_ms / counters.total_checkins as f64
        } else {
            0.0
        };

        let pool_utilization_percent = if self.config.pool_size > 0 {
            checked_out.min(self.config.pool_size) as f64 / self.config.pool_size as f64 * 100.0
        } else {
            0.0
        };
        let overflow_utilization_percent = if self.config.max_overflow > 0 {
            overflow_in_use as f64 / self.config.max_overflow as f64 * 100.0
        } else {
            0.0
        };

        PoolMetrics {
            pool_size: self.config.pool_size,
            max_overflow: self.config.max_overflow,
            checked_in: idle,
            checked_out,
            overflow_in_use,
            total_checkouts: counters.total_checkouts,
            total_checkins: counters.total_checkins,
            checkout_failures: counters.checkout_failures,
            connection_errors: counters.connection_errors,
            pool_timeouts: counters.pool_timeouts,
            avg_checkout_time_ms,
            max_checkout_time_ms: counters.max_checkout_time_ms,
            pool_utilization_percent,
            overflow_utilization_percent,
        }
    }

    /// Score current pool state 0-100 on utilization and performance and map
    /// the combined score to an overall status.
    pub fn assess_pool_health(&self) -> PoolHealthStatus {
        let metrics = self.get_pool_metrics();
        let mut status = PoolHealthStatus {
            status: PoolHealth::Healthy,
            utilization_score: 100.0,
            performance_score: 100.0,
            warnings: Vec::new(),
            recommendations: Vec::new(),
            needs_intervention: false,
        };

        if metrics.pool_utilization_percent > self.config.pool_utilization_threshold * 100.0 {
            status.warnings.push(format!(
                "High pool utilization: {:.1}%",
                metrics.pool_utilization_percent
            ));
            status.utilization_score -= 30.0;
            status.needs_intervention = true;
        }

        if metrics.overflow_utilization_percent > self.config.overflow_ratio_warning * 100.0 {
            status.warnings.push(format!(
                "High overflow utilization: {:.1}%",
                metrics.overflow_utilization_percent
            ));
            status.utilization_score -= 20.0;
            status.needs_intervention = true;
        }

        if metrics.avg_checkout_time_ms > 100.0 {
            status.warnings.push(format!(
                "Slow connection checkout: {:.1}ms avg",
                metrics.avg_checkout_time_ms
            ));
            status.performance_score -= 25.0;
        }

        let total_operations = metrics.total_checkouts + metrics.total_checkins;
        if total_operations > 0 {
            let error_rate = (metrics.checkout_failures + metrics.connection_errors) as f64
                / total_operations as f64;
            if error_rate > 0.05 {
                status
                    .warnings
                    .push(format!("High error rate: {:.1}%", error_rate * 100.0));
                status.performance_score -= 40.0;
                status.needs_intervention = true;
            }
        }

        if metrics.pool_utilization_percent > 80.0 {
            status
                .recommendations
                .push("Consider increasing pool_size".to_string());
        }
        if metrics.overflow_utilization_percent > 70.0 {
            status
                .recommendations
                .push("Consider increasing max_overflow".to_string());
        }
        if metrics.avg_checkout_time_ms > 50.0 {
            status
                .recommendations
                .push("Investigate connection checkout performance".to_string());
        }

        let overall = (status.utilization_score + status.performance_score) / 2.0;
        status.status = if overall < 60.0 {
            PoolHealth::Critical
        } else if overall < 80.0 {
            PoolHealth::Warning
        } else {
            PoolHealth::Healthy
        };

        status
    }

    /// Produce capacity recommendations from current metrics, capped at hard
    /// maximums. Nothing is applied.
    pub fn optimize_pool_settings(&self) -> PoolSizingRecommendations {
        let metrics = self.get_pool_metrics();
        let mut recommendations = PoolSizingRecommendations::default();

        if metrics.pool_utilization_percent > 85.0 {
            let recommended = (self.config.pool_size as f64 * 1.3) as u32;
            recommendations.pool_size = Some(recommended.min(MAX_RECOMMENDED_POOL_SIZE));
        }

        if metrics.overflow_utilization_percent > 75.0 {
            let recommended = (self.config.max_overflow as f64 * 1.2) as u32;
            recommendations.max_overflow = Some(recommended.min(MAX_RECOMMENDED_OVERFLOW));
        }

        if metrics.avg_checkout_time_ms > 100.0 {
            let reduced = (self.config.checkout_timeout_secs as f64 * 0.8) as u64;
            recommendations.checkout_timeout_secs = Some(reduced.clamp(1, 20));
        }

        recommendations
    }

    pub fn reset_pool_metrics(&self) {
        *self.shared.counters.lock() = PoolCounters::default();
        info!("Pool metrics reset");
    }

    /// Start the background heartbeat: periodic health check plus metric
    /// forwarding to the performance monitor. No-op when already running or
    /// when monitoring is disabled in configuration.
    pub fn start_monitoring(self: &Arc<Self>) {
        if !self.config.enable_pool_monitoring {
            return;
        }

        let mut heartbeat = self.heartbeat.lock();
        if heartbeat.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let pool = Arc::clone(self);
        let interval = Duration::from_secs(self.config.heartbeat_interval_secs.max(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => pool.heartbeat_tick(),
                }
            }
        });

        *heartbeat = Some(LoopHandle { cancel, task });
        info!("Database pool monitoring started");
    }

    pub async fn stop_monitoring(&self) {
        let handle = self.heartbeat.lock().take();
        if let Some(LoopHandle { cancel, task }) = handle {
            cancel.cancel();
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                error!("Pool monitoring loop did not exit within 5s");
            }
            info!("Database pool monitoring stopped");
        }
    }

    pub async fn close(&self) {
        self.stop_monitoring().await;
        self.pool.close().await;
    }

    fn heartbeat_tick(&self) {
        let health = self.assess_pool_health();
        if health.needs_intervention {
            warn!(
                "Pool health issue detected: {:?}. Warnings: {}",
                health.status,
                health.warnings.join(", ")
            );
        }

        if let Some(monitor) = &self.shared.monitor {
            let metrics = self.get_pool_metrics();
            monitor.record_metric(
                "database_pool_utilization_percent",
                metrics.pool_utilization_percent,
                "gauge",
                None,
            );
            monitor.record_metric(
                "database_pool_checkout_time_avg_ms",
                metrics.avg_checkout_time_ms,
                "gauge",
                None,
            );
            monitor.record_metric(
                "database_pool_checkout_failures",
                metrics.checkout_failures as f64,
                "gauge",
                None,
            );
            monitor.record_metric(
                "database_pool_overflow_utilization",
                metrics.overflow_utilization_percent,
                "gauge",
                None,
            );
        }
    }
}

/// A checked-out database connection. Dropping the session records the
/// checkin and returns the connection to the pool.
pub struct PoolSession {
    conn: Option<PoolConnection<Sqlite>>,
    acquired_at: Instant,
    shared: Arc<PoolShared>,
}

impl PoolSession {
    pub fn connection(&mut self) -> &mut sqlx::SqliteConnection {
        self.conn.as_mut().expect("connection present until drop")
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for PoolSession {
    fn drop(&mut self) {
        let held_ms = self.acquired_at.elapsed().as_secs_f64() * 1000.0;

        let mut counters = self.shared.counters.lock();
        counters.total_checkins += 1;
        counters.total_checkout_time_ms += held_ms;
        if held_ms > counters.max_checkout_time_ms {
            counters.max_checkout_time_ms = held_ms;
        }
        drop(counters);

        debug!("Database session checked in after {:.2}ms", held_ms);
        // Dropping the sqlx connection returns it to the pool.
        self.conn.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(pool_size: u32, max_overflow: u32) -> DatabaseConfig {
        DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            pool_size,
            max_overflow,
            checkout_timeout_secs: 1,
            ..DatabaseConfig::default()
        }
    }

    #[tokio::test]
    async fn test_checkout_checkin_balance() {
        let pool = DatabasePool::connect(test_config(2, 0), None).await.unwrap();

        for _ in 0..5 {
            let session = pool.get_session().await.unwrap();
            drop(session);
        }

        let metrics = pool.get_pool_metrics();
        assert_eq!(metrics.total_checkouts, 5);
        assert_eq!(metrics.total_checkins, 5);
        assert_eq!(metrics.checkout_failures, 0);
    }

    #[tokio::test]
    async fn test_session_checkin_on_error_path() {
        let pool = DatabasePool::connect(test_config(1, 0), None).await.unwrap();

        async fn failing_query(pool: &DatabasePool) -> Result<(), CoreError> {
            let mut session = pool.get_session().await?;
            sqlx::query("SELECT * FROM missing_table")
                .execute(&mut *session.connection())
                .await
                .map_err(|e| CoreError::Internal {
                    message: e.to_string(),
                })?;
            Ok(())
        }

        assert!(failing_query(&pool).await.is_err());

        // The session was still checked in, so the next acquire succeeds.
        let metrics = pool.get_pool_metrics();
        assert_eq!(metrics.total_checkins, 1);
        assert!(pool.get_session().await.is_ok());
    }

    #[tokio::test]
    async fn test_pool_exhaustion_is_distinct_failure() {
        let pool = DatabasePool::connect(test_config(1, 0), None).await.unwrap();

        let held = pool.get_session().await.unwrap();
        let result = pool.get_session().await;

        match result {
            Err(CoreError::Pool(PoolError::Exhausted { timeout_ms })) => {
                assert_eq!(timeout_ms, 1000);
            }
            other => panic!("expected pool exhaustion, got {:?}", other.map(|_| ())),
        }

        let metrics = pool.get_pool_metrics();
        assert_eq!(metrics.pool_timeouts, 1);
        assert_eq!(metrics.checkout_failures, 1);
        drop(held);
    }

    #[tokio::test]
    async fn test_fresh_pool_is_healthy() {
        let pool = DatabasePool::connect(test_config(4, 4), None).await.unwrap();
        let health = pool.assess_pool_health();

        assert_eq!(health.status, PoolHealth::Healthy);
        assert!(!health.needs_intervention);
        assert!(health.warnings.is_empty());
        assert!(pool.optimize_pool_settings().is_empty());
    }

    #[tokio::test]
    async fn test_error_rate_degrades_health() {
        let pool = DatabasePool::connect(test_config(1, 0), None).await.unwrap();

        // One successful cycle, then repeated exhaustion failures.
        drop(pool.get_session().await.unwrap());
        let held = pool.get_session().await.unwrap();
        for _ in 0..3 {
            assert!(pool.get_session().await.is_err());
        }
        drop(held);

        let health = pool.assess_pool_health();
        assert!(health.needs_intervention);
        assert!(health
            .warnings
            .iter()
            .any(|w| w.contains("High error rate")));
        assert!(health.performance_score < 80.0);
    }

    #[tokio::test]
    async fn test_metrics_forwarded_to_monitor() {
        let monitor = Arc::new(PerformanceMonitor::new(Default::default()));
        let pool = DatabasePool::connect(test_config(2, 0), Some(monitor.clone()))
            .await
            .unwrap();

        drop(pool.get_session().await.unwrap());

        assert!(monitor
            .metric_summary("database_session_checkout_time")
            .is_some());
    }
}
