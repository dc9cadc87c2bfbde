//! Performance monitoring: named metrics with bounded history and running
//! summaries, threshold-based alerting, convenience counters, and an optional
//! background loop sampling system resources.
//!
//! Metric state lives behind a synchronous lock so that recording works from
//! any context, including `Drop` implementations. The monitor is constructed
//! once at startup and shared by handle; the background loop starts and stops
//! explicitly.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use redlens_core::MonitoringConfig;

const MAX_ALERTS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub metric_name: String,
    pub current_value: f64,
    pub threshold_value: f64,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_requests: u64,
    pub average_response_time_ms: f64,
    pub database_queries: u64,
    pub queries_per_request: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub system_metrics: HashMap<String, f64>,
    pub alerts_count: usize,
    pub recent_alerts: Vec<PerformanceAlert>,
}

/// Source of system resource samples (CPU, memory, disk, network). When no
/// sampler is attached the background loop records nothing, by design.
pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> HashMap<String, f64>;
}

#[derive(Debug, Default)]
struct MonitorState {
    history: VecDeque<PerformanceMetric>,
    summaries: HashMap<String, MetricSummary>,
    alerts: Vec<PerformanceAlert>,
    request_count: u64,
    total_response_time_ms: f64,
    database_query_count: u64,
    cache_hits: u64,
    cache_misses: u64,
    last_system_sample: HashMap<String, f64>,
}

struct LoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct PerformanceMonitor {
    config: MonitoringConfig,
    state: Mutex<MonitorState>,
    sampler: Option<Arc<dyn ResourceSampler>>,
    monitoring: Mutex<Option<LoopHandle>>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitoringConfig) -> Self {
        Self::with_sampler(config, None)
    }

    pub fn with_sampler(
        config: MonitoringConfig,
        sampler: Option<Arc<dyn ResourceSampler>>,
    ) -> Self {
        info!("Performance monitoring service initialized");
        Self {
            config,
            state: Mutex::new(MonitorState::default()),
            sampler,
            monitoring: Mutex::new(None),
        }
    }

    /// Record a metric: appends to the bounded history, updates the running
    /// summary for the name, and evaluates alert thresholds.
    pub fn record_metric(
        &self,
        name: &str,
        value: f64,
        unit: &str,
        tags: Option<HashMap<String, String>>,
    ) {
        let metric = PerformanceMetric {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            timestamp: Utc::now(),
            tags: tags.unwrap_or_default(),
        };

        let mut state = self.state.lock();

        if state.history.len() >= self.config.max_metrics_history {
            state.history.pop_front();
        }
        state.history.push_back(metric);

        let summary = state.summaries.entry(name.to_string()).or_insert(
            MetricSummary {
                count: 0,
                sum: 0.0,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
                avg: 0.0,
            },
        );
        summary.count += 1;
        summary.sum += value;
        summary.min = summary.min.min(value);
        summary.max = summary.max.max(value);
        summary.avg = summary.sum / summary.count as f64;

        self.check_thresholds(&mut state, name, value);
    }

    /// Scoped timing region. The returned guard records
    /// `<operation>_duration` in milliseconds when dropped, on success and
    /// failure paths alike.
    pub fn measure_time(&self, operation_name: &str) -> OperationTimer<'_> {
        OperationTimer {
            monitor: self,
            name: operation_name.to_string(),
            start: Instant::now(),
        }
    }

    pub fn record_request(&self, response_time_ms: f64) {
        {
            let mut state = self.state.lock();
            state.request_count += 1;
            state.total_response_time_ms += response_time_ms;
        }
        self.record_metric("request_response_time", response_time_ms, "ms", None);
    }

    pub fn record_database_query(&self, query_time_ms: Option<f64>) {
        self.state.lock().database_query_count += 1;
        if let Some(time_ms) = query_time_ms {
            self.record_metric("database_query_time", time_ms, "ms", None);
        }
    }

    pub fn record_cache_operation(&self, hit: bool) {
        let hit_rate = {
            let mut state = self.state.lock();
            if hit {
                state.cache_hits += 1;
            } else {
                state.cache_misses += 1;
            }
            let total = state.cache_hits + state.cache_misses;
            state.cache_hits as f64 / total as f64
        };
        self.record_metric("cache_hit_rate", hit_rate, "ratio", None);
    }

    pub fn metric_summary(&self, name: &str) -> Option<MetricSummary> {
        self.state.lock().summaries.get(name).copied()
    }

    pub fn recent_metrics(&self, window: Duration) -> Vec<PerformanceMetric> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        self.state
            .lock()
            .history
            .iter()
            .filter(|metric| metric.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn alerts(&self) -> Vec<PerformanceAlert> {
        self.state.lock().alerts.clone()
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        let state = self.state.lock();

        let average_response_time_ms = if state.request_count > 0 {
            state.total_response_time_ms / state.request_count as f64
        } else {
            0.0
        };

        let total_cache_ops = state.cache_hits + state.cache_misses;
        let cache_hit_rate = if total_cache_ops > 0 {
            state.cache_hits as f64 / total_cache_ops as f64
        } else {
            0.0
        };

        let queries_per_request = if state.request_count > 0 {
            state.database_query_count as f64 / state.request_count as f64
        } else {
            0.0
        };

        let one_hour_ago = Utc::now() - chrono::Duration::hours(1);
        let recent_alerts: Vec<PerformanceAlert> = state
            .alerts
            .iter()
            .rev()
            .take(10)
            .filter(|alert| alert.timestamp > one_hour_ago)
            .cloned()
            .collect();

        PerformanceSummary {
            total_requests: state.request_count,
            average_response_time_ms,
            database_queries: state.database_query_count,
            queries_per_request,
            cache_hits: state.cache_hits,
            cache_misses: state.cache_misses,
            cache_hit_rate,
            system_metrics: state.last_system_sample.clone(),
            alerts_count: state.alerts.len(),
            recent_alerts,
        }
    }

    pub fn reset_counters(&self) {
        let mut state = self.state.lock();
        state.request_count = 0;
        state.total_response_time_ms = 0.0;
        state.database_query_count = 0;
        state.cache_hits = 0;
        state.cache_misses = 0;
        state.alerts.clear();
        info!("Performance counters reset");
    }

    /// Start the background sampling loop. A no-op when already running.
    pub fn start(self: &Arc<Self>) {
        let mut monitoring = self.monitoring.lock();
        if monitoring.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let monitor = Arc::clone(self);
        let interval = Duration::from_secs(self.config.sample_interval_secs.max(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => monitor.sample_system_resources(),
                }
            }
        });

        *monitoring = Some(LoopHandle { cancel, task });
        info!("Background system monitoring started");
    }

    /// Stop the background loop, waiting briefly for it to exit.
    pub async fn stop(&self) {
        let handle = self.monitoring.lock().take();
        if let Some(LoopHandle { cancel, task }) = handle {
            cancel.cancel();
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                error!("Monitoring loop did not exit within 5s");
            }
            info!("Background system monitoring stopped");
        }
    }

    fn sample_system_resources(&self) {
        let Some(sampler) = &self.sampler else {
            // No sampling capability: degrade to an empty metric set.
            return;
        };

        let sample = sampler.sample();
        self.state.lock().last_system_sample = sample.clone();

        for (name, value) in sample {
            self.record_metric(&name, value, "system", None);
        }
    }

    fn check_thresholds(&self, state: &mut MonitorState, name: &str, value: f64) {
        let thresholds = &self.config;

        // (threshold, true when the metric must stay below it)
        let check = match name {
            "request_response_time" => Some((thresholds.max_response_time_ms, true)),
            "memory_usage_mb" => Some((thresholds.max_memory_usage_mb, true)),
            "cpu_usage_percent" => Some((thresholds.max_cpu_usage_percent, true)),
            "cache_hit_rate" => Some((thresholds.min_cache_hit_rate, false)),
            _ => None,
        };

        let Some((threshold, upper_bound)) = check else {
            return;
        };

        let exceeded = if upper_bound {
            value > threshold
        } else {
            value < threshold
        };
        if !exceeded {
            return;
        }

        let severity = if upper_bound && value > threshold * 1.5 {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };

        let message = format!(
            "{} {:.2} {} threshold {:.2}",
            name,
            value,
            if upper_bound { "exceeds" } else { "below" },
            threshold
        );

        warn!("Performance alert: {}", message);

        state.alerts.push(PerformanceAlert {
            metric_name: name.to_string(),
            current_value: value,
            threshold_value: threshold,
            severity,
            message,
            timestamp: Utc::now(),
        });

        if state.alerts.len() > MAX_ALERTS {
            let excess = state.alerts.len() - MAX_ALERTS;
            state.alerts.drain(0..excess);
        }
    }
}

/// RAII timing guard produced by [`PerformanceMonitor::measure_time`].
pub struct OperationTimer<'a> {
    monitor: &'a PerformanceMonitor,
    name: String,
    start: Instant,
}

impl OperationTimer<'_> {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for OperationTimer<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        debug!("Operation '{}' took {:.2}ms", self.name, elapsed_ms);
        self.monitor
            .record_metric(&format!("{}_duration", self.name), elapsed_ms, "ms", None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> PerformanceMonitor {
        PerformanceMonitor::new(MonitoringConfig::default())
    }

    #[test]
    fn test_record_metric_updates_summary() {
        let monitor = monitor();
        monitor.record_metric("queue_depth", 3.0, "count", None);
        monitor.record_metric("queue_depth", 7.0, "count", None);

        let summary = monitor.metric_summary("queue_depth").unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.sum, 10.0);
        assert_eq!(summary.min, 3.0);
        assert_eq!(summary.max, 7.0);
        assert_eq!(summary.avg, 5.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let config = MonitoringConfig {
            max_metrics_history: 5,
            ..MonitoringConfig::default()
        };
        let monitor = PerformanceMonitor::new(config);
        for i in 0..20 {
            monitor.record_metric("m", i as f64, "count", None);
        }

        let metrics = monitor.recent_metrics(Duration::from_secs(60));
        assert_eq!(metrics.len(), 5);
        // Oldest entries were dropped
        assert_eq!(metrics[0].value, 15.0);
    }

    #[test]
    fn test_threshold_alert_and_escalation() {
        let monitor = monitor();

        // Just over the 2000ms default threshold: warning.
        monitor.record_request(2100.0);
        // More than 1.5x the threshold: critical.
        monitor.record_request(4000.0);

        let alerts = monitor.alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
        assert_eq!(alerts[1].severity, AlertSeverity::Critical);
        assert_eq!(alerts[1].metric_name, "request_response_time");
    }

    #[test]
    fn test_cache_hit_rate_alert_below_minimum() {
        let monitor = monitor();
        monitor.record_cache_operation(true);
        for _ in 0..9 {
            monitor.record_cache_operation(false);
        }

        let summary = monitor.performance_summary();
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.cache_misses, 9);
        assert!((summary.cache_hit_rate - 0.1).abs() < 1e-9);

        assert!(monitor
            .alerts()
            .iter()
            .any(|alert| alert.metric_name == "cache_hit_rate"));
    }

    #[test]
    fn test_measure_time_records_on_early_return() {
        let monitor = monitor();

        fn failing_operation(monitor: &PerformanceMonitor) -> Result<(), String> {
            let _timer = monitor.measure_time("fetch_posts");
            Err("upstream failure".to_string())
        }

        assert!(failing_operation(&monitor).is_err());

        // The timer still recorded the duration on the error path.
        let summary = monitor.metric_summary("fetch_posts_duration").unwrap();
        assert_eq!(summary.count, 1);
        assert!(summary.max >= 0.0);
    }

    #[test]
    fn test_performance_summary_aggregates() {
        let monitor = monitor();
        monitor.record_request(100.0);
        monitor.record_request(300.0);
        monitor.record_database_query(Some(12.0));
        monitor.record_database_query(None);

        let summary = monitor.performance_summary();
        assert_eq!(summary.total_requests, 2);
        assert_eq!(summary.average_response_time_ms, 200.0);
        assert_eq!(summary.database_queries, 2);
        assert_eq!(summary.queries_per_request, 1.0);
    }

    struct FixedSampler;

    impl ResourceSampler for FixedSampler {
        fn sample(&self) -> HashMap<String, f64> {
            HashMap::from([
                ("cpu_usage_percent".to_string(), 12.5),
                ("memory_usage_mb".to_string(), 256.0),
            ])
        }
    }

    #[tokio::test]
    async fn test_background_loop_samples_and_stops() {
        let config = MonitoringConfig {
            sample_interval_secs: 1,
            ..MonitoringConfig::default()
        };
        let monitor = Arc::new(PerformanceMonitor::with_sampler(
            config,
            Some(Arc::new(FixedSampler)),
        ));

        monitor.start();
        // Starting twice is a no-op.
        monitor.start();

        // The interval ticks immediately, so one sample lands right away.
        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.stop().await;

        let summary = monitor.performance_summary();
        assert_eq!(summary.system_metrics.get("cpu_usage_percent"), Some(&12.5));
        assert!(monitor.metric_summary("memory_usage_mb").is_some());
    }

    #[tokio::test]
    async fn test_missing_sampler_degrades_to_empty_sample() {
        let config = MonitoringConfig {
            sample_interval_secs: 1,
            ..MonitoringConfig::default()
        };
        let monitor = Arc::new(PerformanceMonitor::new(config));

        monitor.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.stop().await;

        assert!(monitor.performance_summary().system_metrics.is_empty());
    }
}
