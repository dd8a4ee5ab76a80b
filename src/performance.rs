//! Rolling performance statistics and threshold-based tuning.
//!
//! Every read and write feeds one sample into [`PerformanceMonitor`].
//! Latencies are smoothed with `new = (old + sample) / 2`, so recent samples
//! dominate quickly. The figures are only cleared by [`PerformanceMonitor::reset`].
//!
//! [`PerformanceMonitor::tune`] turns the current figures into advisory
//! recommendations. The only change it applies itself is the Hot TTL
//! extension, which affects future writes only.

use crate::config::TuningThresholds;
use crate::tier::TierRegistry;
use crate::types::TierKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Kind of operation being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Read,
    Write,
}

/// Process-wide rolling aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub avg_write_latency_ms: f64,
    pub avg_read_latency_ms: f64,
    pub throughput_ops_per_sec: f64,
    pub error_rate_percent: f64,
    pub cache_hit_rate_percent: f64,
    pub total_operations: u64,
}

/// Outcome of [`PerformanceMonitor::tune`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningReport {
    /// Figures the recommendations were derived from.
    pub before: PerformanceMetrics,
    pub optimizations: Vec<String>,
    /// Hot TTL written to the registry, if the hit-rate rule fired.
    pub hot_ttl_applied: Option<Duration>,
}

#[derive(Debug)]
struct MonitorState {
    metrics: PerformanceMetrics,
    failed_operations: u64,
    cache_hits: u64,
    cache_lookups: u64,
    started: Instant,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            metrics: PerformanceMetrics::default(),
            failed_operations: 0,
            cache_hits: 0,
            cache_lookups: 0,
            started: Instant::now(),
        }
    }
}

/// Aggregates latency, throughput, error and cache-hit statistics.
#[derive(Debug)]
pub struct PerformanceMonitor {
    state: Mutex<MonitorState>,
    thresholds: TuningThresholds,
    registry: Arc<TierRegistry>,
}

impl PerformanceMonitor {
    pub fn new(registry: Arc<TierRegistry>, thresholds: TuningThresholds) -> Self {
        Self {
            state: Mutex::new(MonitorState::new()),
            thresholds,
            registry,
        }
    }

    /// Fold one operation into the rolling figures.
    pub fn record_operation(&self, kind: OperationKind, latency_ms: f64, success: bool) {
        let mut state = self.state.lock();
        if !success {
            state.failed_operations += 1;
        }

        let elapsed = state.started.elapsed().as_secs_f64().max(1.0);
        let failed = state.failed_operations;
        let m = &mut state.metrics;
        m.total_operations += 1;
        match kind {
            OperationKind::Write => {
                m.avg_write_latency_ms = (m.avg_write_latency_ms + latency_ms) / 2.0
            }
            OperationKind::Read => m.avg_read_latency_ms = (m.avg_read_latency_ms + latency_ms) / 2.0,
        }
        m.error_rate_percent = failed as f64 / m.total_operations as f64 * 100.0;
        m.throughput_ops_per_sec = m.total_operations as f64 / elapsed;
    }

    /// Record a Hot lookup on the read path.
    pub fn record_cache_lookup(&self, hit: bool) {
        let mut state = self.state.lock();
        state.cache_lookups += 1;
        if hit {
            state.cache_hits += 1;
        }
        state.metrics.cache_hit_rate_percent =
            state.cache_hits as f64 / state.cache_lookups as f64 * 100.0;
    }

    /// Current figures.
    pub fn snapshot(&self) -> PerformanceMetrics {
        self.state.lock().metrics.clone()
    }

    /// Clear all figures and restart the throughput clock.
    pub fn reset(&self) {
        *self.state.lock() = MonitorState::new();
        info!("Performance metrics reset");
    }

    /// Derive recommendations and apply the Hot TTL extension if warranted.
    pub fn tune(&self) -> TuningReport {
        let before = self.snapshot();
        let current_ttl = self.registry.ttl(TierKind::Hot);
        let optimizations = recommend(&before, &self.thresholds, current_ttl);

        let mut hot_ttl_applied = None;
        if before.cache_hit_rate_percent < self.thresholds.min_cache_hit_rate_percent {
            let extended = self.thresholds.extended_hot_ttl;
            if current_ttl.map_or(true, |ttl| ttl < extended) {
                self.registry.set_ttl(TierKind::Hot, Some(extended));
                hot_ttl_applied = Some(extended);
                info!(ttl_secs = extended.as_secs(), "Extended hot tier TTL");
            }
        }

        debug!(count = optimizations.len(), "Tuning pass complete");
        TuningReport {
            before,
            optimizations,
            hot_ttl_applied,
        }
    }
}

/// Threshold rules over a set of figures. Each rule fires independently.
pub fn recommend(
    metrics: &PerformanceMetrics,
    thresholds: &TuningThresholds,
    current_hot_ttl: Option<Duration>,
) -> Vec<String> {
    let mut out = Vec::new();

    if metrics.cache_hit_rate_percent < thresholds.min_cache_hit_rate_percent {
        let from = current_hot_ttl
            .map(|ttl| format!("{}s", ttl.as_secs()))
            .unwrap_or_else(|| "unbounded".to_string());
        out.push(format!(
            "Cache hit rate {:.1}% is below {:.0}%: extend hot tier TTL from {} to {}s",
            metrics.cache_hit_rate_percent,
            thresholds.min_cache_hit_rate_percent,
            from,
            thresholds.extended_hot_ttl.as_secs()
        ));
    }

    if metrics.avg_write_latency_ms > thresholds.max_avg_write_latency_ms {
        out.push(format!(
            "Average write latency {:.1}ms exceeds {:.0}ms: reduce write batch size from {} to {}",
            metrics.avg_write_latency_ms,
            thresholds.max_avg_write_latency_ms,
            thresholds.batch_size,
            (thresholds.batch_size / 2).max(1)
        ));
    }

    if metrics.throughput_ops_per_sec < thresholds.min_throughput_ops_per_sec {
        out.push(format!(
            "Throughput {:.1} ops/s is below {:.0}: move warm tier writes fully off the request path",
            metrics.throughput_ops_per_sec, thresholds.min_throughput_ops_per_sec
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;

    fn monitor() -> PerformanceMonitor {
        let config = CoordinatorConfig::default();
        PerformanceMonitor::new(Arc::new(TierRegistry::new(&config)), config.tuning)
    }

    #[test]
    fn test_latency_moving_average() {
        let monitor = monitor();
        monitor.record_operation(OperationKind::Write, 100.0, true);
        monitor.record_operation(OperationKind::Write, 50.0, true);
        monitor.record_operation(OperationKind::Read, 8.0, true);

        let m = monitor.snapshot();
        assert!((m.avg_write_latency_ms - 50.0).abs() < f64::EPSILON);
        assert!((m.avg_read_latency_ms - 4.0).abs() < f64::EPSILON);
        assert_eq!(m.total_operations, 3);
    }

    #[test]
    fn test_error_and_hit_rates() {
        let monitor = monitor();
        monitor.record_operation(OperationKind::Write, 1.0, true);
        monitor.record_operation(OperationKind::Write, 1.0, false);
        monitor.record_operation(OperationKind::Read, 1.0, true);
        monitor.record_operation(OperationKind::Read, 1.0, true);
        monitor.record_cache_lookup(true);
        monitor.record_cache_lookup(true);
        monitor.record_cache_lookup(true);
        monitor.record_cache_lookup(false);

        let m = monitor.snapshot();
        assert!((m.error_rate_percent - 25.0).abs() < f64::EPSILON);
        assert!((m.cache_hit_rate_percent - 75.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_over_elapsed_time() {
        let monitor = monitor();
        tokio::time::advance(Duration::from_secs(4)).await;
        for _ in 0..8 {
            monitor.record_operation(OperationKind::Read, 1.0, true);
        }
        assert!((monitor.snapshot().throughput_ops_per_sec - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_recommend_all_three() {
        let metrics = PerformanceMetrics {
            cache_hit_rate_percent: 60.0,
            avg_write_latency_ms: 150.0,
            throughput_ops_per_sec: 500.0,
            ..Default::default()
        };
        let out = recommend(
            &metrics,
            &TuningThresholds::default(),
            Some(Duration::from_secs(1800)),
        );

        assert_eq!(out.len(), 3);
        assert!(out[0].contains("from 1800s to 2700s"));
        assert!(out[1].contains("reduce write batch size"));
        assert!(out[2].contains("warm tier writes"));
    }

    #[test]
    fn test_recommend_nothing_when_healthy() {
        let metrics = PerformanceMetrics {
            cache_hit_rate_percent: 95.0,
            avg_write_latency_ms: 5.0,
            throughput_ops_per_sec: 5000.0,
            ..Default::default()
        };
        assert!(recommend(&metrics, &TuningThresholds::default(), None).is_empty());
    }

    #[test]
    fn test_tune_applies_hot_ttl_once() {
        let monitor = monitor();
        monitor.record_cache_lookup(false);

        let report = monitor.tune();
        assert_eq!(report.hot_ttl_applied, Some(Duration::from_secs(2700)));
        assert_eq!(
            monitor.registry.ttl(TierKind::Hot),
            Some(Duration::from_secs(2700))
        );

        // already extended
        let report = monitor.tune();
        assert!(report.hot_ttl_applied.is_none());
        assert!(!report.optimizations.is_empty());
    }

    #[test]
    fn test_reset() {
        let monitor = monitor();
        monitor.record_operation(OperationKind::Write, 10.0, false);
        monitor.reset();
        assert_eq!(monitor.snapshot(), PerformanceMetrics::default());
    }
}
