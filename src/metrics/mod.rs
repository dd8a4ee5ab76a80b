//! Prometheus-style metrics for the tier coordinator.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     CoordinatorMetrics                       │
//! │  ┌───────────────┐  ┌────────────────┐  ┌────────────────┐  │
//! │  │  Counters     │  │   Gauges       │  │   Histograms   │  │
//! │  │ - writes      │  │ - tier usage   │  │ - write by tier│  │
//! │  │ - failovers   │  │ - sessions     │  │ - read by tier │  │
//! │  │ - tier errors │  │ - unhealthy    │  │                │  │
//! │  └───────────────┘  └────────────────┘  └────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! These counters are operational telemetry. The rolling averages used for
//! tuning live in [`crate::performance`].
//!
//! # Example
//!
//! ```rust,ignore
//! let metrics = CoordinatorMetrics::new();
//! metrics.record_write(Some(TierKind::Hot), 10, Duration::from_millis(3));
//! metrics.record_failover(TierKind::Hot, TierKind::Warm);
//! println!("{}", metrics.to_prometheus());
//! ```

mod counters;
mod gauges;
mod histograms;

pub use counters::{Counter, LabeledCounter};
pub use gauges::{FloatGauge, Gauge};
pub use histograms::{Histogram, HistogramSnapshot, LabeledHistogram, DEFAULT_BUCKETS};

use crate::tier::DataLayer;
use crate::types::TierKind;
use std::time::Duration;

/// Latency buckets for tier calls (in seconds).
pub const TIER_LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Operational metrics of one coordinator.
#[derive(Debug)]
pub struct CoordinatorMetrics {
    pub writes_total: Counter,
    pub write_failures: Counter,
    pub metrics_written: Counter,
    /// Write latency by the tier that acknowledged the write.
    pub write_latency: LabeledHistogram<1>,

    pub reads_total: Counter,
    pub read_failures: Counter,
    /// Reads that left Hot for Warm after a Hot error.
    pub read_fallbacks: Counter,
    pub read_latency: LabeledHistogram<1>,
    pub cache_hits: Counter,
    pub cache_misses: Counter,

    pub failovers: LabeledCounter<2>,
    pub failovers_exhausted: Counter,
    pub tier_errors: LabeledCounter<1>,
    pub recoveries: LabeledCounter<1>,
    pub cold_flushes: Counter,

    pub migrations_total: Counter,
    pub migrations_partial: Counter,

    pub hot_usage: FloatGauge,
    pub warm_usage: FloatGauge,
    pub cold_usage: FloatGauge,
    pub unhealthy_tiers: Gauge,
    pub active_sessions: Gauge,
}

impl CoordinatorMetrics {
    pub fn new() -> Self {
        Self {
            writes_total: Counter::new("tier_writes_total", "Total write requests"),
            write_failures: Counter::new("tier_write_failures", "Writes no tier accepted"),
            metrics_written: Counter::new("tier_metrics_written", "Metrics accepted by any tier"),
            write_latency: LabeledHistogram::with_buckets(
                "tier_write_latency_seconds",
                "Write latency by acknowledging tier",
                ["tier"],
                TIER_LATENCY_BUCKETS.to_vec(),
            ),

            reads_total: Counter::new("tier_reads_total", "Total read requests"),
            read_failures: Counter::new("tier_read_failures", "Failed read requests"),
            read_fallbacks: Counter::new("tier_read_fallbacks", "Reads that fell back to warm"),
            read_latency: LabeledHistogram::with_buckets(
                "tier_read_latency_seconds",
                "Read latency by serving tier",
                ["tier"],
                TIER_LATENCY_BUCKETS.to_vec(),
            ),
            cache_hits: Counter::new("tier_cache_hits", "Hot reads that returned data"),
            cache_misses: Counter::new("tier_cache_misses", "Hot reads that returned nothing"),

            failovers: LabeledCounter::new(
                "tier_failovers_total",
                "Writes redirected after a tier failure",
                ["from", "to"],
            ),
            failovers_exhausted: Counter::new(
                "tier_failovers_exhausted",
                "Failures with no remaining fallback",
            ),
            tier_errors: LabeledCounter::new("tier_errors_total", "Tier call failures", ["tier"]),
            recoveries: LabeledCounter::new("tier_recoveries_total", "Tiers marked healthy again", ["tier"]),
            cold_flushes: Counter::new("tier_cold_flushes", "Completed cold flushes"),

            migrations_total: Counter::new("tier_migrations_total", "Legacy migrations run"),
            migrations_partial: Counter::new("tier_migrations_partial", "Migrations that skipped a tier"),

            hot_usage: FloatGauge::new("tier_hot_usage_percent", "Hot tier usage percent"),
            warm_usage: FloatGauge::new("tier_warm_usage_percent", "Warm tier usage percent"),
            cold_usage: FloatGauge::new("tier_cold_usage_percent", "Cold tier usage percent"),
            unhealthy_tiers: Gauge::new("tier_unhealthy", "Tiers currently flagged unhealthy"),
            active_sessions: Gauge::new("tier_active_sessions", "Active sessions"),
        }
    }

    /// Record a write request. `tier` is where it landed, if anywhere.
    pub fn record_write(&self, tier: Option<TierKind>, metric_count: usize, latency: Duration) {
        self.writes_total.inc();
        match tier {
            Some(tier) => {
                self.metrics_written.inc_by(metric_count as u64);
                self.write_latency.observe_duration([tier.name()], latency);
            }
            None => self.write_failures.inc(),
        }
    }

    /// Record a read request. `tier` is the tier that served it, if any.
    pub fn record_read(&self, tier: Option<TierKind>, latency: Duration) {
        self.reads_total.inc();
        match tier {
            Some(tier) => self.read_latency.observe_duration([tier.name()], latency),
            None => self.read_failures.inc(),
        }
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.inc();
        } else {
            self.cache_misses.inc();
        }
    }

    pub fn record_tier_error(&self, tier: TierKind) {
        self.tier_errors.inc([tier.name()]);
    }

    pub fn record_failover(&self, from: TierKind, to: TierKind) {
        self.failovers.inc([from.name(), to.name()]);
    }

    pub fn record_recovery(&self, tier: TierKind) {
        self.recoveries.inc([tier.name()]);
    }

    /// Refresh tier gauges from registry state.
    pub fn update_tiers(&self, layers: &[DataLayer]) {
        let mut unhealthy = 0;
        for layer in layers {
            let gauge = match layer.name {
                TierKind::Hot => &self.hot_usage,
                TierKind::Warm => &self.warm_usage,
                TierKind::Cold => &self.cold_usage,
            };
            gauge.set(layer.current_usage_percent);
            if !layer.is_healthy {
                unhealthy += 1;
            }
        }
        self.unhealthy_tiers.set(unhealthy);
    }

    /// Point-in-time copy of the headline numbers.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes_total: self.writes_total.get(),
            write_failures: self.write_failures.get(),
            metrics_written: self.metrics_written.get(),
            reads_total: self.reads_total.get(),
            read_failures: self.read_failures.get(),
            read_fallbacks: self.read_fallbacks.get(),
            cache_hits: self.cache_hits.get(),
            cache_misses: self.cache_misses.get(),
            failovers: self.failovers.total(),
            failovers_exhausted: self.failovers_exhausted.get(),
            tier_errors: self.tier_errors.total(),
            cold_flushes: self.cold_flushes.get(),
            write_latency: self.write_latency.merged(),
            read_latency: self.read_latency.merged(),
        }
    }

    /// Format all metrics in Prometheus exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        for counter in [
            &self.writes_total,
            &self.write_failures,
            &self.metrics_written,
            &self.reads_total,
            &self.read_failures,
            &self.read_fallbacks,
            &self.cache_hits,
            &self.cache_misses,
            &self.failovers_exhausted,
            &self.cold_flushes,
            &self.migrations_total,
            &self.migrations_partial,
        ] {
            counter.render(&mut out);
        }
        self.failovers.render(&mut out);
        self.tier_errors.render(&mut out);
        self.recoveries.render(&mut out);

        for gauge in [&self.hot_usage, &self.warm_usage, &self.cold_usage] {
            gauge.render(&mut out);
        }
        self.unhealthy_tiers.render(&mut out);
        self.active_sessions.render(&mut out);

        self.write_latency.render(&mut out);
        self.read_latency.render(&mut out);

        out
    }
}

impl Default for CoordinatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of coordinator metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub writes_total: u64,
    pub write_failures: u64,
    pub metrics_written: u64,
    pub reads_total: u64,
    pub read_failures: u64,
    pub read_fallbacks: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub failovers: u64,
    pub failovers_exhausted: u64,
    pub tier_errors: u64,
    pub cold_flushes: u64,
    pub write_latency: HistogramSnapshot,
    pub read_latency: HistogramSnapshot,
}

impl MetricsSnapshot {
    /// Hot hit rate over all cache lookups (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }

    pub fn avg_write_latency_ms(&self) -> f64 {
        self.write_latency.mean() * 1000.0
    }

    pub fn avg_read_latency_ms(&self) -> f64 {
        self.read_latency.mean() * 1000.0
    }
}
