//! Configuration types for the tier coordinator.

use crate::error::{Error, Result};
use crate::types::TierKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Hot tier policy.
    pub hot: TierPolicy,

    /// Warm tier policy.
    pub warm: TierPolicy,

    /// Cold tier policy.
    pub cold: TierPolicy,

    /// Load-balancing strategy. Fixed after startup.
    pub strategy: LoadBalancingStrategy,

    /// Thresholds used by adaptive tuning.
    pub tuning: TuningThresholds,

    /// Usage gauge increase per stored metric, in percentage points.
    /// This is a heuristic gauge, not byte accounting.
    pub usage_per_metric: f64,

    /// Minimum spacing between Cold flushes of one session.
    pub cold_flush_interval: Duration,

    /// Delay before a recovery probe runs after a failover.
    pub recovery_delay: Duration,

    /// Allowed Hot/Warm count drift, as a fraction of the Hot count.
    pub consistency_tolerance: f64,

    /// Usage of the legacy single store being replaced, in percent.
    pub legacy_usage_percent: f64,

    /// Sessions idle longer than this are closed by the health loop.
    /// None disables reaping.
    pub session_idle_timeout: Option<Duration>,

    /// Maximum number of batches held by the in-memory Hot store.
    pub hot_store_capacity: u64,

    /// Buffer size of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            hot: TierPolicy::new(Some(Duration::from_secs(1800)), 40.0, 5.0), // 30 minutes
            warm: TierPolicy::new(Some(Duration::from_secs(604_800)), 60.0, 10.0), // 7 days
            cold: TierPolicy::new(None, 10.0, 5.0),
            strategy: LoadBalancingStrategy::default(),
            tuning: TuningThresholds::default(),
            usage_per_metric: 0.01,
            cold_flush_interval: Duration::from_secs(5 * 60),
            recovery_delay: Duration::from_secs(60),
            consistency_tolerance: 0.10,
            legacy_usage_percent: 120.0,
            session_idle_timeout: None,
            hot_store_capacity: 100_000,
            event_capacity: 256,
        }
    }
}

impl CoordinatorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy for the given tier.
    pub fn policy(&self, tier: TierKind) -> &TierPolicy {
        match tier {
            TierKind::Hot => &self.hot,
            TierKind::Warm => &self.warm,
            TierKind::Cold => &self.cold,
        }
    }

    /// Set the policy for a tier.
    pub fn with_tier_policy(mut self, tier: TierKind, policy: TierPolicy) -> Self {
        match tier {
            TierKind::Hot => self.hot = policy,
            TierKind::Warm => self.warm = policy,
            TierKind::Cold => self.cold = policy,
        }
        self
    }

    /// Set the load-balancing strategy.
    pub fn with_strategy(mut self, strategy: LoadBalancingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the tuning thresholds.
    pub fn with_tuning(mut self, tuning: TuningThresholds) -> Self {
        self.tuning = tuning;
        self
    }

    /// Set the Cold flush spacing.
    pub fn with_cold_flush_interval(mut self, interval: Duration) -> Self {
        self.cold_flush_interval = interval;
        self
    }

    /// Set the recovery probe delay.
    pub fn with_recovery_delay(mut self, delay: Duration) -> Self {
        self.recovery_delay = delay;
        self
    }

    /// Set the consistency tolerance.
    pub fn with_consistency_tolerance(mut self, tolerance: f64) -> Self {
        self.consistency_tolerance = tolerance;
        self
    }

    /// Set the session idle timeout.
    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = Some(timeout);
        self
    }

    /// Set the in-memory Hot store capacity.
    pub fn with_hot_store_capacity(mut self, capacity: u64) -> Self {
        self.hot_store_capacity = capacity;
        self
    }

    /// Check the configuration for values the coordinator cannot honour.
    pub fn validate(&self) -> Result<()> {
        for tier in TierKind::ALL {
            let policy = self.policy(tier);
            if policy.max_capacity_percent <= 0.0 {
                return Err(Error::Config(format!(
                    "{} tier capacity must be positive",
                    tier
                )));
            }
            if policy.initial_usage_percent < 0.0
                || policy.initial_usage_percent > policy.max_capacity_percent
            {
                return Err(Error::Config(format!(
                    "{} tier initial usage {} outside [0, {}]",
                    tier, policy.initial_usage_percent, policy.max_capacity_percent
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.consistency_tolerance) {
            return Err(Error::Config(format!(
                "consistency tolerance {} outside [0, 1]",
                self.consistency_tolerance
            )));
        }
        if self.usage_per_metric < 0.0 {
            return Err(Error::Config("usage per metric must not be negative".into()));
        }
        if self.recovery_delay.is_zero() || self.strategy.health_check_interval.is_zero() {
            return Err(Error::Config("probe intervals must be non-zero".into()));
        }
        if self.strategy.retry_attempts == 0 {
            return Err(Error::Config("retry attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Retention and capacity policy of a single tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierPolicy {
    /// Time-to-live for entries. None means unbounded.
    pub ttl: Option<Duration>,

    /// Capacity ceiling, in percent.
    pub max_capacity_percent: f64,

    /// Usage at startup, in percent.
    pub initial_usage_percent: f64,
}

impl TierPolicy {
    /// Create a new tier policy.
    pub fn new(ttl: Option<Duration>, max_capacity_percent: f64, initial_usage_percent: f64) -> Self {
        Self {
            ttl,
            max_capacity_percent,
            initial_usage_percent,
        }
    }
}

/// Balancing preference reported on the status surface. Reads themselves
/// always try Hot first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BalancingAlgorithm {
    /// Spread reads evenly; no single preferred tier.
    RoundRobin,
    /// Favour whichever of Hot/Warm has the lower usage ratio.
    LeastLoaded,
    /// Always favour Hot.
    PriorityBased,
    /// Favour Hot unless Hot is flagged unhealthy.
    Adaptive,
}

/// Process-wide load-balancing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancingStrategy {
    /// Advisory balancing algorithm.
    pub algorithm: BalancingAlgorithm,

    /// Whether failed writes cascade to the next tier.
    pub failover_enabled: bool,

    /// Interval of the periodic liveness probe.
    pub health_check_interval: Duration,

    /// Liveness pings per tier per probe.
    pub retry_attempts: u32,
}

impl Default for LoadBalancingStrategy {
    fn default() -> Self {
        Self {
            algorithm: BalancingAlgorithm::Adaptive,
            failover_enabled: true,
            health_check_interval: Duration::from_secs(30),
            retry_attempts: 3,
        }
    }
}

impl LoadBalancingStrategy {
    /// Set the balancing algorithm.
    pub fn with_algorithm(mut self, algorithm: BalancingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Enable or disable the write cascade.
    pub fn with_failover_enabled(mut self, enabled: bool) -> Self {
        self.failover_enabled = enabled;
        self
    }

    /// Set the health check interval.
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Set the number of liveness pings per probe.
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }
}

/// Thresholds behind the adaptive tuning recommendations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningThresholds {
    /// Below this cache hit rate the Hot TTL is extended.
    pub min_cache_hit_rate_percent: f64,

    /// Above this average write latency a smaller batch size is advised.
    pub max_avg_write_latency_ms: f64,

    /// Below this throughput fully decoupled Warm writes are advised.
    pub min_throughput_ops_per_sec: f64,

    /// Hot TTL applied when the hit-rate rule fires.
    pub extended_hot_ttl: Duration,

    /// Current write batch size, quoted in the batch recommendation.
    pub batch_size: usize,
}

impl Default for TuningThresholds {
    fn default() -> Self {
        Self {
            min_cache_hit_rate_percent: 80.0,
            max_avg_write_latency_ms: 100.0,
            min_throughput_ops_per_sec: 1000.0,
            extended_hot_ttl: Duration::from_secs(2700), // 45 minutes
            batch_size: 1000,
        }
    }
}
