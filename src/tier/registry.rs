//! Tier registry: capacity, usage, health and retention per tier.

use crate::config::{BalancingAlgorithm, CoordinatorConfig};
use crate::types::TierKind;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Live state of one storage tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataLayer {
    /// Which tier this is.
    pub name: TierKind,
    /// 1 = hot ... 3 = cold.
    pub priority: u8,
    /// Retention. None means unbounded.
    pub ttl: Option<Duration>,
    /// Capacity ceiling in percent.
    pub max_capacity_percent: f64,
    /// Heuristic usage gauge in percent, never above `max_capacity_percent`.
    pub current_usage_percent: f64,
    /// Whether routing may use this tier.
    pub is_healthy: bool,
}

impl DataLayer {
    /// Usage as a fraction of capacity.
    pub fn usage_ratio(&self) -> f64 {
        if self.max_capacity_percent <= 0.0 {
            return 1.0;
        }
        self.current_usage_percent / self.max_capacity_percent
    }
}

/// Registry of the three tiers.
///
/// Usage accounting is an approximation: every stored metric adds
/// `usage_per_metric` percentage points, clamped to the tier capacity.
/// It is a gauge for routing and recommendations, not a quota.
#[derive(Debug)]
pub struct TierRegistry {
    layers: [RwLock<DataLayer>; 3],
    usage_per_metric: f64,
}

impl TierRegistry {
    /// Create the registry from configured tier policies.
    pub fn new(config: &CoordinatorConfig) -> Self {
        let layer = |tier: TierKind| {
            let policy = config.policy(tier);
            RwLock::new(DataLayer {
                name: tier,
                priority: tier.priority(),
                ttl: policy.ttl,
                max_capacity_percent: policy.max_capacity_percent,
                current_usage_percent: policy
                    .initial_usage_percent
                    .clamp(0.0, policy.max_capacity_percent),
                is_healthy: true,
            })
        };

        Self {
            layers: [
                layer(TierKind::Hot),
                layer(TierKind::Warm),
                layer(TierKind::Cold),
            ],
            usage_per_metric: config.usage_per_metric,
        }
    }

    fn entry(&self, tier: TierKind) -> &RwLock<DataLayer> {
        &self.layers[tier.index()]
    }

    /// Snapshot of one tier.
    pub fn get(&self, tier: TierKind) -> DataLayer {
        self.entry(tier).read().clone()
    }

    /// Snapshot of all tiers in priority order.
    pub fn all(&self) -> Vec<DataLayer> {
        TierKind::ALL.iter().map(|t| self.get(*t)).collect()
    }

    /// Account for `metric_count` newly stored metrics. Returns the new usage.
    pub fn update_usage(&self, tier: TierKind, metric_count: usize) -> f64 {
        let mut layer = self.entry(tier).write();
        let next = layer.current_usage_percent + metric_count as f64 * self.usage_per_metric;
        layer.current_usage_percent = next.min(layer.max_capacity_percent);
        layer.current_usage_percent
    }

    /// Overwrite the usage gauge, clamped to `[0, capacity]`. Returns the applied value.
    pub fn set_usage(&self, tier: TierKind, percent: f64) -> f64 {
        let mut layer = self.entry(tier).write();
        layer.current_usage_percent = percent.clamp(0.0, layer.max_capacity_percent);
        layer.current_usage_percent
    }

    /// Flag a tier unhealthy. Returns true if the flag changed.
    pub fn mark_unhealthy(&self, tier: TierKind) -> bool {
        let mut layer = self.entry(tier).write();
        let changed = layer.is_healthy;
        layer.is_healthy = false;
        if changed {
            warn!(tier = %tier, "Tier marked unhealthy");
        }
        changed
    }

    /// Flag a tier healthy. Returns true if the flag changed.
    pub fn mark_healthy(&self, tier: TierKind) -> bool {
        let mut layer = self.entry(tier).write();
        let changed = !layer.is_healthy;
        layer.is_healthy = true;
        if changed {
            info!(tier = %tier, "Tier marked healthy");
        }
        changed
    }

    /// Whether the tier is currently flagged healthy.
    pub fn is_healthy(&self, tier: TierKind) -> bool {
        self.entry(tier).read().is_healthy
    }

    /// Tiers currently flagged unhealthy.
    pub fn unhealthy_tiers(&self) -> Vec<TierKind> {
        TierKind::ALL
            .into_iter()
            .filter(|t| !self.is_healthy(*t))
            .collect()
    }

    /// Current retention of a tier.
    pub fn ttl(&self, tier: TierKind) -> Option<Duration> {
        self.entry(tier).read().ttl
    }

    /// Change the retention of a tier. Only affects future writes.
    pub fn set_ttl(&self, tier: TierKind, ttl: Option<Duration>) {
        self.entry(tier).write().ttl = ttl;
    }

    /// Usage as a fraction of capacity.
    pub fn usage_ratio(&self, tier: TierKind) -> f64 {
        self.entry(tier).read().usage_ratio()
    }

    /// The read tier `algorithm` would favour given current state. Advisory
    /// only: reads always try Hot first. None when the algorithm has no
    /// single preference.
    pub fn suggested_read_tier(&self, algorithm: BalancingAlgorithm) -> Option<TierKind> {
        let hot = self.get(TierKind::Hot);
        let warm = self.get(TierKind::Warm);
        match algorithm {
            BalancingAlgorithm::PriorityBased => Some(TierKind::Hot),
            BalancingAlgorithm::Adaptive if hot.is_healthy => Some(TierKind::Hot),
            BalancingAlgorithm::Adaptive => Some(TierKind::Warm),
            BalancingAlgorithm::LeastLoaded => match (hot.is_healthy, warm.is_healthy) {
                (true, false) => Some(TierKind::Hot),
                (false, true) => Some(TierKind::Warm),
                _ if hot.usage_ratio() <= warm.usage_ratio() => Some(TierKind::Hot),
                _ => Some(TierKind::Warm),
            },
            BalancingAlgorithm::RoundRobin => None,
        }
    }
}
