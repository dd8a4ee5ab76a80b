//! Health grading for storage tiers.
//!
//! Grades combine the registry health flag with how close the usage gauge
//! is to the tier capacity.

use super::registry::DataLayer;
use crate::types::TierKind;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Health status of a tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Tier is operating normally
    Healthy,
    /// Tier is approaching its capacity
    Warning { reason: String },
    /// Tier is at or near its capacity
    Degraded { reason: String },
    /// Tier is flagged unhealthy and skipped as a fallback target
    Critical { reason: String },
}

impl HealthStatus {
    /// Check if the status indicates a healthy tier.
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Get the severity level (0 = healthy, 1 = warning, 2 = degraded, 3 = critical).
    pub fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Warning { .. } => 1,
            HealthStatus::Degraded { .. } => 2,
            HealthStatus::Critical { .. } => 3,
        }
    }

    /// Get the reason string, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            HealthStatus::Healthy => None,
            HealthStatus::Warning { reason }
            | HealthStatus::Degraded { reason }
            | HealthStatus::Critical { reason } => Some(reason),
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Warning { reason } => write!(f, "warning: {}", reason),
            HealthStatus::Degraded { reason } => write!(f, "degraded: {}", reason),
            HealthStatus::Critical { reason } => write!(f, "critical: {}", reason),
        }
    }
}

/// Health report for one tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierHealthReport {
    pub tier: TierKind,
    pub status: HealthStatus,
    /// Usage as a fraction of capacity.
    pub usage_ratio: f64,
    pub timestamp: SystemTime,
}

/// Thresholds for tier grading.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Usage ratio above which a tier is graded Warning (0.0 - 1.0)
    pub usage_warning: f64,
    /// Usage ratio at or above which a tier is graded Degraded (0.0 - 1.0)
    pub usage_degraded: f64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            usage_warning: 0.8,
            usage_degraded: 0.95,
        }
    }
}

/// Grades tiers from their registry state.
#[derive(Debug, Clone, Default)]
pub struct TierHealthChecker {
    config: HealthCheckConfig,
}

impl TierHealthChecker {
    /// Create a checker with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a checker with custom thresholds.
    pub fn with_config(config: HealthCheckConfig) -> Self {
        Self { config }
    }

    /// Grade one tier.
    pub fn check(&self, layer: &DataLayer) -> HealthStatus {
        if !layer.is_healthy {
            return HealthStatus::Critical {
                reason: format!("{} tier failed and awaits recovery", layer.name),
            };
        }

        let ratio = layer.usage_ratio();
        if ratio >= self.config.usage_degraded {
            HealthStatus::Degraded {
                reason: format!(
                    "{} tier at {:.1}% of capacity ({:.1}/{:.1})",
                    layer.name,
                    ratio * 100.0,
                    layer.current_usage_percent,
                    layer.max_capacity_percent
                ),
            }
        } else if ratio > self.config.usage_warning {
            HealthStatus::Warning {
                reason: format!(
                    "{} tier usage above {:.0}% of capacity",
                    layer.name,
                    self.config.usage_warning * 100.0
                ),
            }
        } else {
            HealthStatus::Healthy
        }
    }

    /// Generate a report for one tier.
    pub fn report(&self, layer: &DataLayer) -> TierHealthReport {
        TierHealthReport {
            tier: layer.name,
            status: self.check(layer),
            usage_ratio: layer.usage_ratio(),
            timestamp: SystemTime::now(),
        }
    }
}
