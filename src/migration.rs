//! One-shot migration from a legacy single store.
//!
//! Migration relabels usage. Each healthy tier's usage gauge is set to its
//! full capacity (Hot 40 / Warm 60 / Cold 10 by default); no data is copied
//! or verified. Unhealthy tiers are skipped, and the legacy usage they would
//! have absorbed is reported as remaining.

use crate::error::{Error, Result};
use crate::metrics::CoordinatorMetrics;
use crate::session::SessionTracker;
use crate::tier::TierRegistry;
use crate::types::TierKind;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

const HISTORY_LIMIT: usize = 100;

/// Overall outcome of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationStatus {
    /// Every tier was relabelled.
    Completed,
    /// Some tiers were skipped.
    Partial,
    /// No tier was relabelled.
    Failed,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStatus::Completed => write!(f, "completed"),
            MigrationStatus::Partial => write!(f, "partial"),
            MigrationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Usage per tier, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierDistribution {
    pub hot: f64,
    pub warm: f64,
    pub cold: f64,
}

impl TierDistribution {
    pub fn get(&self, tier: TierKind) -> f64 {
        match tier {
            TierKind::Hot => self.hot,
            TierKind::Warm => self.warm,
            TierKind::Cold => self.cold,
        }
    }

    fn total(&self) -> f64 {
        self.hot + self.warm + self.cold
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub id: Uuid,
    pub status: MigrationStatus,
    /// Sessions tracked when the migration ran.
    pub migrated_sessions: usize,
    /// Legacy usage not absorbed by any tier, in percent.
    pub remaining_legacy_usage: f64,
    /// Target distribution. Always the tiers' capacities.
    pub new_distribution: TierDistribution,
    /// Tiers skipped, with the reason.
    pub failed_tiers: Vec<(TierKind, String)>,
    pub duration: Duration,
}

/// Runs legacy migrations and keeps their history.
#[derive(Debug)]
pub struct MigrationController {
    registry: Arc<TierRegistry>,
    sessions: Arc<SessionTracker>,
    metrics: Arc<CoordinatorMetrics>,
    legacy_usage_percent: f64,
    running: AtomicBool,
    history: RwLock<VecDeque<MigrationReport>>,
}

impl MigrationController {
    pub fn new(
        registry: Arc<TierRegistry>,
        sessions: Arc<SessionTracker>,
        metrics: Arc<CoordinatorMetrics>,
        legacy_usage_percent: f64,
    ) -> Self {
        Self {
            registry,
            sessions,
            metrics,
            legacy_usage_percent,
            running: AtomicBool::new(false),
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// The distribution a migration targets.
    pub fn target(&self) -> TierDistribution {
        TierDistribution {
            hot: self.registry.get(TierKind::Hot).max_capacity_percent,
            warm: self.registry.get(TierKind::Warm).max_capacity_percent,
            cold: self.registry.get(TierKind::Cold).max_capacity_percent,
        }
    }

    /// Relabel legacy usage into the tiers.
    ///
    /// Fails with [`Error::MigrationInProgress`] if another run is active.
    pub fn migrate_from_legacy_store(&self) -> Result<MigrationReport> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::MigrationInProgress);
        }
        let _guard = RunningGuard(&self.running);

        let start = Instant::now();
        let id = Uuid::new_v4();
        let target = self.target();
        let migrated_sessions = self.sessions.len();

        info!(
            %id,
            legacy_usage = self.legacy_usage_percent,
            sessions = migrated_sessions,
            "Starting legacy migration"
        );

        let mut failed_tiers = Vec::new();
        for tier in TierKind::ALL {
            if !self.registry.is_healthy(tier) {
                warn!(%id, tier = %tier, "Tier unhealthy, skipping migration");
                failed_tiers.push((tier, "tier unhealthy".to_string()));
                continue;
            }
            let applied = self.registry.set_usage(tier, target.get(tier));
            info!(%id, tier = %tier, usage = applied, "Tier relabelled");
        }

        let status = match failed_tiers.len() {
            0 => MigrationStatus::Completed,
            n if n == TierKind::ALL.len() => MigrationStatus::Failed,
            _ => MigrationStatus::Partial,
        };

        let failed_share: f64 = failed_tiers.iter().map(|(t, _)| target.get(*t)).sum();
        let remaining_legacy_usage = if target.total() > 0.0 {
            self.legacy_usage_percent * failed_share / target.total()
        } else {
            0.0
        };

        self.metrics.migrations_total.inc();
        if status != MigrationStatus::Completed {
            self.metrics.migrations_partial.inc();
        }
        self.metrics.update_tiers(&self.registry.all());

        let report = MigrationReport {
            id,
            status,
            migrated_sessions,
            remaining_legacy_usage,
            new_distribution: target,
            failed_tiers,
            duration: start.elapsed(),
        };

        info!(%id, status = %status, remaining = remaining_legacy_usage, "Legacy migration finished");

        let mut history = self.history.write();
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(report.clone());

        Ok(report)
    }

    /// Past migrations, oldest first.
    pub fn history(&self) -> Vec<MigrationReport> {
        self.history.read().iter().cloned().collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
