//! Hot/Warm drift auditing.
//!
//! Warm copies are written in the background, so a session's Warm count
//! trails its Hot count for a while after every write. The auditor reads
//! both counts from the stores themselves (never from the session tracker)
//! and flags a session once the gap exceeds a fraction of the Hot count.
//!
//! Cold is reported but never compared. Flushes are periodic, so the Cold
//! count is stale by design.

use crate::error::TierResult;
use crate::session::SessionTracker;
use crate::store::TierStores;
use crate::types::SessionId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Outcome of one session audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConsistencyReport {
    pub session_id: SessionId,
    pub hot_layer_count: u64,
    pub warm_layer_count: u64,
    pub cold_layer_count: u64,
    pub is_consistent: bool,
    pub inconsistencies: Vec<String>,
    pub last_sync_time: SystemTime,
}

/// Whether the Hot/Warm gap exceeds `tolerance` times the Hot count.
pub fn drift_exceeds(hot: u64, warm: u64, tolerance: f64) -> bool {
    hot.abs_diff(warm) as f64 > hot as f64 * tolerance
}

/// Compares per-session counts across tiers.
#[derive(Debug)]
pub struct ConsistencyAuditor {
    stores: TierStores,
    sessions: Arc<SessionTracker>,
    tolerance: f64,
}

impl ConsistencyAuditor {
    pub fn new(stores: TierStores, sessions: Arc<SessionTracker>, tolerance: f64) -> Self {
        Self {
            stores,
            sessions,
            tolerance,
        }
    }

    /// Audit one session. Store errors are reported, not returned.
    pub async fn audit(&self, session_id: &str) -> DataConsistencyReport {
        let cold = self
            .sessions
            .get(session_id)
            .map(|s| s.cold_layer_metrics)
            .unwrap_or(0);

        let mut report = DataConsistencyReport {
            session_id: session_id.to_string(),
            hot_layer_count: 0,
            warm_layer_count: 0,
            cold_layer_count: cold,
            is_consistent: true,
            inconsistencies: Vec::new(),
            last_sync_time: SystemTime::now(),
        };

        let (hot, warm) = match self.counts(session_id).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(session_id, error = %e, "Consistency audit failed");
                report.is_consistent = false;
                report
                    .inconsistencies
                    .push(format!("audit failed: {}", e));
                return report;
            }
        };

        report.hot_layer_count = hot;
        report.warm_layer_count = warm;

        if drift_exceeds(hot, warm, self.tolerance) {
            report.is_consistent = false;
            report.inconsistencies.push(format!(
                "hot/warm count mismatch: hot={}, warm={} (tolerance {:.0}%)",
                hot,
                warm,
                self.tolerance * 100.0
            ));
        }

        debug!(
            session_id,
            hot,
            warm,
            cold,
            consistent = report.is_consistent,
            "Audited session"
        );
        report
    }

    /// Audit every active session, in session id order.
    pub async fn audit_all(&self) -> Vec<DataConsistencyReport> {
        let mut reports = Vec::new();
        for session_id in self.sessions.active_ids() {
            reports.push(self.audit(&session_id).await);
        }
        reports
    }

    async fn counts(&self, session_id: &str) -> TierResult<(u64, u64)> {
        let hot = self.stores.hot.get_session_metrics(session_id).await?.len();
        let warm = self
            .stores
            .warm
            .get_session_metrics_history(session_id, None, None)
            .await?
            .len();
        Ok((hot as u64, warm as u64))
    }
}
