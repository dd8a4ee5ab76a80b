//! Cascading failover and tier recovery.
//!
//! A failed write moves down the tier chain until some tier accepts it:
//!
//! ```text
//!   Hot ──fail──▶ Warm ──fail──▶ Cold ──fail──▶ Error::AllTiersFailed
//! ```
//!
//! Every tier that fails along the way is flagged unhealthy, and tiers
//! already flagged are skipped. Flagged tiers come back through the recovery
//! probe, which runs once per fixed delay while any tier is unhealthy, or
//! through the periodic health check run by the coordinator.
//!
//! Failures of detached Warm/Cold work reach this module as [`TierFailure`]
//! messages on the supervised failure channel.

use crate::config::LoadBalancingStrategy;
use crate::error::{Error, Result, TierError, TierErrorKind, TierResult};
use crate::events::{CoordinatorEvent, EventBus};
use crate::metrics::CoordinatorMetrics;
use crate::store::TierStores;
use crate::tier::TierRegistry;
use crate::types::{Metric, SessionId, TierKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{debug, error, info, warn};

/// A failed tier call from detached work, routed to the failure supervisor.
pub struct TierFailure {
    pub session_id: SessionId,
    pub metrics: Vec<Metric>,
    pub origin: TierKind,
    pub error: TierError,
    // keeps wait_for_background() pending until the failure is handled
    _token: Option<TaskTrackerToken>,
}

impl TierFailure {
    pub fn new(
        session_id: impl Into<SessionId>,
        metrics: Vec<Metric>,
        origin: TierKind,
        error: TierError,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            metrics,
            origin,
            error,
            _token: None,
        }
    }

    pub(crate) fn tracked(mut self, token: TaskTrackerToken) -> Self {
        self._token = Some(token);
        self
    }
}

impl std::fmt::Debug for TierFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierFailure")
            .field("session_id", &self.session_id)
            .field("metrics", &self.metrics.len())
            .field("origin", &self.origin)
            .field("error", &self.error)
            .finish()
    }
}

/// Cascades failed writes and brings tiers back.
#[derive(Debug)]
pub struct FailoverCoordinator {
    registry: Arc<TierRegistry>,
    stores: TierStores,
    strategy: LoadBalancingStrategy,
    recovery_delay: Duration,
    events: EventBus,
    metrics: Arc<CoordinatorMetrics>,
    recovery_pending: AtomicBool,
    recovery_task: Mutex<Option<JoinHandle<()>>>,
}

impl FailoverCoordinator {
    pub fn new(
        registry: Arc<TierRegistry>,
        stores: TierStores,
        strategy: LoadBalancingStrategy,
        recovery_delay: Duration,
        events: EventBus,
        metrics: Arc<CoordinatorMetrics>,
    ) -> Self {
        Self {
            registry,
            stores,
            strategy,
            recovery_delay,
            events,
            metrics,
            recovery_pending: AtomicBool::new(false),
            recovery_task: Mutex::new(None),
        }
    }

    /// Handle a failed write to `origin`.
    ///
    /// Returns the tier the metrics landed in. Fails with
    /// [`Error::AllTiersFailed`] when the cascade is exhausted or disabled.
    /// Session accounting is left to the caller.
    pub async fn handle_failure(
        self: &Arc<Self>,
        session_id: &str,
        metrics: &[Metric],
        origin: TierKind,
        error: TierError,
    ) -> Result<TierKind> {
        if matches!(error.kind, TierErrorKind::Unavailable) {
            debug!(session_id, tier = %origin, "Tier unavailable, bypassing");
            self.flag_unhealthy(origin);
        } else {
            warn!(
                session_id,
                tier = %origin,
                error = %error,
                "Primary storage failed, initiating failover"
            );
            self.record_tier_failure(origin, session_id, &error);
        }

        let result = if self.strategy.failover_enabled {
            self.cascade(session_id, metrics, origin, error).await
        } else {
            debug!(session_id, "Failover disabled");
            Err(error)
        };

        self.schedule_recovery();

        match result {
            Ok(tier) => {
                info!(
                    session_id,
                    from = %origin,
                    to = %tier,
                    count = metrics.len(),
                    "Failover completed"
                );
                self.metrics.record_failover(origin, tier);
                self.events.publish(CoordinatorEvent::FailoverCompleted {
                    session_id: session_id.to_string(),
                    from: origin,
                    to: tier,
                    metric_count: metrics.len(),
                });
                Ok(tier)
            }
            Err(last) => {
                error!(session_id, tier = %origin, error = %last, "Failover exhausted");
                self.metrics.failovers_exhausted.inc();
                self.events.publish(CoordinatorEvent::FailoverExhausted {
                    session_id: session_id.to_string(),
                    origin,
                    reason: last.to_string(),
                });
                Err(Error::AllTiersFailed {
                    session_id: session_id.to_string(),
                    last,
                })
            }
        }
    }

    async fn cascade(
        &self,
        session_id: &str,
        metrics: &[Metric],
        origin: TierKind,
        error: TierError,
    ) -> std::result::Result<TierKind, TierError> {
        let mut last = error;
        let mut current = origin;

        while let Some(next) = current.fallback() {
            current = next;
            if !self.registry.is_healthy(next) {
                debug!(session_id, tier = %next, "Skipping unhealthy fallback tier");
                last = TierError::unavailable(next);
                continue;
            }

            match self.write_to(next, session_id, metrics).await {
                Ok(()) => return Ok(next),
                Err(e) => {
                    warn!(session_id, tier = %next, error = %e, "Fallback tier failed");
                    self.record_tier_failure(next, session_id, &e);
                    last = e;
                }
            }
        }

        Err(last)
    }

    async fn write_to(&self, tier: TierKind, session_id: &str, metrics: &[Metric]) -> TierResult<()> {
        match tier {
            TierKind::Hot => {
                let ttl = self.registry.ttl(TierKind::Hot);
                self.stores
                    .hot
                    .save_realtime_metrics(session_id, metrics, ttl)
                    .await?
            }
            TierKind::Warm => self.stores.warm.batch_insert_metrics(session_id, metrics).await?,
            TierKind::Cold => self.stores.cold.flush_batch_to_cloud_storage(session_id).await?,
        }
        self.registry.update_usage(tier, metrics.len());
        Ok(())
    }

    fn record_tier_failure(&self, tier: TierKind, session_id: &str, error: &TierError) {
        self.metrics.record_tier_error(tier);
        self.events.publish(CoordinatorEvent::TierWriteFailed {
            tier,
            session_id: session_id.to_string(),
            reason: error.to_string(),
        });
        self.flag_unhealthy(tier);
    }

    fn flag_unhealthy(&self, tier: TierKind) {
        if self.registry.mark_unhealthy(tier) {
            self.events.publish(CoordinatorEvent::TierUnhealthy { tier });
        }
    }

    fn flag_healthy(&self, tier: TierKind) {
        if self.registry.mark_healthy(tier) {
            self.metrics.record_recovery(tier);
            self.events.publish(CoordinatorEvent::TierRecovered { tier });
        }
    }

    /// Arm the recovery probe unless one is already pending.
    ///
    /// The probe fires after the fixed recovery delay and re-arms itself
    /// with the same delay while any tier stays unhealthy.
    pub fn schedule_recovery(self: &Arc<Self>) {
        if self.registry.unhealthy_tiers().is_empty() {
            return;
        }
        if self.recovery_pending.swap(true, Ordering::SeqCst) {
            debug!("Recovery probe already scheduled");
            return;
        }

        let delay = self.recovery_delay;
        info!(delay_secs = delay.as_secs(), "Scheduling tier recovery probe");

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                let still_unhealthy = this.recover().await;
                if still_unhealthy.is_empty() {
                    break;
                }
                debug!(?still_unhealthy, "Tiers still unhealthy, re-arming recovery probe");
            }
            this.recovery_pending.store(false, Ordering::SeqCst);

            // a tier may have failed between the last probe and the reset
            this.schedule_recovery();
        });
        *self.recovery_task.lock() = Some(handle);
    }

    /// Whether a recovery probe is armed.
    pub fn is_recovery_pending(&self) -> bool {
        self.recovery_pending.load(Ordering::SeqCst)
    }

    /// Probe every unhealthy tier now. Returns the tiers that stay unhealthy.
    pub async fn recover(&self) -> Vec<TierKind> {
        let mut still_unhealthy = Vec::new();
        for tier in self.registry.unhealthy_tiers() {
            if self.probe(tier).await {
                info!(tier = %tier, "Tier recovered");
                self.flag_healthy(tier);
            } else {
                still_unhealthy.push(tier);
            }
        }
        still_unhealthy
    }

    /// Liveness check with up to `retry_attempts` pings.
    pub async fn probe(&self, tier: TierKind) -> bool {
        for attempt in 1..=self.strategy.retry_attempts.max(1) {
            match self.stores.ping(tier).await {
                Ok(()) => return true,
                Err(e) => debug!(tier = %tier, attempt, error = %e, "Liveness check failed"),
            }
        }
        false
    }

    /// Probe every tier and flip health flags both ways.
    pub async fn health_check(self: &Arc<Self>) -> Vec<(TierKind, bool)> {
        let mut results = Vec::with_capacity(TierKind::ALL.len());
        for tier in TierKind::ALL {
            let alive = self.probe(tier).await;
            if alive {
                self.flag_healthy(tier);
            } else {
                warn!(tier = %tier, "Health check failed");
                self.flag_unhealthy(tier);
            }
            results.push((tier, alive));
        }
        self.schedule_recovery();
        results
    }

    /// Abort a pending recovery probe.
    pub fn stop(&self) {
        if let Some(handle) = self.recovery_task.lock().take() {
            handle.abort();
        }
        self.recovery_pending.store(false, Ordering::SeqCst);
    }
}
