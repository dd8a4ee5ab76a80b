//! Write path.
//!
//! The caller waits for the Hot write only. The Warm copy and the periodic
//! Cold flush run as tracked background tasks; their failures travel to the
//! failure supervisor as [`TierFailure`] messages.
//!
//! Hot writes of one session are serialised by a per-session gate, so they
//! reach the Hot store in call order. Warm writes are dispatched per batch
//! and may complete out of order.

use super::{millis, RouterContext};
use crate::error::{Result, TierError};
use crate::events::CoordinatorEvent;
use crate::failover::{FailoverCoordinator, TierFailure};
use crate::performance::OperationKind;
use crate::types::{Metric, SessionId, TierKind};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// What happened to an accepted write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// Tier that acknowledged the write. None for an empty batch.
    pub tier: Option<TierKind>,
    pub metric_count: usize,
    /// A background Warm copy was dispatched.
    pub warm_dispatched: bool,
    /// A background Cold flush was dispatched.
    pub cold_flush_dispatched: bool,
}

impl WriteReceipt {
    /// Whether the write was redirected away from Hot.
    pub fn failed_over(&self) -> bool {
        matches!(self.tier, Some(tier) if tier != TierKind::Hot)
    }
}

/// Accepts metric batches and spreads them over the tiers.
#[derive(Debug)]
pub struct WriteRouter {
    ctx: RouterContext,
    failover: Arc<FailoverCoordinator>,
    failures: mpsc::UnboundedSender<TierFailure>,
    tasks: TaskTracker,
    cold_flush_interval: Duration,
    gates: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl WriteRouter {
    pub fn new(
        ctx: RouterContext,
        failover: Arc<FailoverCoordinator>,
        failures: mpsc::UnboundedSender<TierFailure>,
        tasks: TaskTracker,
        cold_flush_interval: Duration,
    ) -> Self {
        Self {
            ctx,
            failover,
            failures,
            tasks,
            cold_flush_interval,
            gates: DashMap::new(),
        }
    }

    /// Write a batch for a session.
    ///
    /// Succeeds once Hot, or a fallback tier, has the batch. Fails only when
    /// every tier in the cascade rejected it.
    pub async fn write(&self, session_id: &str, metrics: &[Metric]) -> Result<WriteReceipt> {
        if metrics.is_empty() {
            debug!(session_id, "Empty batch, nothing to write");
            return Ok(WriteReceipt::default());
        }

        let gate = self.gate(session_id);
        let _ordered = gate.lock().await;

        let start = Instant::now();
        let count = metrics.len();
        let registry = &self.ctx.registry;

        // Hot is attempted even while flagged; only the cascade skips tiers.
        let ttl = registry.ttl(TierKind::Hot);
        let hot = self
            .ctx
            .stores
            .hot
            .save_realtime_metrics(session_id, metrics, ttl)
            .await;

        let landed = match hot {
            Ok(()) => {
                let usage = registry.update_usage(TierKind::Hot, count);
                self.ctx.sessions.record(session_id, count);
                debug!(session_id, count, usage, "Stored in hot tier");
                TierKind::Hot
            }
            Err(error) => {
                match self
                    .failover
                    .handle_failure(session_id, metrics, TierKind::Hot, error)
                    .await
                {
                    Ok(tier) => {
                        self.ctx.sessions.record_failover(session_id, count, tier);
                        tier
                    }
                    Err(e) => {
                        let elapsed = start.elapsed();
                        self.ctx
                            .monitor
                            .record_operation(OperationKind::Write, millis(elapsed), false);
                        self.ctx.metrics.record_write(None, count, elapsed);
                        return Err(e);
                    }
                }
            }
        };

        let elapsed = start.elapsed();
        self.ctx
            .monitor
            .record_operation(OperationKind::Write, millis(elapsed), true);
        self.ctx.metrics.record_write(Some(landed), count, elapsed);

        let warm_dispatched = landed == TierKind::Hot && self.dispatch_warm(session_id, metrics);
        let cold_flush_dispatched = landed != TierKind::Cold && self.dispatch_cold_flush(session_id);

        Ok(WriteReceipt {
            tier: Some(landed),
            metric_count: count,
            warm_dispatched,
            cold_flush_dispatched,
        })
    }

    /// Copy the batch to Warm in the background. Returns false when Warm is
    /// flagged unhealthy and the batch went straight to the supervisor.
    fn dispatch_warm(&self, session_id: &str, metrics: &[Metric]) -> bool {
        let session_id = session_id.to_string();
        let batch = metrics.to_vec();

        if !self.ctx.registry.is_healthy(TierKind::Warm) {
            let failure = TierFailure::new(
                session_id,
                batch,
                TierKind::Warm,
                TierError::unavailable(TierKind::Warm),
            );
            report(&self.failures, &self.tasks, failure);
            return false;
        }

        let ctx = self.ctx.clone();
        let failures = self.failures.clone();
        let tasks = self.tasks.clone();
        self.tasks.spawn(async move {
            let count = batch.len();
            match ctx.stores.warm.batch_insert_metrics(&session_id, &batch).await {
                Ok(()) => {
                    ctx.registry.update_usage(TierKind::Warm, count);
                    ctx.sessions.record_tier(&session_id, TierKind::Warm, count);
                    debug!(session_id = %session_id, count, "Stored in warm tier");
                }
                Err(error) => {
                    warn!(session_id = %session_id, error = %error, "Warm write failed");
                    let failure = TierFailure::new(session_id, batch, TierKind::Warm, error);
                    report(&failures, &tasks, failure);
                }
            }
        });
        true
    }

    /// Flush the session to Cold if its flush interval has passed.
    fn dispatch_cold_flush(&self, session_id: &str) -> bool {
        if !self.ctx.registry.is_healthy(TierKind::Cold)
            || !self
                .ctx
                .sessions
                .claim_cold_flush(session_id, self.cold_flush_interval)
        {
            return false;
        }

        let session_id = session_id.to_string();
        let ctx = self.ctx.clone();
        let failures = self.failures.clone();
        let tasks = self.tasks.clone();
        self.tasks.spawn(async move {
            match ctx.stores.cold.flush_batch_to_cloud_storage(&session_id).await {
                Ok(()) => {
                    let archived = ctx.sessions.mark_cold_flushed(&session_id);
                    ctx.registry.update_usage(TierKind::Cold, archived as usize);
                    ctx.metrics.cold_flushes.inc();
                    info!(session_id = %session_id, archived, "Flushed session to cold tier");
                    ctx.events.publish(CoordinatorEvent::ColdFlushed {
                        session_id,
                        archived,
                    });
                }
                Err(error) => {
                    warn!(session_id = %session_id, error = %error, "Cold flush failed");
                    let failure = TierFailure::new(session_id, Vec::new(), TierKind::Cold, error);
                    report(&failures, &tasks, failure);
                }
            }
        });
        true
    }

    fn gate(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.gates.entry(session_id.to_string()).or_default().clone()
    }

    /// Drop the ordering gate of a closed session.
    pub fn forget_session(&self, session_id: &str) {
        self.gates.remove(session_id);
    }
}

/// Hand a failure to the supervisor, keeping background work pending until
/// it has been handled.
fn report(failures: &mpsc::UnboundedSender<TierFailure>, tasks: &TaskTracker, failure: TierFailure) {
    if let Err(mpsc::error::SendError(failure)) = failures.send(failure.tracked(tasks.token())) {
        error!(
            session_id = %failure.session_id,
            tier = %failure.origin,
            error = %failure.error,
            "Failure supervisor stopped, tier failure dropped"
        );
    }
}
