//! The coordinator facade.
//!
//! [`DistributedDataManager`] owns every component and is the only type
//! most hosts need:
//!
//! ```text
//!            write / read / query / audit / tune / migrate / status
//!                                   │
//!                      ┌────────────▼────────────┐
//!                      │  DistributedDataManager │
//!                      └─┬──────┬──────┬──────┬──┘
//!                        │      │      │      │
//!              WriteRouter  ReadRouter  Auditor  MigrationController
//!                   │  ▲
//!   detached Warm / │  │ TierFailure (mpsc)
//!   Cold work       ▼  │
//!               failure supervisor ──▶ FailoverCoordinator
//!
//!   health loop (every health_check_interval): probe tiers, reap idle
//!   sessions, refresh gauges
//! ```
//!
//! `new` only wires things up. `start` spawns the failure supervisor and the
//! health loop and must run inside a tokio runtime. Until `start` runs,
//! failures of detached work are queued, not handled.

use crate::config::{BalancingAlgorithm, CoordinatorConfig};
use crate::consistency::{ConsistencyAuditor, DataConsistencyReport};
use crate::error::{Error, Result};
use crate::events::{CoordinatorEvent, EventBus};
use crate::failover::{FailoverCoordinator, TierFailure};
use crate::metrics::CoordinatorMetrics;
use crate::migration::{MigrationController, MigrationReport};
use crate::performance::{PerformanceMetrics, PerformanceMonitor, TuningReport};
use crate::routing::{
    execute, QueryResult, ReadQuery, ReadRouter, RoutedRead, RouterContext, UnifiedQuery,
    WriteReceipt, WriteRouter,
};
use crate::session::SessionTracker;
use crate::store::{ColdStore, HotStore, TierStores, WarmStore};
use crate::tier::{DataLayer, TierHealthChecker, TierHealthReport, TierRegistry};
use crate::types::{DistributedSession, Metric, TierKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Usage above this fraction of capacity triggers a recommendation.
const USAGE_RECOMMENDATION_RATIO: f64 = 0.8;

/// Error rate above this percentage triggers a recommendation.
const ERROR_RATE_RECOMMENDATION_PERCENT: f64 = 5.0;

/// Snapshot returned by [`DistributedDataManager::load_balancing_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancingStatus {
    pub layers: Vec<DataLayer>,
    pub algorithm: BalancingAlgorithm,
    /// Read tier the algorithm favours right now. Advisory.
    pub suggested_read_tier: Option<TierKind>,
    pub health: Vec<TierHealthReport>,
    pub active_sessions: usize,
    pub performance: PerformanceMetrics,
    pub recommendations: Vec<String>,
}

/// Tiered storage coordinator.
pub struct DistributedDataManager {
    config: CoordinatorConfig,
    registry: Arc<TierRegistry>,
    sessions: Arc<SessionTracker>,
    monitor: Arc<PerformanceMonitor>,
    metrics: Arc<CoordinatorMetrics>,
    events: EventBus,
    failover: Arc<FailoverCoordinator>,
    writer: Arc<WriteRouter>,
    reader: ReadRouter,
    auditor: ConsistencyAuditor,
    migrations: MigrationController,
    health: TierHealthChecker,

    /// Detached Warm/Cold work and failure handling.
    tasks: TaskTracker,

    /// Taken by `start`.
    failure_rx: Mutex<Option<mpsc::UnboundedReceiver<TierFailure>>>,

    /// Shutdown senders of the supervisor and health loops.
    shutdown_txs: Mutex<Vec<mpsc::Sender<()>>>,

    loops: Mutex<Vec<JoinHandle<()>>>,

    shutting_down: AtomicBool,
}

impl DistributedDataManager {
    /// Wire up a coordinator over the given stores.
    pub fn new(
        config: CoordinatorConfig,
        hot: Arc<dyn HotStore>,
        warm: Arc<dyn WarmStore>,
        cold: Arc<dyn ColdStore>,
    ) -> Result<Self> {
        config.validate()?;

        let stores = TierStores::new(hot, warm, cold);
        let registry = Arc::new(TierRegistry::new(&config));
        let sessions = Arc::new(SessionTracker::new());
        let monitor = Arc::new(PerformanceMonitor::new(registry.clone(), config.tuning.clone()));
        let metrics = Arc::new(CoordinatorMetrics::new());
        let events = EventBus::new(config.event_capacity);
        let tasks = TaskTracker::new();
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();

        let failover = Arc::new(FailoverCoordinator::new(
            registry.clone(),
            stores.clone(),
            config.strategy.clone(),
            config.recovery_delay,
            events.clone(),
            metrics.clone(),
        ));

        let ctx = RouterContext {
            registry: registry.clone(),
            sessions: sessions.clone(),
            monitor: monitor.clone(),
            metrics: metrics.clone(),
            events: events.clone(),
            stores: stores.clone(),
        };

        let writer = Arc::new(WriteRouter::new(
            ctx.clone(),
            failover.clone(),
            failure_tx,
            tasks.clone(),
            config.cold_flush_interval,
        ));
        let reader = ReadRouter::new(ctx);
        let auditor =
            ConsistencyAuditor::new(stores, sessions.clone(), config.consistency_tolerance);
        let migrations = MigrationController::new(
            registry.clone(),
            sessions.clone(),
            metrics.clone(),
            config.legacy_usage_percent,
        );

        metrics.update_tiers(&registry.all());

        Ok(Self {
            config,
            registry,
            sessions,
            monitor,
            metrics,
            events,
            failover,
            writer,
            reader,
            auditor,
            migrations,
            health: TierHealthChecker::new(),
            tasks,
            failure_rx: Mutex::new(Some(failure_rx)),
            shutdown_txs: Mutex::new(Vec::new()),
            loops: Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Spawn the failure supervisor and the health loop. Calling it again
    /// is a no-op.
    pub fn start(&self) {
        let Some(failure_rx) = self.failure_rx.lock().take() else {
            debug!("Coordinator already started");
            return;
        };

        info!(
            algorithm = ?self.config.strategy.algorithm,
            failover_enabled = self.config.strategy.failover_enabled,
            "Starting tier coordinator"
        );

        let (supervisor_tx, supervisor_rx) = mpsc::channel(1);
        let supervisor = tokio::spawn(Self::run_failure_supervisor(
            failure_rx,
            supervisor_rx,
            self.failover.clone(),
            self.sessions.clone(),
            self.metrics.clone(),
            self.events.clone(),
            self.tasks.clone(),
        ));

        let (health_tx, health_rx) = mpsc::channel(1);
        let health = tokio::spawn(Self::run_health_loop(
            health_rx,
            self.config.strategy.health_check_interval,
            self.config.session_idle_timeout,
            self.failover.clone(),
            self.registry.clone(),
            self.sessions.clone(),
            self.writer.clone(),
            self.metrics.clone(),
            self.events.clone(),
        ));

        self.shutdown_txs.lock().extend([supervisor_tx, health_tx]);
        self.loops.lock().extend([supervisor, health]);
    }

    /// Receives failures of detached work and hands them to failover.
    async fn run_failure_supervisor(
        mut failures: mpsc::UnboundedReceiver<TierFailure>,
        mut shutdown_rx: mpsc::Receiver<()>,
        failover: Arc<FailoverCoordinator>,
        sessions: Arc<SessionTracker>,
        metrics: Arc<CoordinatorMetrics>,
        events: EventBus,
        tasks: TaskTracker,
    ) {
        debug!("Failure supervisor running");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Failure supervisor shutting down");
                    break;
                }
                failure = failures.recv() => {
                    let Some(failure) = failure else { break };
                    tasks.spawn(Self::handle_tier_failure(
                        failure,
                        failover.clone(),
                        sessions.clone(),
                        metrics.clone(),
                        events.clone(),
                    ));
                }
            }
        }
    }

    async fn handle_tier_failure(
        failure: TierFailure,
        failover: Arc<FailoverCoordinator>,
        sessions: Arc<SessionTracker>,
        metrics: Arc<CoordinatorMetrics>,
        events: EventBus,
    ) {
        let session_id = failure.session_id.as_str();
        let result = failover
            .handle_failure(session_id, &failure.metrics, failure.origin, failure.error.clone())
            .await;

        match result {
            Ok(TierKind::Cold) => {
                let archived = sessions.mark_cold_flushed(session_id);
                metrics.cold_flushes.inc();
                events.publish(CoordinatorEvent::ColdFlushed {
                    session_id: session_id.to_string(),
                    archived,
                });
            }
            Ok(tier) => sessions.record_tier(session_id, tier, failure.metrics.len()),
            Err(e) => warn!(
                session_id,
                origin = %failure.origin,
                error = %e,
                "Background tier failure not recovered"
            ),
        }
    }

    /// Periodic liveness probing, idle session reaping and gauge refresh.
    #[allow(clippy::too_many_arguments)]
    async fn run_health_loop(
        mut shutdown_rx: mpsc::Receiver<()>,
        period: Duration,
        idle_timeout: Option<Duration>,
        failover: Arc<FailoverCoordinator>,
        registry: Arc<TierRegistry>,
        sessions: Arc<SessionTracker>,
        writer: Arc<WriteRouter>,
        metrics: Arc<CoordinatorMetrics>,
        events: EventBus,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Health loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let results = failover.health_check().await;
                    debug!(?results, "Health check complete");

                    if let Some(idle) = idle_timeout {
                        for session_id in sessions.reap_inactive(idle) {
                            writer.forget_session(&session_id);
                            events.publish(CoordinatorEvent::SessionClosed { session_id });
                        }
                    }

                    metrics.update_tiers(&registry.all());
                    metrics.active_sessions.set(sessions.active_count() as i64);
                }
            }
        }
    }

    /// Stop accepting writes, drain background work and stop the loops.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down tier coordinator");

        self.wait_for_background().await;

        let senders: Vec<_> = self.shutdown_txs.lock().drain(..).collect();
        for tx in senders {
            let _ = tx.send(()).await;
        }
        self.failover.stop();

        info!("Tier coordinator stopped");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Wait until every dispatched Warm write, Cold flush and failure
    /// handler has finished. Requires [`start`](Self::start) if any
    /// background work may fail.
    pub async fn wait_for_background(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    // ==================== Data path ====================

    /// Write a batch of metrics for a session.
    ///
    /// Returns once Hot, or a fallback tier, holds the batch. The Warm copy
    /// and the Cold flush run in the background.
    pub async fn write(&self, session_id: &str, metrics: &[Metric]) -> Result<WriteReceipt> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        self.writer.write(session_id, metrics).await
    }

    /// Read a session's metrics.
    pub async fn read(&self, query: &ReadQuery) -> Result<RoutedRead> {
        self.reader.read(query).await
    }

    /// Validate and run a unified query.
    pub async fn execute_unified_query(&self, query: &UnifiedQuery) -> Result<QueryResult> {
        execute(&self.reader, query).await
    }

    // ==================== Sessions ====================

    pub fn session(&self, session_id: &str) -> Option<DistributedSession> {
        self.sessions.get(session_id)
    }

    /// Snapshots of every tracked session.
    pub fn sessions(&self) -> Vec<DistributedSession> {
        self.sessions.sessions()
    }

    /// Close a session. Returns false if unknown or already closed.
    pub fn close_session(&self, session_id: &str) -> bool {
        if !self.sessions.close(session_id) {
            return false;
        }
        self.writer.forget_session(session_id);
        self.events.publish(CoordinatorEvent::SessionClosed {
            session_id: session_id.to_string(),
        });
        true
    }

    // ==================== Consistency ====================

    /// Compare a session's Hot and Warm counts.
    pub async fn validate_data_consistency(&self, session_id: &str) -> DataConsistencyReport {
        self.auditor.audit(session_id).await
    }

    /// Audit every active session.
    pub async fn audit_all(&self) -> Vec<DataConsistencyReport> {
        self.auditor.audit_all().await
    }

    // ==================== Performance ====================

    /// Derive tuning recommendations and apply the Hot TTL extension.
    pub fn optimize_performance(&self) -> TuningReport {
        self.monitor.tune()
    }

    pub fn performance(&self) -> PerformanceMetrics {
        self.monitor.snapshot()
    }

    pub fn reset_performance(&self) {
        self.monitor.reset();
    }

    // ==================== Migration ====================

    /// Relabel legacy single-store usage into the tiers.
    pub fn migrate_from_legacy_store(&self) -> Result<MigrationReport> {
        self.migrations.migrate_from_legacy_store()
    }

    pub fn migration_history(&self) -> Vec<MigrationReport> {
        self.migrations.history()
    }

    // ==================== Status ====================

    /// Tier state, health grades, performance and recommendations.
    pub fn load_balancing_status(&self) -> LoadBalancingStatus {
        let layers = self.registry.all();
        let health = layers.iter().map(|l| self.health.report(l)).collect();
        let performance = self.monitor.snapshot();
        let recommendations = recommendations(&layers, &performance);

        let algorithm = self.config.strategy.algorithm;
        LoadBalancingStatus {
            layers,
            algorithm,
            suggested_read_tier: self.registry.suggested_read_tier(algorithm),
            health,
            active_sessions: self.sessions.active_count(),
            performance,
            recommendations,
        }
    }

    pub fn registry(&self) -> &TierRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &CoordinatorMetrics {
        &self.metrics
    }

    /// Metrics in Prometheus text format, with gauges refreshed.
    pub fn prometheus(&self) -> String {
        self.metrics.update_tiers(&self.registry.all());
        self.metrics
            .active_sessions
            .set(self.sessions.active_count() as i64);
        self.metrics.to_prometheus()
    }

    /// Subscribe to coordinator events.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    /// Probe every unhealthy tier now instead of waiting for the delay.
    pub async fn recover_now(&self) -> Vec<TierKind> {
        self.failover.recover().await
    }
}

/// Operator recommendations for the status surface.
fn recommendations(layers: &[DataLayer], performance: &PerformanceMetrics) -> Vec<String> {
    let mut out = Vec::new();

    for layer in layers {
        if layer.name != TierKind::Cold
            && layer.current_usage_percent > layer.max_capacity_percent * USAGE_RECOMMENDATION_RATIO
        {
            out.push(format!(
                "{} tier usage {:.1}% is above {:.0}% of its {:.0}% capacity: add capacity or shorten retention",
                layer.name,
                layer.current_usage_percent,
                USAGE_RECOMMENDATION_RATIO * 100.0,
                layer.max_capacity_percent
            ));
        }
    }

    if performance.error_rate_percent > ERROR_RATE_RECOMMENDATION_PERCENT {
        out.push(format!(
            "Error rate {:.1}% exceeds {:.0}%: investigate failing tiers",
            performance.error_rate_percent, ERROR_RATE_RECOMMENDATION_PERCENT
        ));
    }

    for layer in layers.iter().filter(|l| !l.is_healthy) {
        out.push(format!(
            "{} tier is unhealthy: fallback tiers absorb its traffic until recovery",
            layer.name
        ));
    }

    out
}

impl std::fmt::Debug for DistributedDataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedDataManager")
            .field("algorithm", &self.config.strategy.algorithm)
            .field("unhealthy_tiers", &self.registry.unhealthy_tiers())
            .field("active_sessions", &self.sessions.active_count())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

impl Drop for DistributedDataManager {
    fn drop(&mut self) {
        for handle in self.loops.get_mut().drain(..) {
            handle.abort();
        }
        self.failover.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(tier: TierKind, usage: f64, cap: f64, healthy: bool) -> DataLayer {
        DataLayer {
            name: tier,
            priority: tier.priority(),
            ttl: None,
            max_capacity_percent: cap,
            current_usage_percent: usage,
            is_healthy: healthy,
        }
    }

    #[test]
    fn test_no_recommendations_when_quiet() {
        let layers = vec![
            layer(TierKind::Hot, 5.0, 40.0, true),
            layer(TierKind::Warm, 10.0, 60.0, true),
            layer(TierKind::Cold, 10.0, 10.0, true),
        ];
        assert!(recommendations(&layers, &PerformanceMetrics::default()).is_empty());
    }

    #[test]
    fn test_usage_error_rate_and_health_recommendations() {
        let layers = vec![
            layer(TierKind::Hot, 33.0, 40.0, true),
            layer(TierKind::Warm, 10.0, 60.0, false),
            layer(TierKind::Cold, 10.0, 10.0, true),
        ];
        let performance = PerformanceMetrics {
            error_rate_percent: 12.5,
            ..Default::default()
        };

        let out = recommendations(&layers, &performance);
        assert_eq!(out.len(), 3);
        assert!(out[0].starts_with("hot tier usage 33.0%"));
        assert!(out[1].contains("Error rate 12.5%"));
        assert!(out[2].starts_with("warm tier is unhealthy"));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = CoordinatorConfig::default().with_consistency_tolerance(1.5);
        let stores = TierStores::in_memory(100);
        let err = DistributedDataManager::new(config, stores.hot, stores.warm, stores.cold)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
