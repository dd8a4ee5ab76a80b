//! Collaborator contracts for the three storage tiers.
//!
//! The coordinator never talks to a concrete backend. It holds one
//! implementation of each trait below and routes calls between them. Wire
//! protocols, pooling and query languages belong to the implementations.
//!
//! [`memory`] provides in-process implementations used by tests, demos and
//! single-node deployments.

pub mod memory;

use crate::error::TierResult;
use crate::types::{Metric, SessionAggregates, TierKind, TimeRange, TimeSeriesAnalysis};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use memory::{MemoryColdStore, MemoryHotStore, MemoryWarmStore};

/// Low-latency keyed metric cache with TTL eviction.
#[async_trait]
pub trait HotStore: Send + Sync + std::fmt::Debug {
    /// Store a batch for a session. Entries expire after `ttl` (None = never).
    async fn save_realtime_metrics(
        &self,
        session_id: &str,
        metrics: &[Metric],
        ttl: Option<Duration>,
    ) -> TierResult<()>;

    /// All unexpired metrics of a session, in write order.
    async fn get_session_metrics(&self, session_id: &str) -> TierResult<Vec<Metric>>;

    /// Liveness check.
    async fn ping(&self) -> TierResult<()> {
        Ok(())
    }
}

/// Queryable time-series store supporting range scans and aggregates.
#[async_trait]
pub trait WarmStore: Send + Sync + std::fmt::Debug {
    /// Append a batch for a session.
    async fn batch_insert_metrics(&self, session_id: &str, metrics: &[Metric]) -> TierResult<()>;

    /// Metrics of a session, optionally bounded by inclusive timestamps.
    async fn get_session_metrics_history(
        &self,
        session_id: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> TierResult<Vec<Metric>>;

    /// Per-resource statistics for one server over a window.
    async fn get_server_time_series_analysis(
        &self,
        server_id: &str,
        range: TimeRange,
    ) -> TierResult<TimeSeriesAnalysis>;

    /// Whole-session aggregates.
    async fn calculate_session_aggregates(&self, session_id: &str) -> TierResult<SessionAggregates>;

    /// Liveness check.
    async fn ping(&self) -> TierResult<()> {
        Ok(())
    }
}

/// Archival object store receiving batch flushes.
#[async_trait]
pub trait ColdStore: Send + Sync + std::fmt::Debug {
    /// Flush the buffered data of a session to archival storage.
    async fn flush_batch_to_cloud_storage(&self, session_id: &str) -> TierResult<()>;

    /// Liveness check.
    async fn ping(&self) -> TierResult<()> {
        Ok(())
    }
}

/// The three collaborator stores the coordinator routes between.
#[derive(Debug, Clone)]
pub struct TierStores {
    pub hot: Arc<dyn HotStore>,
    pub warm: Arc<dyn WarmStore>,
    pub cold: Arc<dyn ColdStore>,
}

impl TierStores {
    /// Bundle the three stores.
    pub fn new(hot: Arc<dyn HotStore>, warm: Arc<dyn WarmStore>, cold: Arc<dyn ColdStore>) -> Self {
        Self { hot, warm, cold }
    }

    /// In-memory stores with the given Hot capacity, in batches.
    pub fn in_memory(hot_capacity: u64) -> Self {
        Self::new(
            Arc::new(MemoryHotStore::new(hot_capacity)),
            Arc::new(MemoryWarmStore::new()),
            Arc::new(MemoryColdStore::new()),
        )
    }

    /// Liveness check of one tier.
    pub async fn ping(&self, tier: TierKind) -> TierResult<()> {
        match tier {
            TierKind::Hot => self.hot.ping().await,
            TierKind::Warm => self.warm.ping().await,
            TierKind::Cold => self.cold.ping().await,
        }
    }
}
