//! Tiered Hot/Warm/Cold distribution coordinator for server metric streams.
//!
//! This crate routes metric batches across three storage tiers:
//! - **Hot**: low-latency keyed cache with TTL eviction (Moka in the bundled store)
//! - **Warm**: queryable time-series store for history and analytics
//! - **Cold**: archival object store receiving periodic per-session flushes
//!
//! # Features
//!
//! - Writes return once Hot holds the batch; Warm copies and Cold flushes run
//!   as tracked background tasks
//! - Cascading failover Hot → Warm → Cold with health flags and a fixed-delay
//!   recovery probe
//! - Realtime, range and Hot-first default reads, plus a unified query surface
//! - Hot/Warm drift auditing, threshold-based tuning and a status surface
//! - One-shot relabelling of a legacy single store into the tiers
//!
//! # Example
//!
//! ```rust,no_run
//! use tierflow::{CoordinatorConfig, DistributedDataManager, ReadQuery};
//! use tierflow::store::TierStores;
//! use tierflow::testing::metric_batch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stores = TierStores::in_memory(100_000);
//!     let manager = DistributedDataManager::new(
//!         CoordinatorConfig::default(),
//!         stores.hot,
//!         stores.warm,
//!         stores.cold,
//!     )?;
//!     manager.start();
//!
//!     // Hot write is awaited; Warm and Cold follow in the background
//!     manager.write("session-1", &metric_batch("web-01", 100, 0)).await?;
//!
//!     let recent = manager.read(&ReadQuery::new("session-1").realtime()).await?;
//!     println!("{} metrics from {}", recent.metrics.len(), recent.tier);
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Application Layer                │
//! └─────────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────────┐
//! │         DistributedDataManager API          │
//! │  • write(session, metrics)                  │
//! │  • read(query) / execute_unified_query      │
//! │  • audit / tune / migrate / status          │
//! └─────────────────────────────────────────────┘
//!                     │
//!     ┌───────────────┼───────────────┐
//!     ▼               ▼               ▼
//! ┌─────────┐   ┌──────────┐   ┌──────────┐
//! │   Hot   │   │   Warm   │   │   Cold   │
//! │  cache  │   │  series  │   │ archive  │
//! └─────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Consistency Model
//!
//! - **Hot**: written synchronously, strictly ordered per session
//! - **Warm**: eventually consistent; copies may land out of order
//! - **Cold**: periodic snapshot, at most one flush per session per interval
//!
//! Drift between Hot and Warm is measured, not prevented; see
//! [`consistency`].

pub mod config;
pub mod consistency;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod failover;
pub mod metrics;
pub mod migration;
pub mod performance;
pub mod routing;
pub mod session;
pub mod store;
pub mod testing;
pub mod tier;
pub mod types;

// Re-export main types for convenience
pub use config::{
    BalancingAlgorithm, CoordinatorConfig, LoadBalancingStrategy, TierPolicy, TuningThresholds,
};
pub use coordinator::{DistributedDataManager, LoadBalancingStatus};
pub use error::{Error, QueryError, Result, TierError, TierErrorKind, TierResult};
pub use events::CoordinatorEvent;
pub use types::{
    DistributedSession, Metric, SessionAggregates, SessionId, TierKind, TimeRange,
    TimeSeriesAnalysis,
};

// Re-export component types
pub use consistency::DataConsistencyReport;
pub use migration::{MigrationReport, MigrationStatus, TierDistribution};
pub use performance::{PerformanceMetrics, TuningReport};
pub use routing::{QueryResult, QueryType, ReadQuery, RoutedRead, UnifiedQuery, WriteReceipt};
pub use store::{ColdStore, HotStore, WarmStore};
pub use tier::{DataLayer, HealthStatus, TierHealthReport};

// Re-export metrics types
pub use metrics::{
    CoordinatorMetrics, Counter, FloatGauge, Gauge, Histogram, HistogramSnapshot, LabeledCounter,
    LabeledHistogram, MetricsSnapshot, TIER_LATENCY_BUCKETS,
};
