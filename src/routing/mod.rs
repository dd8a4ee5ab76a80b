//! Request routing across the three tiers.
//!
//! ```text
//!                write                              read
//!                  │                                  │
//!                  ▼                                  ▼
//!   ┌──────────────────────────┐     ┌──────────────────────────────┐
//!   │       WriteRouter        │     │          ReadRouter          │
//!   │ Hot (awaited)            │     │ realtime ─▶ Hot, miss ─▶ next│
//!   │ Warm (detached)          │     │ range    ─▶ Warm             │
//!   │ Cold flush (per interval)│     │ default  ─▶ Hot, Warm        │
//!   └────────────┬─────────────┘     │             on Hot error     │
//!                │ failure           └──────────────────────────────┘
//!                ▼
//!       FailoverCoordinator
//! ```
//!
//! [`query`] validates and shapes unified queries on top of [`ReadRouter`].

mod query;
mod read;
mod write;

pub use query::{execute, QueryResult, QueryType, UnifiedQuery};
pub use read::{ReadQuery, ReadRouter, RoutedRead};
pub use write::{WriteReceipt, WriteRouter};

use crate::events::EventBus;
use crate::metrics::CoordinatorMetrics;
use crate::performance::PerformanceMonitor;
use crate::session::SessionTracker;
use crate::store::TierStores;
use crate::tier::TierRegistry;
use std::sync::Arc;
use std::time::Duration;

/// State shared by both routers.
#[derive(Debug, Clone)]
pub struct RouterContext {
    pub registry: Arc<TierRegistry>,
    pub sessions: Arc<SessionTracker>,
    pub monitor: Arc<PerformanceMonitor>,
    pub metrics: Arc<CoordinatorMetrics>,
    pub events: EventBus,
    pub stores: TierStores,
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
