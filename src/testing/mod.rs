//! Testing utilities for the tier coordinator.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         TestHarness                           │
//! │                                                               │
//! │   DistributedDataManager ──▶ MemoryHot / MemoryWarm / MemoryCold
//! │                                   │          │          │     │
//! │                                   └──────────┼──────────┘     │
//! │                                              ▼                │
//! │                                      FaultRegistry            │
//! │                         (hot.save, warm.insert, cold.flush…)  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tierflow::testing::{metric_batch, FaultAction, TestHarness};
//!
//! let harness = TestHarness::start().await?;
//! harness.tiers.faults.enable("hot.save", FaultAction::Fail);
//!
//! harness.manager.write("s1", &metric_batch("srv-1", 10, 0)).await?;
//! harness.manager.wait_for_background().await;
//! assert_eq!(harness.tiers.warm.metric_count("s1"), 10);
//! ```

mod fault;
mod utils;

mod coordinator_tests;
mod failover_tests;

pub use fault::{FaultAction, FaultOutcome, FaultRegistry, FaultStats};
pub use utils::{metric_batch, wait_for_result};

use crate::config::CoordinatorConfig;
use crate::coordinator::DistributedDataManager;
use crate::error::Result;
use crate::store::{MemoryColdStore, MemoryHotStore, MemoryWarmStore, TierStores};
use std::sync::Arc;

/// In-memory stores sharing one fault registry.
#[derive(Debug, Clone)]
pub struct MemoryTiers {
    pub hot: Arc<MemoryHotStore>,
    pub warm: Arc<MemoryWarmStore>,
    pub cold: Arc<MemoryColdStore>,
    pub faults: Arc<FaultRegistry>,
}

impl MemoryTiers {
    /// Create the three stores. `hot_capacity` is in batches.
    pub fn new(hot_capacity: u64) -> Self {
        let faults = Arc::new(FaultRegistry::new());
        Self {
            hot: Arc::new(MemoryHotStore::new(hot_capacity).with_faults(faults.clone())),
            warm: Arc::new(MemoryWarmStore::new().with_faults(faults.clone())),
            cold: Arc::new(MemoryColdStore::new().with_faults(faults.clone())),
            faults,
        }
    }

    /// The stores as the coordinator sees them.
    pub fn stores(&self) -> TierStores {
        TierStores::new(self.hot.clone(), self.warm.clone(), self.cold.clone())
    }
}

/// A started coordinator over fault-injectable in-memory stores.
#[derive(Debug)]
pub struct TestHarness {
    pub manager: DistributedDataManager,
    pub tiers: MemoryTiers,
}

impl TestHarness {
    /// Start a coordinator with the default configuration.
    pub async fn start() -> Result<Self> {
        Self::start_with(CoordinatorConfig::default()).await
    }

    /// Start a coordinator with a custom configuration.
    pub async fn start_with(config: CoordinatorConfig) -> Result<Self> {
        let tiers = MemoryTiers::new(config.hot_store_capacity);
        let manager = DistributedDataManager::new(
            config,
            tiers.hot.clone(),
            tiers.warm.clone(),
            tiers.cold.clone(),
        )?;
        manager.start();

        Ok(Self { manager, tiers })
    }
}
