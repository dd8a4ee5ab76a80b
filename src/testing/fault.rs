//! Fault injection for tier stores.
//!
//! The in-memory stores check a named fault before every operation, which
//! lets tests fail or slow down a single tier call without touching the
//! coordinator. Names follow `<tier>.<operation>`:
//!
//! | Name              | Store call                          |
//! |-------------------|-------------------------------------|
//! | `hot.save`        | `HotStore::save_realtime_metrics`   |
//! | `hot.get`         | `HotStore::get_session_metrics`     |
//! | `warm.insert`     | `WarmStore::batch_insert_metrics`   |
//! | `warm.history`    | `WarmStore::get_session_metrics_history` |
//! | `warm.analysis`   | `WarmStore::get_server_time_series_analysis` |
//! | `warm.aggregates` | `WarmStore::calculate_session_aggregates` |
//! | `cold.flush`      | `ColdStore::flush_batch_to_cloud_storage` |
//! | `<tier>.ping`     | liveness check                      |
//!
//! # Example
//!
//! ```rust,ignore
//! use tierflow::testing::{FaultAction, FaultRegistry};
//!
//! let faults = FaultRegistry::new();
//! faults.enable("hot.save", FaultAction::FailTimes(2));
//! // the next two Hot writes fail, later ones succeed
//! ```

use crate::error::{TierError, TierErrorKind, TierResult};
use crate::types::TierKind;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Action taken when a fault is hit.
#[derive(Debug, Clone, PartialEq)]
pub enum FaultAction {
    /// Fail every call.
    Fail,

    /// Fail the first N calls, then pass.
    FailTimes(u64),

    /// Pass the first N-1 calls, then fail every call from the Nth on.
    FailAfter(u64),

    /// Fail every Nth call.
    EveryN(u64),

    /// Fail with a probability (0.0 - 1.0).
    Probability(f64),

    /// Delay the call, then let it proceed.
    Delay(Duration),
}

/// Result of checking a fault.
#[derive(Debug, Clone, PartialEq)]
pub enum FaultOutcome {
    /// Proceed normally.
    Continue,

    /// Fail the call.
    Fail,

    /// Sleep, then proceed.
    Delay(Duration),
}

struct FaultState {
    action: FaultAction,
    hit_count: AtomicU64,
    triggered_count: AtomicU64,
}

/// Statistics for a fault.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultStats {
    /// Number of times the fault was checked.
    pub hit_count: u64,

    /// Number of times it actually failed or delayed the call.
    pub triggered_count: u64,
}

/// Registry of named faults.
pub struct FaultRegistry {
    faults: RwLock<HashMap<String, Arc<FaultState>>>,
    enabled: AtomicBool,
}

impl Default for FaultRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FaultRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultRegistry")
            .field("faults", &self.list())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl FaultRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            faults: RwLock::new(HashMap::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Enable a fault, replacing any previous action and counters.
    pub fn enable(&self, name: &str, action: FaultAction) {
        let state = Arc::new(FaultState {
            action,
            hit_count: AtomicU64::new(0),
            triggered_count: AtomicU64::new(0),
        });
        self.faults.write().insert(name.to_string(), state);
    }

    /// Disable a specific fault.
    pub fn disable(&self, name: &str) {
        self.faults.write().remove(name);
    }

    /// Disable all faults.
    pub fn disable_all(&self) {
        self.faults.write().clear();
    }

    /// Globally enable/disable all faults.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Check if globally enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Check a fault and decide what the call should do.
    pub fn check(&self, name: &str) -> FaultOutcome {
        if !self.enabled.load(Ordering::Relaxed) {
            return FaultOutcome::Continue;
        }

        let state = match self.faults.read().get(name) {
            Some(s) => s.clone(),
            None => return FaultOutcome::Continue,
        };

        let hit = state.hit_count.fetch_add(1, Ordering::Relaxed) + 1;

        let outcome = match &state.action {
            FaultAction::Fail => FaultOutcome::Fail,
            FaultAction::FailTimes(n) if hit <= *n => FaultOutcome::Fail,
            FaultAction::FailAfter(n) if hit >= *n => FaultOutcome::Fail,
            FaultAction::EveryN(n) if *n > 0 && hit % n == 0 => FaultOutcome::Fail,
            FaultAction::Probability(p) if rand::random::<f64>() < *p => FaultOutcome::Fail,
            FaultAction::Delay(d) => FaultOutcome::Delay(*d),
            _ => FaultOutcome::Continue,
        };

        if outcome != FaultOutcome::Continue {
            state.triggered_count.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    /// Check a fault on behalf of a tier call.
    ///
    /// Delays are slept here; failures become an injected [`TierError`].
    pub async fn trigger(&self, tier: TierKind, name: &str) -> TierResult<()> {
        match self.check(name) {
            FaultOutcome::Continue => Ok(()),
            FaultOutcome::Delay(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
            FaultOutcome::Fail => Err(TierError::new(
                tier,
                TierErrorKind::Injected(name.to_string()),
            )),
        }
    }

    /// Get statistics for a fault.
    pub fn stats(&self, name: &str) -> Option<FaultStats> {
        self.faults.read().get(name).map(|state| FaultStats {
            hit_count: state.hit_count.load(Ordering::Relaxed),
            triggered_count: state.triggered_count.load(Ordering::Relaxed),
        })
    }

    /// Number of times a fault was checked (0 if not enabled).
    pub fn hits(&self, name: &str) -> u64 {
        self.stats(name).map(|s| s.hit_count).unwrap_or(0)
    }

    /// List all active faults.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<_> = self.faults.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_fail() {
        let registry = FaultRegistry::new();
        registry.enable("hot.save", FaultAction::Fail);

        assert_eq!(registry.check("hot.save"), FaultOutcome::Fail);
        assert_eq!(registry.check("hot.get"), FaultOutcome::Continue);
    }

    #[test]
    fn test_fault_disabled() {
        let registry = FaultRegistry::new();
        registry.enable("hot.save", FaultAction::Fail);
        registry.disable("hot.save");

        assert_eq!(registry.check("hot.save"), FaultOutcome::Continue);
    }

    #[test]
    fn test_fault_globally_disabled() {
        let registry = FaultRegistry::new();
        registry.enable("hot.save", FaultAction::Fail);
        registry.set_enabled(false);

        assert_eq!(registry.check("hot.save"), FaultOutcome::Continue);
    }

    #[test]
    fn test_fault_fail_times() {
        let registry = FaultRegistry::new();
        registry.enable("warm.insert", FaultAction::FailTimes(2));

        assert_eq!(registry.check("warm.insert"), FaultOutcome::Fail);
        assert_eq!(registry.check("warm.insert"), FaultOutcome::Fail);
        assert_eq!(registry.check("warm.insert"), FaultOutcome::Continue);

        let stats = registry.stats("warm.insert").unwrap();
        assert_eq!(stats.hit_count, 3);
        assert_eq!(stats.triggered_count, 2);
    }

    #[test]
    fn test_fault_fail_after() {
        let registry = FaultRegistry::new();
        registry.enable("cold.flush", FaultAction::FailAfter(3));

        assert_eq!(registry.check("cold.flush"), FaultOutcome::Continue);
        assert_eq!(registry.check("cold.flush"), FaultOutcome::Continue);
        assert_eq!(registry.check("cold.flush"), FaultOutcome::Fail);
        assert_eq!(registry.check("cold.flush"), FaultOutcome::Fail);
    }

    #[test]
    fn test_fault_every_n() {
        let registry = FaultRegistry::new();
        registry.enable("hot.get", FaultAction::EveryN(2));

        assert_eq!(registry.check("hot.get"), FaultOutcome::Continue);
        assert_eq!(registry.check("hot.get"), FaultOutcome::Fail);
        assert_eq!(registry.check("hot.get"), FaultOutcome::Continue);
    }

    #[tokio::test]
    async fn test_trigger_maps_to_tier_error() {
        let registry = FaultRegistry::new();
        registry.enable("warm.history", FaultAction::Fail);

        let err = registry
            .trigger(TierKind::Warm, "warm.history")
            .await
            .unwrap_err();
        assert_eq!(err.tier, TierKind::Warm);
        assert!(matches!(err.kind, TierErrorKind::Injected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_delay() {
        let registry = FaultRegistry::new();
        registry.enable("hot.save", FaultAction::Delay(Duration::from_millis(250)));

        let start = tokio::time::Instant::now();
        registry.trigger(TierKind::Hot, "hot.save").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
