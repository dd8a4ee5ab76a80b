//! Failover and recovery scenarios through the coordinator.
//!
//! These tests inject tier faults and verify:
//! - Hot → Warm → Cold cascade order and health flags
//! - Background Warm failures reaching Cold via the failure supervisor
//! - Exhaustion surfacing `AllTiersFailed`
//! - Fixed-delay recovery probes and the periodic health check

#[cfg(test)]
mod tests {
    use crate::config::{CoordinatorConfig, LoadBalancingStrategy};
    use crate::error::Error;
    use crate::events::CoordinatorEvent;
    use crate::testing::{metric_batch, FaultAction, TestHarness};
    use crate::types::TierKind;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio::time::sleep;

    /// Config whose health loop stays out of the way of recovery probes.
    fn probe_only_config() -> CoordinatorConfig {
        CoordinatorConfig::default().with_strategy(
            LoadBalancingStrategy::default().with_health_check_interval(Duration::from_secs(3600)),
        )
    }

    fn drain(events: &mut broadcast::Receiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_hot_failure_lands_in_warm() {
        let h = TestHarness::start().await.unwrap();
        let mut events = h.manager.subscribe();
        h.tiers.faults.enable("hot.save", FaultAction::Fail);

        let receipt = h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();

        assert_eq!(receipt.tier, Some(TierKind::Warm));
        assert!(receipt.failed_over());
        assert!(!receipt.warm_dispatched);
        assert!(!h.manager.registry().is_healthy(TierKind::Hot));
        assert_eq!(h.tiers.warm.metric_count("s1"), 10);

        let session = h.manager.session("s1").unwrap();
        assert_eq!(session.total_metrics, 0);
        assert_eq!(session.hot_layer_metrics, 0);
        assert_eq!(session.warm_layer_metrics, 10);

        assert_eq!(
            drain(&mut events),
            vec![
                CoordinatorEvent::TierWriteFailed {
                    tier: TierKind::Hot,
                    session_id: "s1".to_string(),
                    reason: "hot tier: injected fault: hot.save".to_string(),
                },
                CoordinatorEvent::TierUnhealthy { tier: TierKind::Hot },
                CoordinatorEvent::FailoverCompleted {
                    session_id: "s1".to_string(),
                    from: TierKind::Hot,
                    to: TierKind::Warm,
                    metric_count: 10,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_over_writes_keep_hot_equal_to_total() {
        let h = TestHarness::start_with(probe_only_config()).await.unwrap();

        h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();
        h.tiers.faults.enable("hot.save", FaultAction::FailTimes(1));
        let receipt = h
            .manager
            .write("s1", &metric_batch("srv-1", 10, 10_000))
            .await
            .unwrap();
        assert_eq!(receipt.tier, Some(TierKind::Warm));

        let session = h.manager.session("s1").unwrap();
        assert_eq!(session.hot_layer_metrics, session.total_metrics);
        assert_eq!(session.total_metrics, 10);

        h.manager.wait_for_background().await;
        let session = h.manager.session("s1").unwrap();
        assert_eq!(session.hot_layer_metrics, session.total_metrics);
        assert_eq!(session.warm_layer_metrics, 20);
    }

    #[tokio::test]
    async fn test_flagged_hot_is_still_attempted() {
        let h = TestHarness::start_with(probe_only_config()).await.unwrap();
        h.tiers.faults.enable("hot.save", FaultAction::Fail);

        h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();
        let receipt = h
            .manager
            .write("s1", &metric_batch("srv-1", 10, 10_000))
            .await
            .unwrap();

        assert_eq!(receipt.tier, Some(TierKind::Warm));
        assert_eq!(h.tiers.faults.hits("hot.save"), 2);
        assert_eq!(h.tiers.warm.metric_count("s1"), 20);
        assert_eq!(h.manager.metrics().failovers.get(["hot", "warm"]), 2);

        // the store answers again before any probe has run
        h.tiers.faults.disable("hot.save");
        let receipt = h
            .manager
            .write("s1", &metric_batch("srv-1", 10, 20_000))
            .await
            .unwrap();
        assert_eq!(receipt.tier, Some(TierKind::Hot));
        let session = h.manager.session("s1").unwrap();
        assert_eq!(session.hot_layer_metrics, 10);
        assert_eq!(session.total_metrics, 10);
    }

    #[tokio::test]
    async fn test_warm_unhealthy_cascades_to_cold() {
        let h = TestHarness::start_with(probe_only_config()).await.unwrap();
        h.manager.registry().mark_unhealthy(TierKind::Warm);
        h.tiers.faults.enable("hot.save", FaultAction::Fail);

        let receipt = h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();

        assert_eq!(receipt.tier, Some(TierKind::Cold));
        assert!(!receipt.cold_flush_dispatched);
        assert_eq!(h.tiers.warm.metric_count("s1"), 0);
        assert_eq!(h.tiers.cold.flush_count("s1"), 1);
        assert_eq!(h.manager.session("s1").unwrap().cold_layer_metrics, 10);
    }

    #[tokio::test]
    async fn test_background_warm_failure_reaches_cold() {
        let h = TestHarness::start_with(probe_only_config()).await.unwrap();
        h.tiers.faults.enable("warm.insert", FaultAction::Fail);

        let receipt = h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();
        assert_eq!(receipt.tier, Some(TierKind::Hot));
        assert!(receipt.warm_dispatched);

        h.manager.wait_for_background().await;

        assert!(!h.manager.registry().is_healthy(TierKind::Warm));
        assert!(h.manager.registry().is_healthy(TierKind::Hot));
        assert_eq!(h.tiers.cold.flush_count("s1"), 1);

        let session = h.manager.session("s1").unwrap();
        assert_eq!(session.hot_layer_metrics, 10);
        assert_eq!(session.warm_layer_metrics, 0);
        assert_eq!(session.cold_layer_metrics, 10);
    }

    #[tokio::test]
    async fn test_all_tiers_failed() {
        let h = TestHarness::start().await.unwrap();
        let mut events = h.manager.subscribe();
        for name in ["hot.save", "warm.insert", "cold.flush"] {
            h.tiers.faults.enable(name, FaultAction::Fail);
        }

        let err = h
            .manager
            .write("s1", &metric_batch("srv-1", 10, 0))
            .await
            .unwrap_err();

        match err {
            Error::AllTiersFailed { session_id, last } => {
                assert_eq!(session_id, "s1");
                assert_eq!(last.tier, TierKind::Cold);
            }
            other => panic!("expected AllTiersFailed, got {:?}", other),
        }
        assert!(h.manager.session("s1").is_none());
        assert_eq!(h.manager.registry().unhealthy_tiers().len(), 3);
        assert_eq!(h.manager.metrics().failovers_exhausted.get(), 1);
        assert_eq!(h.manager.metrics().write_failures.get(), 1);
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, CoordinatorEvent::FailoverExhausted { .. })));
    }

    #[tokio::test]
    async fn test_failover_disabled_surfaces_hot_error() {
        let config = CoordinatorConfig::default().with_strategy(
            LoadBalancingStrategy::default().with_failover_enabled(false),
        );
        let h = TestHarness::start_with(config).await.unwrap();
        h.tiers.faults.enable("hot.save", FaultAction::Fail);

        let err = h
            .manager
            .write("s1", &metric_batch("srv-1", 10, 0))
            .await
            .unwrap_err();

        assert_eq!(err.tier(), Some(TierKind::Hot));
        assert!(!h.manager.registry().is_healthy(TierKind::Hot));
        assert_eq!(h.tiers.warm.metric_count("s1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_probe_after_fixed_delay() {
        let h = TestHarness::start_with(probe_only_config()).await.unwrap();
        let mut events = h.manager.subscribe();
        h.tiers.faults.enable("hot.save", FaultAction::FailTimes(1));

        h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();
        assert!(!h.manager.registry().is_healthy(TierKind::Hot));

        sleep(Duration::from_secs(59)).await;
        assert!(!h.manager.registry().is_healthy(TierKind::Hot));

        sleep(Duration::from_secs(2)).await;
        assert!(h.manager.registry().is_healthy(TierKind::Hot));
        assert!(drain(&mut events).contains(&CoordinatorEvent::TierRecovered {
            tier: TierKind::Hot
        }));
        assert_eq!(h.manager.metrics().recoveries.get(["hot"]), 1);

        let receipt = h
            .manager
            .write("s1", &metric_batch("srv-1", 10, 10_000))
            .await
            .unwrap();
        assert_eq!(receipt.tier, Some(TierKind::Hot));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_rearms_with_same_delay() {
        let h = TestHarness::start_with(probe_only_config()).await.unwrap();
        h.tiers.faults.enable("hot.save", FaultAction::Fail);
        h.tiers.faults.enable("hot.ping", FaultAction::Fail);

        h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();

        sleep(Duration::from_secs(61)).await;
        assert!(!h.manager.registry().is_healthy(TierKind::Hot));
        // one probe, three attempts
        assert_eq!(h.tiers.faults.hits("hot.ping"), 3);

        // further failures do not arm a second probe
        h.manager
            .write("s2", &metric_batch("srv-1", 10, 0))
            .await
            .unwrap();

        h.tiers.faults.disable("hot.ping");
        sleep(Duration::from_secs(60)).await;
        assert!(h.manager.registry().is_healthy(TierKind::Hot));
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_loop_flips_tiers() {
        let h = TestHarness::start().await.unwrap();
        let mut events = h.manager.subscribe();
        h.tiers.faults.enable("cold.ping", FaultAction::Fail);

        sleep(Duration::from_secs(31)).await;
        assert!(!h.manager.registry().is_healthy(TierKind::Cold));
        assert!(drain(&mut events).contains(&CoordinatorEvent::TierUnhealthy {
            tier: TierKind::Cold
        }));

        h.tiers.faults.disable("cold.ping");
        sleep(Duration::from_secs(30)).await;
        assert!(h.manager.registry().is_healthy(TierKind::Cold));
        assert!(drain(&mut events).contains(&CoordinatorEvent::TierRecovered {
            tier: TierKind::Cold
        }));
    }

    #[tokio::test]
    async fn test_recover_now() {
        let h = TestHarness::start_with(probe_only_config()).await.unwrap();
        h.manager.registry().mark_unhealthy(TierKind::Warm);
        h.tiers.faults.enable("warm.ping", FaultAction::FailTimes(3));

        assert_eq!(h.manager.recover_now().await, vec![TierKind::Warm]);
        assert!(h.manager.recover_now().await.is_empty());
        assert!(h.manager.registry().is_healthy(TierKind::Warm));
    }
}
