//! Scenario tests for the coordinator data path.
//!
//! These tests drive a started [`DistributedDataManager`] over the in-memory
//! stores and verify:
//! - Hot accounting and usage caps on write
//! - Read routing (realtime, range, default Hot-first with fallback)
//! - Background Warm copies and periodic Cold flushes
//! - Unified queries, auditing, tuning, migration and status

#[cfg(test)]
mod tests {
    use crate::config::{BalancingAlgorithm, CoordinatorConfig};
    use crate::error::{Error, QueryError};
    use crate::events::CoordinatorEvent;
    use crate::migration::{MigrationStatus, TierDistribution};
    use crate::routing::{QueryResult, QueryType, ReadQuery, UnifiedQuery};
    use crate::store::HotStore;
    use crate::store::WarmStore;
    use crate::testing::{metric_batch, FaultAction, TestHarness};
    use crate::tier::HealthStatus;
    use crate::types::{TierKind, TimeRange};
    use std::time::Duration;

    // observes calls without failing them
    const OBSERVE: FaultAction = FaultAction::FailTimes(0);

    #[tokio::test]
    async fn test_write_counts_hot_and_total() {
        let h = TestHarness::start().await.unwrap();

        let receipt = h.manager.write("s1", &metric_batch("srv-1", 1000, 0)).await.unwrap();
        assert_eq!(receipt.tier, Some(TierKind::Hot));
        assert_eq!(receipt.metric_count, 1000);
        assert!(receipt.warm_dispatched);
        assert!(!receipt.failed_over());

        let session = h.manager.session("s1").unwrap();
        assert_eq!(session.total_metrics, 1000);
        assert_eq!(session.hot_layer_metrics, 1000);

        // 5% initial + 1000 * 0.01
        let hot = h.manager.registry().get(TierKind::Hot);
        assert!((hot.current_usage_percent - 15.0).abs() < 1e-9);

        h.manager.wait_for_background().await;
        assert_eq!(h.tiers.warm.metric_count("s1"), 1000);
        assert_eq!(h.manager.session("s1").unwrap().warm_layer_metrics, 1000);
    }

    #[tokio::test]
    async fn test_hot_count_tracks_total_across_writes() {
        let h = TestHarness::start().await.unwrap();

        for i in 0..5 {
            h.manager
                .write("s1", &metric_batch("srv-1", 20, i * 20_000))
                .await
                .unwrap();
            let session = h.manager.session("s1").unwrap();
            assert_eq!(session.hot_layer_metrics, session.total_metrics);
        }
        assert_eq!(h.manager.session("s1").unwrap().total_metrics, 100);
    }

    #[tokio::test]
    async fn test_usage_never_exceeds_capacity() {
        let h = TestHarness::start().await.unwrap();

        for i in 0..10 {
            h.manager
                .write(&format!("s{}", i), &metric_batch("srv-1", 1000, 0))
                .await
                .unwrap();
        }
        h.manager.wait_for_background().await;

        for layer in h.manager.registry().all() {
            assert!(
                layer.current_usage_percent <= layer.max_capacity_percent,
                "{} over capacity",
                layer.name
            );
        }
        assert_eq!(h.manager.registry().get(TierKind::Hot).current_usage_percent, 40.0);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let h = TestHarness::start().await.unwrap();

        let receipt = h.manager.write("s1", &[]).await.unwrap();
        assert_eq!(receipt.tier, None);
        assert!(h.manager.session("s1").is_none());
        assert_eq!(h.manager.metrics().writes_total.get(), 0);
    }

    #[tokio::test]
    async fn test_writes_of_one_session_keep_order() {
        let h = TestHarness::start().await.unwrap();
        let (a, b, c) = (
            metric_batch("srv-1", 3, 0),
            metric_batch("srv-1", 3, 10_000),
            metric_batch("srv-1", 3, 20_000),
        );

        let (ra, rb, rc) = tokio::join!(
            h.manager.write("s1", &a),
            h.manager.write("s1", &b),
            h.manager.write("s1", &c),
        );
        ra.unwrap();
        rb.unwrap();
        rc.unwrap();

        let stored = h.tiers.hot.get_session_metrics("s1").await.unwrap();
        let ts: Vec<i64> = stored.iter().map(|m| m.timestamp).collect();
        let mut sorted = ts.clone();
        sorted.sort();
        assert_eq!(ts, sorted);
        assert_eq!(ts.len(), 9);
    }

    #[tokio::test]
    async fn test_realtime_hit_skips_warm() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();
        h.manager.wait_for_background().await;
        h.tiers.faults.enable("warm.history", OBSERVE);

        let read = h.manager.read(&ReadQuery::new("s1").realtime()).await.unwrap();

        assert_eq!(read.tier, TierKind::Hot);
        assert_eq!(read.metrics.len(), 10);
        assert!(!read.fell_back);
        assert_eq!(h.tiers.faults.hits("warm.history"), 0);
        assert_eq!(h.manager.metrics().cache_hits.get(), 1);
    }

    #[tokio::test]
    async fn test_realtime_miss_falls_through_to_default_path() {
        let h = TestHarness::start().await.unwrap();
        h.tiers
            .warm
            .batch_insert_metrics("s1", &metric_batch("srv-1", 4, 0))
            .await
            .unwrap();
        h.tiers.faults.enable("hot.get", OBSERVE);
        h.tiers.faults.enable("warm.history", OBSERVE);

        let read = h.manager.read(&ReadQuery::new("s1").realtime()).await.unwrap();

        assert_eq!(read.tier, TierKind::Hot);
        assert!(read.metrics.is_empty());
        assert!(!read.fell_back);
        assert_eq!(h.tiers.faults.hits("hot.get"), 2);
        assert_eq!(h.tiers.faults.hits("warm.history"), 0);
        assert_eq!(h.manager.metrics().cache_misses.get(), 1);
        assert_eq!(h.manager.performance().cache_hit_rate_percent, 0.0);
    }

    #[tokio::test]
    async fn test_realtime_miss_with_range_reads_warm() {
        let h = TestHarness::start().await.unwrap();
        h.tiers
            .warm
            .batch_insert_metrics("s1", &metric_batch("srv-1", 10, 0))
            .await
            .unwrap();

        let query = ReadQuery::new("s1")
            .realtime()
            .with_time_range(TimeRange::new(0, 3_000));
        let read = h.manager.read(&query).await.unwrap();

        assert_eq!(read.tier, TierKind::Warm);
        assert!(read.fell_back);
        assert_eq!(read.metrics.len(), 4);
        assert_eq!(h.manager.metrics().cache_misses.get(), 1);
    }

    #[tokio::test]
    async fn test_range_read_skips_hot() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();
        h.manager.wait_for_background().await;
        h.tiers.faults.enable("hot.get", OBSERVE);

        let query = ReadQuery::new("s1").with_time_range(TimeRange::new(2_000, 5_000));
        let read = h.manager.read(&query).await.unwrap();

        assert_eq!(read.tier, TierKind::Warm);
        assert_eq!(read.metrics.len(), 4);
        assert_eq!(h.tiers.faults.hits("hot.get"), 0);
    }

    #[tokio::test]
    async fn test_range_read_error_propagates() {
        let h = TestHarness::start().await.unwrap();
        h.tiers.faults.enable("warm.history", FaultAction::Fail);

        let query = ReadQuery::new("s1").with_time_range(TimeRange::new(0, 1));
        let err = h.manager.read(&query).await.unwrap_err();
        assert_eq!(err.tier(), Some(TierKind::Warm));
        assert_eq!(h.manager.metrics().read_failures.get(), 1);
    }

    #[tokio::test]
    async fn test_default_read_falls_back_on_hot_error() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 6, 0)).await.unwrap();
        h.manager.wait_for_background().await;
        h.tiers.faults.enable("hot.get", FaultAction::Fail);

        let read = h.manager.read(&ReadQuery::new("s1")).await.unwrap();

        assert_eq!(read.tier, TierKind::Warm);
        assert!(read.fell_back);
        assert_eq!(read.metrics.len(), 6);
        assert_eq!(h.manager.metrics().read_fallbacks.get(), 1);
    }

    #[tokio::test]
    async fn test_default_read_tries_flagged_hot_first() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 6, 0)).await.unwrap();
        h.manager.wait_for_background().await;
        h.manager.registry().mark_unhealthy(TierKind::Hot);
        h.tiers.faults.enable("hot.get", OBSERVE);

        let read = h.manager.read(&ReadQuery::new("s1")).await.unwrap();

        assert_eq!(read.tier, TierKind::Hot);
        assert_eq!(read.metrics.len(), 6);
        assert_eq!(h.tiers.faults.hits("hot.get"), 1);
    }

    #[tokio::test]
    async fn test_read_filters_by_server() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 3, 0)).await.unwrap();
        h.manager.write("s1", &metric_batch("srv-2", 5, 0)).await.unwrap();

        let read = h
            .manager
            .read(&ReadQuery::new("s1").realtime().with_server("srv-2"))
            .await
            .unwrap();
        assert_eq!(read.metrics.len(), 5);
        assert!(read.metrics.iter().all(|m| m.id == "srv-2"));
    }

    #[tokio::test]
    async fn test_audit_flags_drift() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 100, 0)).await.unwrap();
        h.manager.wait_for_background().await;

        let report = h.manager.validate_data_consistency("s1").await;
        assert!(report.is_consistent);
        assert_eq!(report.hot_layer_count, 100);
        assert_eq!(report.warm_layer_count, 100);

        // Hot-only data, as if Warm copies were still in flight
        h.tiers
            .hot
            .save_realtime_metrics("s1", &metric_batch("srv-1", 50, 500_000), None)
            .await
            .unwrap();

        let report = h.manager.validate_data_consistency("s1").await;
        assert!(!report.is_consistent);
        assert_eq!(report.hot_layer_count, 150);
        assert_eq!(report.inconsistencies.len(), 1);

        let all = h.manager.audit_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].session_id, "s1");
    }

    #[tokio::test]
    async fn test_unified_queries() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();
        h.manager.write("s1", &metric_batch("srv-2", 10, 0)).await.unwrap();
        h.manager.wait_for_background().await;

        let top = UnifiedQuery::new(QueryType::Realtime)
            .with_session("s1")
            .order_by("cpu desc")
            .limit(3);
        let result = h.manager.execute_unified_query(&top).await.unwrap();
        let cpus: Vec<f64> = result.metrics().unwrap().iter().map(|m| m.cpu).collect();
        assert_eq!(cpus, vec![9.0, 9.0, 8.0]);

        let grouped = UnifiedQuery::new(QueryType::Historical)
            .with_session("s1")
            .group_by("id");
        match h.manager.execute_unified_query(&grouped).await.unwrap() {
            QueryResult::Grouped(groups) => {
                assert_eq!(groups["srv-1"].len(), 10);
                assert_eq!(groups["srv-2"].len(), 10);
            }
            other => panic!("expected groups, got {:?}", other),
        }

        let analytics = UnifiedQuery::new(QueryType::Analytics)
            .with_server("srv-1")
            .with_time_range(TimeRange::new(0, 4_000));
        match h.manager.execute_unified_query(&analytics).await.unwrap() {
            QueryResult::Analysis(analysis) => {
                assert_eq!(analysis.server_id, "srv-1");
                assert_eq!(analysis.sample_count, 5);
                assert_eq!(analysis.cpu.max, 4.0);
            }
            other => panic!("expected analysis, got {:?}", other),
        }

        let aggregated = UnifiedQuery::new(QueryType::Aggregated).with_session("s1");
        match h.manager.execute_unified_query(&aggregated).await.unwrap() {
            QueryResult::Aggregates(agg) => {
                assert_eq!(agg.metric_count, 20);
                assert_eq!(agg.server_count, 2);
            }
            other => panic!("expected aggregates, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_historical_query_follows_read_routing() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();
        h.manager.wait_for_background().await;
        h.tiers.faults.enable("warm.history", OBSERVE);

        // no window: default path, served by Hot
        let query = UnifiedQuery::new(QueryType::Historical).with_session("s1");
        let result = h.manager.execute_unified_query(&query).await.unwrap();
        assert_eq!(result.metrics().unwrap().len(), 10);
        assert_eq!(h.tiers.faults.hits("warm.history"), 0);
        assert_eq!(h.manager.metrics().cache_hits.get(), 1);

        // window: served by Warm
        let query = query.with_time_range(TimeRange::new(0, 2_000));
        let result = h.manager.execute_unified_query(&query).await.unwrap();
        assert_eq!(result.metrics().unwrap().len(), 3);
        assert_eq!(h.tiers.faults.hits("warm.history"), 1);
    }

    #[tokio::test]
    async fn test_realtime_query_ignores_time_range() {
        let h = TestHarness::start().await.unwrap();
        h.tiers
            .warm
            .batch_insert_metrics("s1", &metric_batch("srv-1", 10, 0))
            .await
            .unwrap();
        h.tiers.faults.enable("warm.history", OBSERVE);

        let query = UnifiedQuery::new(QueryType::Realtime)
            .with_session("s1")
            .with_time_range(TimeRange::new(0, 5_000));
        let result = h.manager.execute_unified_query(&query).await.unwrap();

        assert!(result.metrics().unwrap().is_empty());
        assert_eq!(h.tiers.faults.hits("warm.history"), 0);
    }

    #[tokio::test]
    async fn test_unified_query_validation_fails_fast() {
        let h = TestHarness::start().await.unwrap();
        h.tiers.faults.enable("warm.analysis", OBSERVE);

        let query = UnifiedQuery::new(QueryType::Analytics).with_server("srv-1");
        let err = h.manager.execute_unified_query(&query).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError::MissingField("time_range"))
        ));
        assert_eq!(h.tiers.faults.hits("warm.analysis"), 0);

        assert!(matches!(
            UnifiedQuery::parse("forecast"),
            Err(QueryError::UnsupportedType(_))
        ));
    }

    #[tokio::test]
    async fn test_optimize_performance_extends_hot_ttl() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 5, 0)).await.unwrap();
        // a miss drives the hit rate to zero
        h.manager.read(&ReadQuery::new("s2").realtime()).await.unwrap();

        let report = h.manager.optimize_performance();

        assert_eq!(report.hot_ttl_applied, Some(Duration::from_secs(2700)));
        assert_eq!(
            h.manager.registry().ttl(TierKind::Hot),
            Some(Duration::from_secs(2700))
        );
        assert!(report
            .optimizations
            .iter()
            .any(|o| o.contains("from 1800s to 2700s")));
        assert!(report.optimizations.iter().any(|o| o.contains("warm tier writes")));

        // already extended
        assert_eq!(h.manager.optimize_performance().hot_ttl_applied, None);

        h.manager.reset_performance();
        assert_eq!(h.manager.performance().total_operations, 0);
    }

    #[tokio::test]
    async fn test_migration_relabels_usage() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();
        h.manager.write("s2", &metric_batch("srv-1", 10, 0)).await.unwrap();

        let report = h.manager.migrate_from_legacy_store().unwrap();

        assert_eq!(report.status, MigrationStatus::Completed);
        assert_eq!(report.migrated_sessions, 2);
        assert_eq!(
            report.new_distribution,
            TierDistribution {
                hot: 40.0,
                warm: 60.0,
                cold: 10.0
            }
        );
        assert_eq!(h.manager.migration_history().len(), 1);
        assert_eq!(h.manager.metrics().migrations_total.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_flush_after_interval() {
        let h = TestHarness::start().await.unwrap();
        let mut events = h.manager.subscribe();

        let first = h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();
        assert!(!first.cold_flush_dispatched);

        tokio::time::sleep(Duration::from_secs(300)).await;

        let second = h
            .manager
            .write("s1", &metric_batch("srv-1", 10, 10_000))
            .await
            .unwrap();
        assert!(second.cold_flush_dispatched);
        h.manager.wait_for_background().await;

        assert_eq!(h.tiers.cold.flush_count("s1"), 1);
        assert_eq!(h.manager.session("s1").unwrap().cold_layer_metrics, 20);

        let third = h
            .manager
            .write("s1", &metric_batch("srv-1", 10, 20_000))
            .await
            .unwrap();
        assert!(!third.cold_flush_dispatched);

        loop {
            if let CoordinatorEvent::ColdFlushed {
                session_id,
                archived,
            } = events.recv().await.unwrap()
            {
                assert_eq!(session_id, "s1");
                assert_eq!(archived, 20);
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_are_reaped() {
        let config =
            CoordinatorConfig::default().with_session_idle_timeout(Duration::from_secs(60));
        let h = TestHarness::start_with(config).await.unwrap();
        let mut events = h.manager.subscribe();

        h.manager.write("s1", &metric_batch("srv-1", 1, 0)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(91)).await;

        let session = h.manager.session("s1").unwrap();
        assert!(!session.is_active);
        assert!(session.end_time.is_some());
        assert_eq!(
            events.recv().await.unwrap(),
            CoordinatorEvent::SessionClosed {
                session_id: "s1".to_string()
            }
        );

        // writing again reopens it
        h.manager.write("s1", &metric_batch("srv-1", 1, 1_000)).await.unwrap();
        assert!(h.manager.session("s1").unwrap().is_active);
    }

    #[tokio::test]
    async fn test_close_session() {
        let h = TestHarness::start().await.unwrap();
        let mut events = h.manager.subscribe();
        h.manager.write("s1", &metric_batch("srv-1", 1, 0)).await.unwrap();

        assert!(h.manager.close_session("s1"));
        assert!(!h.manager.close_session("s1"));
        assert!(!h.manager.close_session("unknown"));
        assert_eq!(h.manager.load_balancing_status().active_sessions, 0);

        loop {
            if let CoordinatorEvent::SessionClosed { session_id } = events.recv().await.unwrap() {
                assert_eq!(session_id, "s1");
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_load_balancing_status() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 3000, 0)).await.unwrap();
        h.manager.registry().mark_unhealthy(TierKind::Warm);
        h.manager.wait_for_background().await;

        let status = h.manager.load_balancing_status();

        assert_eq!(status.layers.len(), 3);
        assert_eq!(status.active_sessions, 1);
        assert_eq!(status.algorithm, BalancingAlgorithm::Adaptive);
        assert_eq!(status.suggested_read_tier, Some(TierKind::Hot));
        assert!(status
            .recommendations
            .iter()
            .any(|r| r.starts_with("hot tier usage")));
        assert!(status
            .recommendations
            .iter()
            .any(|r| r.starts_with("warm tier is unhealthy")));

        let warm = status.health.iter().find(|r| r.tier == TierKind::Warm).unwrap();
        assert!(matches!(warm.status, HealthStatus::Critical { .. }));
    }

    #[tokio::test]
    async fn test_prometheus_exposition() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();

        let text = h.manager.prometheus();
        assert!(text.contains("tier_writes_total 1"));
        assert!(text.contains("tier_active_sessions 1"));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_writes() {
        let h = TestHarness::start().await.unwrap();
        h.manager.write("s1", &metric_batch("srv-1", 10, 0)).await.unwrap();

        h.manager.shutdown().await;

        assert!(h.manager.is_shutting_down());
        assert_eq!(h.tiers.warm.metric_count("s1"), 10);
        assert!(matches!(
            h.manager.write("s1", &metric_batch("srv-1", 1, 0)).await,
            Err(Error::ShuttingDown)
        ));
        // reads still work
        assert!(h.manager.read(&ReadQuery::new("s1").realtime()).await.is_ok());
    }
}
