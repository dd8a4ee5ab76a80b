//! Basic example of using the tier coordinator.

use tierflow::store::TierStores;
use tierflow::testing::metric_batch;
use tierflow::{CoordinatorConfig, DistributedDataManager, QueryType, ReadQuery, TimeRange, UnifiedQuery};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter("tierflow=debug,info")
        .init();

    let stores = TierStores::in_memory(100_000);
    let manager = DistributedDataManager::new(
        CoordinatorConfig::default(),
        stores.hot,
        stores.warm,
        stores.cold,
    )?;
    manager.start();

    println!("Coordinator started!");

    // Writes
    println!("\n--- Writes ---");
    for server in ["web-01", "web-02", "db-01"] {
        let receipt = manager.write("session-1", &metric_batch(server, 500, 0)).await?;
        println!("{}: {} metrics -> {:?}", server, receipt.metric_count, receipt.tier);
    }

    // Let the Warm copies land
    manager.wait_for_background().await;

    if let Some(session) = manager.session("session-1") {
        println!("\nSession session-1:");
        println!("  Total: {}", session.total_metrics);
        println!("  Hot: {}", session.hot_layer_metrics);
        println!("  Warm: {}", session.warm_layer_metrics);
        println!("  Cold: {}", session.cold_layer_metrics);
    }

    // Reads
    println!("\n--- Reads ---");
    let recent = manager.read(&ReadQuery::new("session-1").realtime()).await?;
    println!("Realtime: {} metrics from {}", recent.metrics.len(), recent.tier);

    let window = manager
        .read(&ReadQuery::new("session-1").with_time_range(TimeRange::new(0, 60_000)))
        .await?;
    println!("First minute: {} metrics from {}", window.metrics.len(), window.tier);

    // Unified queries
    println!("\n--- Unified queries ---");
    let busiest = UnifiedQuery::new(QueryType::Realtime)
        .with_session("session-1")
        .order_by("cpu desc")
        .limit(3);
    if let Some(metrics) = manager.execute_unified_query(&busiest).await?.metrics() {
        for m in metrics {
            println!("  {} cpu={:.1} at {}", m.id, m.cpu, m.timestamp);
        }
    }

    let aggregated = UnifiedQuery::new(QueryType::Aggregated).with_session("session-1");
    println!("Aggregates: {:?}", manager.execute_unified_query(&aggregated).await?);

    // Consistency
    let report = manager.validate_data_consistency("session-1").await;
    println!(
        "\nConsistency: hot={} warm={} consistent={}",
        report.hot_layer_count, report.warm_layer_count, report.is_consistent
    );

    // Status
    let status = manager.load_balancing_status();
    println!("\nTiers:");
    for layer in &status.layers {
        println!(
            "  {}: {:.1}% of {:.0}% (healthy: {})",
            layer.name, layer.current_usage_percent, layer.max_capacity_percent, layer.is_healthy
        );
    }
    for rec in &status.recommendations {
        println!("  recommendation: {}", rec);
    }

    manager.shutdown().await;
    println!("\nDone!");

    Ok(())
}
