//! Failover example: inject tier faults and watch the coordinator react.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example failover

use std::time::Duration;
use tierflow::testing::{metric_batch, FaultAction, TestHarness};
use tierflow::{CoordinatorConfig, LoadBalancingStrategy, TierKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("tierflow=debug,info")
        .init();

    // Short delays so the demo finishes quickly
    let config = CoordinatorConfig::default()
        .with_recovery_delay(Duration::from_secs(2))
        .with_strategy(
            LoadBalancingStrategy::default().with_health_check_interval(Duration::from_secs(1)),
        );
    let harness = TestHarness::start_with(config).await?;
    let manager = &harness.manager;
    let faults = &harness.tiers.faults;

    // Print events as they arrive
    let mut events = manager.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("  event: {:?}", event);
        }
    });

    println!("--- Hot tier down ---");
    faults.enable("hot.save", FaultAction::Fail);
    let receipt = manager.write("s1", &metric_batch("web-01", 100, 0)).await?;
    println!("Write landed in {:?}", receipt.tier);

    println!("\n--- Warm tier down too ---");
    faults.enable("warm.insert", FaultAction::Fail);
    faults.enable("warm.ping", FaultAction::Fail);
    let receipt = manager.write("s1", &metric_batch("web-01", 100, 100_000)).await?;
    println!("Write landed in {:?}", receipt.tier);

    println!("\n--- Everything down ---");
    faults.enable("cold.flush", FaultAction::Fail);
    faults.enable("cold.ping", FaultAction::Fail);
    match manager.write("s2", &metric_batch("web-02", 10, 0)).await {
        Ok(receipt) => println!("Unexpected success: {:?}", receipt),
        Err(e) => println!("Write failed: {}", e),
    }

    println!("\n--- Recovery ---");
    faults.disable_all();
    tokio::time::sleep(Duration::from_secs(3)).await;
    for layer in manager.registry().all() {
        println!("  {}: healthy={}", layer.name, layer.is_healthy);
    }

    let receipt = manager.write("s1", &metric_batch("web-01", 100, 200_000)).await?;
    println!("Write landed in {:?}", receipt.tier);
    assert_eq!(receipt.tier, Some(TierKind::Hot));

    manager.shutdown().await;
    printer.abort();
    Ok(())
}
