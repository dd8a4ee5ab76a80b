//! Example demonstrating coordinator metrics and tuning.
//!
//! This example shows how to:
//! - Drive writes and reads through the coordinator
//! - Read the rolling performance figures and tuning recommendations
//! - Get metric snapshots
//! - Export metrics in Prometheus format
//!
//! Run with:
//!   RUST_LOG=info cargo run --example metrics
//!
//! In a production setup, you would expose `prometheus()` via an HTTP
//! endpoint for Prometheus to scrape.

use tierflow::store::TierStores;
use tierflow::testing::metric_batch;
use tierflow::{CoordinatorConfig, DistributedDataManager, ReadQuery};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("tierflow=info")
        .init();

    println!("===========================================");
    println!("         Metrics Example");
    println!("===========================================");
    println!();

    let stores = TierStores::in_memory(100_000);
    let manager = DistributedDataManager::new(
        CoordinatorConfig::default(),
        stores.hot,
        stores.warm,
        stores.cold,
    )?;
    manager.start();

    // Part 1: Traffic
    println!("Simulating traffic...");
    for i in 0..50 {
        let session = format!("session-{}", i % 5);
        manager
            .write(&session, &metric_batch("web-01", 100, i * 100_000))
            .await?;
    }
    println!("  Recorded 50 writes over 5 sessions");

    // 70% realtime hits, 30% misses on unknown sessions
    for i in 0..100 {
        let session = if i % 10 < 7 {
            format!("session-{}", i % 5)
        } else {
            format!("unknown-{}", i)
        };
        manager.read(&ReadQuery::new(session).realtime()).await?;
    }
    println!("  Recorded 100 realtime reads");
    manager.wait_for_background().await;

    // Part 2: Rolling figures and tuning
    println!();
    println!("===========================================");
    println!("      Part 2: Performance and Tuning");
    println!("===========================================");
    let perf = manager.performance();
    println!("  Avg write latency: {:.3}ms", perf.avg_write_latency_ms);
    println!("  Avg read latency:  {:.3}ms", perf.avg_read_latency_ms);
    println!("  Throughput:        {:.1} ops/s", perf.throughput_ops_per_sec);
    println!("  Cache hit rate:    {:.1}%", perf.cache_hit_rate_percent);
    println!("  Error rate:        {:.1}%", perf.error_rate_percent);

    let report = manager.optimize_performance();
    for opt in &report.optimizations {
        println!("  - {}", opt);
    }
    if let Some(ttl) = report.hot_ttl_applied {
        println!("  Hot TTL now {}s", ttl.as_secs());
    }

    // Part 3: Snapshot
    println!();
    println!("===========================================");
    println!("      Part 3: Snapshot");
    println!("===========================================");
    let snapshot = manager.metrics().snapshot();
    println!("  Writes: {} ({} metrics)", snapshot.writes_total, snapshot.metrics_written);
    println!("  Reads: {} ({} fallbacks)", snapshot.reads_total, snapshot.read_fallbacks);
    println!("  Hit rate: {:.1}%", snapshot.hit_rate() * 100.0);
    println!("  Write p99: {:.3}ms", snapshot.write_latency.percentile(99.0) * 1000.0);
    println!("  Cold flushes: {}", snapshot.cold_flushes);

    // Part 4: Prometheus
    println!();
    println!("===========================================");
    println!("      Part 4: Prometheus Export");
    println!("===========================================");
    println!("{}", manager.prometheus());

    manager.shutdown().await;
    Ok(())
}
