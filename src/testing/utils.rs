use crate::types::Metric;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// `count` metrics for one server, one second apart starting at `start_ts`.
pub fn metric_batch(server_id: &str, count: usize, start_ts: i64) -> Vec<Metric> {
    (0..count)
        .map(|i| {
            let load = (i % 100) as f64;
            Metric::new(server_id, "web", start_ts + i as i64 * 1_000).with_usage(
                load,
                40.0 + load / 2.0,
                55.0,
                load * 10.0,
            )
        })
        .collect()
}

/// Retry `action` every 10ms until `predicate` holds or `timeout` elapses.
pub async fn wait_for_result<F, Fut, T, P>(
    mut action: F,
    predicate: P,
    timeout: Duration,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let start = Instant::now();
    let interval = Duration::from_millis(10);

    while start.elapsed() < timeout {
        let result = action().await;
        if predicate(&result) {
            return Some(result);
        }
        sleep(interval).await;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_batch_timestamps() {
        let batch = metric_batch("srv-1", 3, 500);
        let ts: Vec<i64> = batch.iter().map(|m| m.timestamp).collect();
        assert_eq!(ts, vec![500, 1_500, 2_500]);
        assert!(batch.iter().all(|m| m.id == "srv-1"));
    }

    #[tokio::test]
    async fn test_wait_for_result() {
        let mut calls = 0;
        let found = wait_for_result(
            || {
                calls += 1;
                let n = calls;
                async move { n }
            },
            |n| *n >= 3,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(found, Some(3));
    }
}
