//! Latency histograms.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default buckets, in seconds.
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// A cumulative-bucket histogram.
#[derive(Debug)]
pub struct Histogram {
    name: &'static str,
    help: &'static str,
    buckets: Vec<f64>,
    bucket_counts: Vec<AtomicU64>,
    // f64 bits
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Histogram with [`DEFAULT_BUCKETS`].
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self::with_buckets(name, help, DEFAULT_BUCKETS.to_vec())
    }

    /// Histogram with custom bucket boundaries. NaN boundaries are dropped.
    pub fn with_buckets(name: &'static str, help: &'static str, mut buckets: Vec<f64>) -> Self {
        buckets.retain(|b| !b.is_nan());
        buckets.sort_by(f64::total_cmp);
        buckets.dedup();
        let bucket_counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();

        Self {
            name,
            help,
            buckets,
            bucket_counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Record one observation.
    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);

        let mut current = self.sum.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self
                .sum
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        for (upper, counter) in self.buckets.iter().zip(&self.bucket_counts) {
            if value <= *upper {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record a duration in seconds.
    pub fn observe_duration(&self, duration: Duration) {
        self.observe(duration.as_secs_f64());
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        f64::from_bits(self.sum.load(Ordering::Relaxed))
    }

    /// Point-in-time copy of the histogram.
    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            buckets: self.buckets.clone(),
            bucket_counts: self
                .bucket_counts
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
            sum: self.get_sum(),
            count: self.get_count(),
        }
    }

    /// Append this histogram in Prometheus text format.
    pub fn render(&self, out: &mut String) {
        let _ = write!(
            out,
            "# HELP {name} {help}\n# TYPE {name} histogram\n",
            name = self.name,
            help = self.help
        );
        self.snapshot().render_series(out, self.name, "");
    }
}

/// A snapshot of histogram data.
#[derive(Debug, Clone, Default)]
pub struct HistogramSnapshot {
    /// Bucket boundaries.
    pub buckets: Vec<f64>,
    /// Count of observations <= each boundary.
    pub bucket_counts: Vec<u64>,
    pub sum: f64,
    pub count: u64,
}

impl HistogramSnapshot {
    /// Mean of all observations.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Approximate percentile by linear interpolation inside the bucket.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }

        let target = (self.count as f64 * p / 100.0).ceil() as u64;
        let mut prev_count = 0;
        let mut prev_bound = 0.0;

        for (&bound, &count) in self.buckets.iter().zip(&self.bucket_counts) {
            if count >= target {
                let in_bucket = count - prev_count;
                if in_bucket == 0 {
                    return bound;
                }
                let position = (target - prev_count) as f64 / in_bucket as f64;
                return prev_bound + position * (bound - prev_bound);
            }
            prev_count = count;
            prev_bound = bound;
        }

        self.buckets.last().copied().unwrap_or(0.0)
    }

    fn render_series(&self, out: &mut String, name: &str, labels: &str) {
        let sep = if labels.is_empty() { "" } else { "," };
        for (bound, count) in self.buckets.iter().zip(&self.bucket_counts) {
            let _ = writeln!(out, "{name}_bucket{{{labels}{sep}le=\"{bound}\"}} {count}");
        }
        let _ = writeln!(out, "{name}_bucket{{{labels}{sep}le=\"+Inf\"}} {}", self.count);
        let braces = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{labels}}}")
        };
        let _ = writeln!(out, "{name}_sum{braces} {}", self.sum);
        let _ = writeln!(out, "{name}_count{braces} {}", self.count);
    }
}

/// Histograms split by a fixed set of label names.
#[derive(Debug)]
pub struct LabeledHistogram<const N: usize> {
    name: &'static str,
    help: &'static str,
    label_names: [&'static str; N],
    buckets: Vec<f64>,
    series: RwLock<BTreeMap<[String; N], Histogram>>,
}

impl<const N: usize> LabeledHistogram<N> {
    /// Labeled histogram with custom buckets.
    pub fn with_buckets(
        name: &'static str,
        help: &'static str,
        label_names: [&'static str; N],
        buckets: Vec<f64>,
    ) -> Self {
        Self {
            name,
            help,
            label_names,
            buckets,
            series: RwLock::new(BTreeMap::new()),
        }
    }

    /// Record a duration for `labels`.
    pub fn observe_duration(&self, labels: [&str; N], duration: Duration) {
        let key: [String; N] = labels.map(str::to_string);

        {
            let series = self.series.read();
            if let Some(h) = series.get(&key) {
                h.observe_duration(duration);
                return;
            }
        }

        self.series
            .write()
            .entry(key)
            .or_insert_with(|| Histogram::with_buckets(self.name, self.help, self.buckets.clone()))
            .observe_duration(duration);
    }

    /// Snapshot of one series.
    pub fn snapshot(&self, labels: [&str; N]) -> Option<HistogramSnapshot> {
        let key: [String; N] = labels.map(str::to_string);
        self.series.read().get(&key).map(Histogram::snapshot)
    }

    /// All series merged into one snapshot.
    pub fn merged(&self) -> HistogramSnapshot {
        let series = self.series.read();
        let mut merged = HistogramSnapshot {
            buckets: self.buckets.clone(),
            bucket_counts: vec![0; self.buckets.len()],
            sum: 0.0,
            count: 0,
        };
        for h in series.values() {
            let snap = h.snapshot();
            for (total, c) in merged.bucket_counts.iter_mut().zip(&snap.bucket_counts) {
                *total += c;
            }
            merged.sum += snap.sum;
            merged.count += snap.count;
        }
        merged
    }

    /// Append every series in Prometheus text format.
    pub fn render(&self, out: &mut String) {
        let _ = write!(
            out,
            "# HELP {name} {help}\n# TYPE {name} histogram\n",
            name = self.name,
            help = self.help
        );
        for (key, h) in self.series.read().iter() {
            let labels: Vec<String> = self
                .label_names
                .iter()
                .zip(key.iter())
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect();
            h.snapshot().render_series(out, self.name, &labels.join(","));
        }
    }
}
