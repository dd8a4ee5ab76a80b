//! Monotonic counters.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    help: &'static str,
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by `n`.
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Append this counter in Prometheus text format.
    pub fn render(&self, out: &mut String) {
        let _ = write!(
            out,
            "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n",
            name = self.name,
            help = self.help,
            value = self.get()
        );
    }
}

/// A counter split by a fixed set of label names, e.g. `["from", "to"]`.
#[derive(Debug)]
pub struct LabeledCounter<const N: usize> {
    name: &'static str,
    help: &'static str,
    label_names: [&'static str; N],
    // BTreeMap keeps exposition output stable.
    series: RwLock<BTreeMap<[String; N], AtomicU64>>,
}

impl<const N: usize> LabeledCounter<N> {
    /// Create a new labeled counter.
    pub fn new(name: &'static str, help: &'static str, label_names: [&'static str; N]) -> Self {
        Self {
            name,
            help,
            label_names,
            series: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Increment the series for `labels` by 1.
    pub fn inc(&self, labels: [&str; N]) {
        self.inc_by(labels, 1);
    }

    /// Increment the series for `labels` by `n`.
    pub fn inc_by(&self, labels: [&str; N], n: u64) {
        let key: [String; N] = labels.map(str::to_string);

        {
            let series = self.series.read();
            if let Some(counter) = series.get(&key) {
                counter.fetch_add(n, Ordering::Relaxed);
                return;
            }
        }

        self.series
            .write()
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(n, Ordering::Relaxed);
    }

    /// Value of one series (0 if never incremented).
    pub fn get(&self, labels: [&str; N]) -> u64 {
        let key: [String; N] = labels.map(str::to_string);
        self.series
            .read()
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sum over all series.
    pub fn total(&self) -> u64 {
        self.series
            .read()
            .values()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }

    /// All series with their labels.
    pub fn get_all(&self) -> Vec<([String; N], u64)> {
        self.series
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    /// Append every series in Prometheus text format.
    pub fn render(&self, out: &mut String) {
        let _ = write!(
            out,
            "# HELP {name} {help}\n# TYPE {name} counter\n",
            name = self.name,
            help = self.help
        );
        for (labels, value) in self.get_all() {
            let pairs: Vec<String> = self
                .label_names
                .iter()
                .zip(labels.iter())
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect();
            let _ = writeln!(out, "{}{{{}}} {}", self.name, pairs.join(","), value);
        }
    }
}
