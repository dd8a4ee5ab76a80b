//! Core types used throughout the tier coordinator.

use crate::error::{Error, TierError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use tokio::time::Instant;

/// Identifier of a metric-producing session.
pub type SessionId = String;

/// One of the three storage tiers, ordered from fastest to cheapest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    /// Low-latency keyed cache for very recent metrics.
    Hot,
    /// Queryable time-series store for medium-term history.
    Warm,
    /// Archival object store for batch flushes.
    Cold,
}

impl TierKind {
    /// All tiers in cascade order.
    pub const ALL: [TierKind; 3] = [TierKind::Hot, TierKind::Warm, TierKind::Cold];

    /// Lowercase tier name.
    pub fn name(&self) -> &'static str {
        match self {
            TierKind::Hot => "hot",
            TierKind::Warm => "warm",
            TierKind::Cold => "cold",
        }
    }

    /// Priority (1 = hot ... 3 = cold).
    pub fn priority(&self) -> u8 {
        match self {
            TierKind::Hot => 1,
            TierKind::Warm => 2,
            TierKind::Cold => 3,
        }
    }

    /// The tier a failed write cascades to, if any.
    pub fn fallback(&self) -> Option<TierKind> {
        match self {
            TierKind::Hot => Some(TierKind::Warm),
            TierKind::Warm => Some(TierKind::Cold),
            TierKind::Cold => None,
        }
    }

    pub(crate) fn index(&self) -> usize {
        (self.priority() - 1) as usize
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TierKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(TierKind::Hot),
            "warm" => Ok(TierKind::Warm),
            "cold" => Ok(TierKind::Cold),
            other => Err(Error::Config(format!("unknown tier: {}", other))),
        }
    }
}

/// A single server metric sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Server identifier.
    pub id: String,
    /// Metric type label (e.g. "web", "database").
    #[serde(rename = "type")]
    pub kind: String,
    /// CPU usage percentage.
    pub cpu: f64,
    /// Memory usage percentage.
    pub memory: f64,
    /// Disk usage percentage.
    pub disk: f64,
    /// Network throughput.
    pub network: f64,
    /// Sample time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Metric {
    /// Create a metric with zeroed resource readings.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            cpu: 0.0,
            memory: 0.0,
            disk: 0.0,
            network: 0.0,
            timestamp,
        }
    }

    /// Set the resource readings.
    pub fn with_usage(mut self, cpu: f64, memory: f64, disk: f64, network: f64) -> Self {
        self.cpu = cpu;
        self.memory = memory;
        self.disk = disk;
        self.network = network;
        self
    }

    /// Read a numeric field by name. Used for ordering unified query results.
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "cpu" => Some(self.cpu),
            "memory" => Some(self.memory),
            "disk" => Some(self.disk),
            "network" => Some(self.network),
            "timestamp" => Some(self.timestamp as f64),
            _ => None,
        }
    }

    /// Serialize a batch of metrics.
    pub fn encode_batch(metrics: &[Metric]) -> Result<Vec<u8>, TierError> {
        Ok(bincode::serialize(metrics)?)
    }

    /// Deserialize a batch of metrics.
    pub fn decode_batch(data: &[u8]) -> Result<Vec<Metric>, TierError> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Inclusive time window in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    /// Create a new range.
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Check whether a timestamp falls inside the range.
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// Avg/min/max of one resource over a set of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl ResourceStats {
    /// Compute stats over the given values. Empty input yields zeros.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        if count == 0 {
            return Self::default();
        }
        Self {
            avg: sum / count as f64,
            min,
            max,
        }
    }
}

/// Time-series analysis for one server over a window, produced by the Warm tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesAnalysis {
    pub server_id: String,
    pub range: TimeRange,
    pub sample_count: usize,
    pub cpu: ResourceStats,
    pub memory: ResourceStats,
    pub disk: ResourceStats,
    pub network: ResourceStats,
}

/// Whole-session aggregates, produced by the Warm tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAggregates {
    pub session_id: SessionId,
    pub metric_count: usize,
    pub server_count: usize,
    pub avg_cpu: f64,
    pub avg_memory: f64,
    pub avg_disk: f64,
    pub avg_network: f64,
    pub peak_cpu: f64,
    pub peak_memory: f64,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
}

/// Per-session distribution counters.
///
/// `total_metrics` counts metrics acknowledged by the Hot tier, so it always
/// equals `hot_layer_metrics`. Failed-over writes only move the counter of
/// the tier they landed in. Warm and Cold counters are updated by background
/// work and may lag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedSession {
    pub session_id: SessionId,
    pub start_time: SystemTime,
    pub end_time: Option<SystemTime>,
    pub total_metrics: u64,
    pub hot_layer_metrics: u64,
    pub warm_layer_metrics: u64,
    pub cold_layer_metrics: u64,
    pub is_active: bool,
    /// Last write seen for this session.
    #[serde(skip, default = "Instant::now")]
    pub last_activity: Instant,
    /// Last time a Cold flush was dispatched (session start until the first one).
    #[serde(skip, default = "Instant::now")]
    pub last_cold_flush: Instant,
}

impl DistributedSession {
    /// Create a new active session.
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        let now = Instant::now();
        Self {
            session_id: session_id.into(),
            start_time: SystemTime::now(),
            end_time: None,
            total_metrics: 0,
            hot_layer_metrics: 0,
            warm_layer_metrics: 0,
            cold_layer_metrics: 0,
            is_active: true,
            last_activity: now,
            last_cold_flush: now,
        }
    }

    /// Counter for the given tier.
    pub fn tier_metrics(&self, tier: TierKind) -> u64 {
        match tier {
            TierKind::Hot => self.hot_layer_metrics,
            TierKind::Warm => self.warm_layer_metrics,
            TierKind::Cold => self.cold_layer_metrics,
        }
    }
}
