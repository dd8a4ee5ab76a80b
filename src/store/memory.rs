//! In-process tier stores.
//!
//! The Hot store is a Moka cache with per-entry expiry; each saved batch is
//! a separate bincode-encoded entry keyed by `(session, sequence)`. The Warm
//! store keeps every metric per session and answers range scans and
//! aggregates by scanning. The Cold store only records an archive manifest
//! per session.
//!
//! All three consult an optional [`FaultRegistry`] before each call.

use super::{ColdStore, HotStore, WarmStore};
use crate::error::TierResult;
use crate::testing::FaultRegistry;
use crate::types::{
    Metric, ResourceStats, SessionAggregates, TierKind, TimeRange, TimeSeriesAnalysis,
};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use moka::future::Cache;
use moka::Expiry;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

async fn check_fault(
    faults: &Option<Arc<FaultRegistry>>,
    tier: TierKind,
    name: &str,
) -> TierResult<()> {
    match faults {
        Some(faults) => faults.trigger(tier, name).await,
        None => Ok(()),
    }
}

type HotKey = (String, u64);

/// One encoded batch and the TTL it was written with.
#[derive(Debug, Clone)]
struct HotEntry {
    payload: Bytes,
    ttl: Option<Duration>,
}

/// Expires each entry after the TTL captured at write time.
struct HotExpiry;

impl Expiry<HotKey, HotEntry> for HotExpiry {
    fn expire_after_create(
        &self,
        _key: &HotKey,
        value: &HotEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Hot tier backed by Moka.
pub struct MemoryHotStore {
    /// Encoded batches.
    cache: Cache<HotKey, HotEntry>,

    /// Batch sequence numbers per session, in write order. Pruned by the
    /// cache's eviction listener.
    index: Arc<DashMap<String, Vec<u64>>>,

    /// Next batch sequence number.
    next_seq: AtomicU64,

    faults: Option<Arc<FaultRegistry>>,
}

impl MemoryHotStore {
    /// Create a store holding at most `max_batches` batches.
    pub fn new(max_batches: u64) -> Self {
        let index: Arc<DashMap<String, Vec<u64>>> = Arc::new(DashMap::new());
        let evicted = index.clone();
        let cache = Cache::builder()
            .max_capacity(max_batches)
            .expire_after(HotExpiry)
            .eviction_listener(move |key: Arc<HotKey>, _entry, _cause| {
                let (session_id, seq) = key.as_ref();
                forget_batch(&evicted, session_id, *seq);
            })
            .build();

        Self {
            cache,
            index,
            next_seq: AtomicU64::new(1),
            faults: None,
        }
    }

    /// Attach a fault registry.
    pub fn with_faults(mut self, faults: Arc<FaultRegistry>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Number of batches currently cached (approximate until pending tasks run).
    pub fn batch_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Run pending Moka maintenance (eviction, expiry).
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Number of batches indexed for a session, live or not yet pruned.
    pub fn indexed_batches(&self, session_id: &str) -> usize {
        self.index.get(session_id).map_or(0, |seqs| seqs.len())
    }
}

/// Remove one batch from the session index, dropping emptied sessions.
fn forget_batch(index: &DashMap<String, Vec<u64>>, session_id: &str, seq: u64) {
    if let Some(mut seqs) = index.get_mut(session_id) {
        seqs.retain(|s| *s != seq);
    }
    index.remove_if(session_id, |_, seqs| seqs.is_empty());
}

impl Default for MemoryHotStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl std::fmt::Debug for MemoryHotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHotStore")
            .field("batches", &self.cache.entry_count())
            .field("sessions", &self.index.len())
            .finish()
    }
}

#[async_trait]
impl HotStore for MemoryHotStore {
    async fn save_realtime_metrics(
        &self,
        session_id: &str,
        metrics: &[Metric],
        ttl: Option<Duration>,
    ) -> TierResult<()> {
        check_fault(&self.faults, TierKind::Hot, "hot.save").await?;

        let payload = Bytes::from(Metric::encode_batch(metrics)?);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        // indexed first so an immediate eviction finds the entry to prune
        self.index.entry(session_id.to_string()).or_default().push(seq);
        self.cache
            .insert((session_id.to_string(), seq), HotEntry { payload, ttl })
            .await;
        Ok(())
    }

    async fn get_session_metrics(&self, session_id: &str) -> TierResult<Vec<Metric>> {
        check_fault(&self.faults, TierKind::Hot, "hot.get").await?;

        let seqs = match self.index.get(session_id) {
            Some(seqs) => seqs.value().clone(),
            None => return Ok(Vec::new()),
        };

        let mut metrics = Vec::new();
        let mut gone = HashSet::new();
        for seq in seqs {
            match self.cache.get(&(session_id.to_string(), seq)).await {
                Some(entry) => {
                    let batch = Metric::decode_batch(&entry.payload)
                        .map_err(|e| e.at(TierKind::Hot))?;
                    metrics.extend(batch);
                }
                None => {
                    gone.insert(seq);
                }
            }
        }

        // Drop index entries for expired or evicted batches
        if !gone.is_empty() {
            if let Some(mut seqs) = self.index.get_mut(session_id) {
                seqs.retain(|s| !gone.contains(s));
            }
        }

        Ok(metrics)
    }

    async fn ping(&self) -> TierResult<()> {
        check_fault(&self.faults, TierKind::Hot, "hot.ping").await
    }
}

/// Warm tier keeping every metric in memory.
#[derive(Debug, Default)]
pub struct MemoryWarmStore {
    sessions: RwLock<HashMap<String, Vec<Metric>>>,
    faults: Option<Arc<FaultRegistry>>,
}

impl MemoryWarmStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a fault registry.
    pub fn with_faults(mut self, faults: Arc<FaultRegistry>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Number of metrics stored for a session.
    pub fn metric_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .get(session_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl WarmStore for MemoryWarmStore {
    async fn batch_insert_metrics(&self, session_id: &str, metrics: &[Metric]) -> TierResult<()> {
        check_fault(&self.faults, TierKind::Warm, "warm.insert").await?;

        self.sessions
            .write()
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(metrics);
        Ok(())
    }

    async fn get_session_metrics_history(
        &self,
        session_id: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> TierResult<Vec<Metric>> {
        check_fault(&self.faults, TierKind::Warm, "warm.history").await?;

        let sessions = self.sessions.read();
        let mut history: Vec<Metric> = sessions
            .get(session_id)
            .map(|metrics| {
                metrics
                    .iter()
                    .filter(|m| start.map_or(true, |s| m.timestamp >= s))
                    .filter(|m| end.map_or(true, |e| m.timestamp <= e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(sessions);

        history.sort_by_key(|m| m.timestamp);
        Ok(history)
    }

    async fn get_server_time_series_analysis(
        &self,
        server_id: &str,
        range: TimeRange,
    ) -> TierResult<TimeSeriesAnalysis> {
        check_fault(&self.faults, TierKind::Warm, "warm.analysis").await?;

        let sessions = self.sessions.read();
        let samples: Vec<&Metric> = sessions
            .values()
            .flatten()
            .filter(|m| m.id == server_id && range.contains(m.timestamp))
            .collect();

        Ok(TimeSeriesAnalysis {
            server_id: server_id.to_string(),
            range,
            sample_count: samples.len(),
            cpu: ResourceStats::from_values(samples.iter().map(|m| m.cpu)),
            memory: ResourceStats::from_values(samples.iter().map(|m| m.memory)),
            disk: ResourceStats::from_values(samples.iter().map(|m| m.disk)),
            network: ResourceStats::from_values(samples.iter().map(|m| m.network)),
        })
    }

    async fn calculate_session_aggregates(&self, session_id: &str) -> TierResult<SessionAggregates> {
        check_fault(&self.faults, TierKind::Warm, "warm.aggregates").await?;

        let sessions = self.sessions.read();
        let metrics = sessions.get(session_id).map(Vec::as_slice).unwrap_or(&[]);

        let cpu = ResourceStats::from_values(metrics.iter().map(|m| m.cpu));
        let memory = ResourceStats::from_values(metrics.iter().map(|m| m.memory));
        let servers: HashSet<&str> = metrics.iter().map(|m| m.id.as_str()).collect();

        Ok(SessionAggregates {
            session_id: session_id.to_string(),
            metric_count: metrics.len(),
            server_count: servers.len(),
            avg_cpu: cpu.avg,
            avg_memory: memory.avg,
            avg_disk: ResourceStats::from_values(metrics.iter().map(|m| m.disk)).avg,
            avg_network: ResourceStats::from_values(metrics.iter().map(|m| m.network)).avg,
            peak_cpu: cpu.max,
            peak_memory: memory.max,
            first_timestamp: metrics.iter().map(|m| m.timestamp).min(),
            last_timestamp: metrics.iter().map(|m| m.timestamp).max(),
        })
    }

    async fn ping(&self) -> TierResult<()> {
        check_fault(&self.faults, TierKind::Warm, "warm.ping").await
    }
}

/// Archive manifest entry for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct ColdManifest {
    /// Number of flushes received.
    pub flush_count: u64,
    /// Time of the most recent flush.
    pub last_flush: SystemTime,
}

/// Cold tier recording flushes.
#[derive(Debug, Default)]
pub struct MemoryColdStore {
    manifests: DashMap<String, ColdManifest>,
    faults: Option<Arc<FaultRegistry>>,
}

impl MemoryColdStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a fault registry.
    pub fn with_faults(mut self, faults: Arc<FaultRegistry>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Manifest for a session, if it was ever flushed.
    pub fn manifest(&self, session_id: &str) -> Option<ColdManifest> {
        self.manifests.get(session_id).map(|m| m.value().clone())
    }

    /// Number of flushes received for a session.
    pub fn flush_count(&self, session_id: &str) -> u64 {
        self.manifest(session_id).map(|m| m.flush_count).unwrap_or(0)
    }
}

#[async_trait]
impl ColdStore for MemoryColdStore {
    async fn flush_batch_to_cloud_storage(&self, session_id: &str) -> TierResult<()> {
        check_fault(&self.faults, TierKind::Cold, "cold.flush").await?;

        let now = SystemTime::now();
        self.manifests
            .entry(session_id.to_string())
            .and_modify(|m| {
                m.flush_count += 1;
                m.last_flush = now;
            })
            .or_insert(ColdManifest {
                flush_count: 1,
                last_flush: now,
            });
        Ok(())
    }

    async fn ping(&self) -> TierResult<()> {
        check_fault(&self.faults, TierKind::Cold, "cold.ping").await
    }
}
