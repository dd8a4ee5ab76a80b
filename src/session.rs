//! Per-session distribution counters.
//!
//! One [`DistributedSession`] per session id, created on the first write.
//! Hot acknowledgements update the counters synchronously. Warm and Cold
//! counters are updated by detached tasks and therefore lag.

use crate::types::{DistributedSession, SessionId, TierKind};
use dashmap::DashMap;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::debug;

/// Concurrent map of session counters.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: DashMap<SessionId, DistributedSession>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `f` to the session, creating it on first use. A write to a
    /// closed session reopens it.
    fn touch<R>(&self, session_id: &str, f: impl FnOnce(&mut DistributedSession) -> R) -> R {
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id, "Session opened");
                DistributedSession::new(session_id)
            });
        let session = entry.value_mut();
        if !session.is_active {
            session.is_active = true;
            session.end_time = None;
        }
        session.last_activity = Instant::now();
        f(session)
    }

    /// Record metrics acknowledged by the Hot tier.
    pub fn record(&self, session_id: &str, count: usize) {
        self.touch(session_id, |s| {
            s.total_metrics += count as u64;
            s.hot_layer_metrics += count as u64;
        });
    }

    /// Record metrics that failed over and landed in `tier`.
    ///
    /// Only the landing tier's counter moves. `total_metrics` counts Hot
    /// acknowledgements, so it stays equal to `hot_layer_metrics`.
    pub fn record_failover(&self, session_id: &str, count: usize, tier: TierKind) {
        self.touch(session_id, |s| match tier {
            TierKind::Hot => {
                s.total_metrics += count as u64;
                s.hot_layer_metrics += count as u64;
            }
            TierKind::Warm => s.warm_layer_metrics += count as u64,
            TierKind::Cold => s.cold_layer_metrics += count as u64,
        });
    }

    /// Record a late acknowledgement from a slower tier. Does not change the
    /// total, which was counted when the write was accepted.
    pub fn record_tier(&self, session_id: &str, tier: TierKind, count: usize) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            match tier {
                TierKind::Hot => session.hot_layer_metrics += count as u64,
                TierKind::Warm => session.warm_layer_metrics += count as u64,
                TierKind::Cold => session.cold_layer_metrics += count as u64,
            }
        }
    }

    /// Claim the Cold flush slot if the last flush is at least `interval`
    /// old. Returns true to exactly one caller per interval.
    pub fn claim_cold_flush(&self, session_id: &str, interval: Duration) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                let now = Instant::now();
                if now.duration_since(session.last_cold_flush) >= interval {
                    session.last_cold_flush = now;
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Mark everything written so far as archived. Returns the number of
    /// metrics newly archived by this flush.
    pub fn mark_cold_flushed(&self, session_id: &str) -> u64 {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                let archived = session.total_metrics.saturating_sub(session.cold_layer_metrics);
                session.cold_layer_metrics = session.cold_layer_metrics.max(session.total_metrics);
                archived
            }
            None => 0,
        }
    }

    /// Snapshot of one session.
    pub fn get(&self, session_id: &str) -> Option<DistributedSession> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Close a session. Returns false if unknown or already closed.
    pub fn close(&self, session_id: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut session) if session.is_active => {
                session.is_active = false;
                session.end_time = Some(SystemTime::now());
                true
            }
            _ => false,
        }
    }

    /// Close active sessions idle for at least `idle`. Returns their ids.
    pub fn reap_inactive(&self, idle: Duration) -> Vec<SessionId> {
        let now = Instant::now();
        let mut closed = Vec::new();
        for mut entry in self.sessions.iter_mut() {
            let session = entry.value_mut();
            if session.is_active && now.duration_since(session.last_activity) >= idle {
                session.is_active = false;
                session.end_time = Some(SystemTime::now());
                closed.push(session.session_id.clone());
            }
        }
        if !closed.is_empty() {
            debug!(count = closed.len(), "Reaped idle sessions");
        }
        closed
    }

    /// Number of active sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_active).count()
    }

    /// Number of tracked sessions, active or not.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of all active sessions, sorted.
    pub fn active_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self
            .sessions
            .iter()
            .filter(|s| s.is_active)
            .map(|s| s.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Snapshots of all tracked sessions.
    pub fn sessions(&self) -> Vec<DistributedSession> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }
}
