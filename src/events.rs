//! Coordinator events.
//!
//! Health transitions and failover outcomes are published on a broadcast
//! channel so operators and tests can observe them without polling.

use crate::types::{SessionId, TierKind};
use tokio::sync::broadcast;
use tracing::trace;

/// Events emitted by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// A write to a tier failed.
    TierWriteFailed {
        tier: TierKind,
        session_id: SessionId,
        reason: String,
    },

    /// A tier was flagged unhealthy. The cascade skips it until recovery.
    TierUnhealthy { tier: TierKind },

    /// A tier passed a probe and rejoined the routing set.
    TierRecovered { tier: TierKind },

    /// A failed write landed in a fallback tier.
    FailoverCompleted {
        session_id: SessionId,
        from: TierKind,
        to: TierKind,
        metric_count: usize,
    },

    /// A failed write found no tier to land in.
    FailoverExhausted {
        session_id: SessionId,
        origin: TierKind,
        reason: String,
    },

    /// A session's data was flushed to the Cold tier.
    ColdFlushed {
        session_id: SessionId,
        archived: u64,
    },

    /// A session was closed, explicitly or by the idle reaper.
    SessionClosed { session_id: SessionId },
}

impl CoordinatorEvent {
    /// The tier this event is about, if any.
    pub fn tier(&self) -> Option<TierKind> {
        match self {
            CoordinatorEvent::TierWriteFailed { tier, .. }
            | CoordinatorEvent::TierUnhealthy { tier }
            | CoordinatorEvent::TierRecovered { tier } => Some(*tier),
            CoordinatorEvent::FailoverCompleted { to, .. } => Some(*to),
            CoordinatorEvent::FailoverExhausted { origin, .. } => Some(*origin),
            CoordinatorEvent::ColdFlushed { .. } => Some(TierKind::Cold),
            CoordinatorEvent::SessionClosed { .. } => None,
        }
    }

    /// Whether this event reports a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CoordinatorEvent::TierWriteFailed { .. }
                | CoordinatorEvent::TierUnhealthy { .. }
                | CoordinatorEvent::FailoverExhausted { .. }
        )
    }
}

/// Broadcast fan-out of [`CoordinatorEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoordinatorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn publish(&self, event: CoordinatorEvent) {
        if self.tx.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.tx.subscribe()
    }
}
