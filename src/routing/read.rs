//! Read path.
//!
//! Three rules, tried in this order:
//!
//! 1. `realtime`: Hot. A non-empty result is a cache hit and is returned
//!    as is. An empty result is a miss and falls through to the next rule.
//! 2. `time_range`: Warm only. Hot is never consulted.
//! 3. default: Hot first. A Hot error falls back to Warm. There is no
//!    fallback from Warm to Hot.
//!
//! Errors on the explicit realtime and range paths propagate.

use super::{millis, RouterContext};
use crate::error::Result;
use crate::performance::OperationKind;
use crate::types::{Metric, SessionAggregates, SessionId, TierKind, TimeRange, TimeSeriesAnalysis};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

/// A session read request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadQuery {
    pub session_id: SessionId,
    /// Keep only metrics of this server.
    pub server_id: Option<String>,
    pub time_range: Option<TimeRange>,
    pub realtime: bool,
}

impl ReadQuery {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }
}

/// Metrics together with the tier that served them.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedRead {
    pub tier: TierKind,
    pub metrics: Vec<Metric>,
    /// Served by Warm after a Hot miss or error.
    pub fell_back: bool,
}

/// Resolves reads to the right tier.
#[derive(Debug)]
pub struct ReadRouter {
    ctx: RouterContext,
}

impl ReadRouter {
    pub fn new(ctx: RouterContext) -> Self {
        Self { ctx }
    }

    /// Read a session's metrics.
    pub async fn read(&self, query: &ReadQuery) -> Result<RoutedRead> {
        let start = Instant::now();
        let result = self.route(query).await;
        self.record(start, result.as_ref().ok().map(|r| r.tier));

        let mut routed = result?;
        if let Some(server_id) = &query.server_id {
            routed.metrics.retain(|m| &m.id == server_id);
        }
        Ok(routed)
    }

    async fn route(&self, query: &ReadQuery) -> Result<RoutedRead> {
        let session_id = query.session_id.as_str();
        let stores = &self.ctx.stores;

        // a realtime miss has already been counted
        let mut missed = false;
        if query.realtime {
            let metrics = stores.hot.get_session_metrics(session_id).await?;
            let hit = !metrics.is_empty();
            self.record_lookup(hit);
            if hit {
                return Ok(RoutedRead {
                    tier: TierKind::Hot,
                    metrics,
                    fell_back: false,
                });
            }
            debug!(session_id, "Realtime miss");
            missed = true;
        }

        if let Some(range) = query.time_range {
            let metrics = self.warm_history(session_id, Some(range)).await?;
            return Ok(RoutedRead {
                tier: TierKind::Warm,
                metrics,
                fell_back: missed,
            });
        }

        match stores.hot.get_session_metrics(session_id).await {
            Ok(metrics) => {
                if !missed {
                    self.record_lookup(!metrics.is_empty());
                }
                Ok(RoutedRead {
                    tier: TierKind::Hot,
                    metrics,
                    fell_back: false,
                })
            }
            Err(e) => {
                warn!(session_id, error = %e, "Hot read failed, falling back to warm tier");
                self.ctx.metrics.record_tier_error(TierKind::Hot);
                self.ctx.metrics.read_fallbacks.inc();
                let metrics = self.warm_history(session_id, None).await?;
                Ok(RoutedRead {
                    tier: TierKind::Warm,
                    metrics,
                    fell_back: true,
                })
            }
        }
    }

    /// Per-resource statistics of one server over a window.
    pub async fn analyze(&self, server_id: &str, range: TimeRange) -> Result<TimeSeriesAnalysis> {
        let start = Instant::now();
        let result = self
            .ctx
            .stores
            .warm
            .get_server_time_series_analysis(server_id, range)
            .await;
        self.record(start, result.as_ref().ok().map(|_| TierKind::Warm));
        Ok(result?)
    }

    /// Whole-session aggregates.
    pub async fn aggregate(&self, session_id: &str) -> Result<SessionAggregates> {
        let start = Instant::now();
        let result = self
            .ctx
            .stores
            .warm
            .calculate_session_aggregates(session_id)
            .await;
        self.record(start, result.as_ref().ok().map(|_| TierKind::Warm));
        Ok(result?)
    }

    async fn warm_history(&self, session_id: &str, range: Option<TimeRange>) -> Result<Vec<Metric>> {
        let (start, end) = match range {
            Some(r) => (Some(r.start), Some(r.end)),
            None => (None, None),
        };
        Ok(self
            .ctx
            .stores
            .warm
            .get_session_metrics_history(session_id, start, end)
            .await?)
    }

    fn record_lookup(&self, hit: bool) {
        self.ctx.monitor.record_cache_lookup(hit);
        self.ctx.metrics.record_cache_lookup(hit);
    }

    fn record(&self, start: Instant, served_by: Option<TierKind>) {
        let elapsed = start.elapsed();
        self.ctx
            .monitor
            .record_operation(OperationKind::Read, millis(elapsed), served_by.is_some());
        self.ctx.metrics.record_read(served_by, elapsed);
    }
}
