//! Unified query surface.
//!
//! A [`UnifiedQuery`] names one of four query types. Required fields are
//! checked before any tier is touched:
//!
//! | type         | requires                   | served by              |
//! |--------------|----------------------------|------------------------|
//! | `realtime`   | `session_id`               | Hot, Warm on a miss    |
//! | `historical` | `session_id`               | Warm                   |
//! | `analytics`  | `server_id`, `time_range`  | Warm analysis          |
//! | `aggregated` | `session_id`               | Warm aggregates        |
//!
//! Metric results are then filtered by type, ordered, limited and grouped,
//! in that order.

use super::read::{ReadQuery, ReadRouter};
use crate::error::{QueryError, Result};
use crate::types::{Metric, SessionAggregates, SessionId, TimeRange, TimeSeriesAnalysis};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The four supported query types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Realtime,
    Historical,
    Analytics,
    Aggregated,
}

impl QueryType {
    pub fn name(&self) -> &'static str {
        match self {
            QueryType::Realtime => "realtime",
            QueryType::Historical => "historical",
            QueryType::Analytics => "analytics",
            QueryType::Aggregated => "aggregated",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QueryType {
    type Err = QueryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "realtime" => Ok(QueryType::Realtime),
            "historical" => Ok(QueryType::Historical),
            "analytics" => Ok(QueryType::Analytics),
            "aggregated" => Ok(QueryType::Aggregated),
            other => Err(QueryError::UnsupportedType(other.to_string())),
        }
    }
}

/// A query over the coordinator's tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedQuery {
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub session_id: Option<SessionId>,
    pub server_id: Option<String>,
    pub time_range: Option<TimeRange>,
    /// Metric types to keep. Empty keeps all.
    #[serde(default)]
    pub metrics: Vec<String>,
    /// `"id"` (server) or `"type"`.
    pub group_by: Option<String>,
    /// A numeric metric field, optionally followed by `asc` or `desc`.
    pub order_by: Option<String>,
    pub limit: Option<usize>,
}

impl UnifiedQuery {
    pub fn new(query_type: QueryType) -> Self {
        Self {
            query_type,
            session_id: None,
            server_id: None,
            time_range: None,
            metrics: Vec::new(),
            group_by: None,
            order_by: None,
            limit: None,
        }
    }

    /// Build from a type name. Unknown names fail fast.
    pub fn parse(query_type: &str) -> std::result::Result<Self, QueryError> {
        Ok(Self::new(query_type.parse()?))
    }

    pub fn with_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_metric_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.group_by = Some(field.into());
        self
    }

    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.order_by = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check required fields and shaping options.
    pub fn validate(&self) -> std::result::Result<(), QueryError> {
        match self.query_type {
            QueryType::Realtime | QueryType::Historical | QueryType::Aggregated => {
                self.require_session()?;
            }
            QueryType::Analytics => {
                if self.server_id.is_none() {
                    return Err(QueryError::MissingField("server_id"));
                }
                if self.time_range.is_none() {
                    return Err(QueryError::MissingField("time_range"));
                }
            }
        }
        self.ordering()?;
        self.grouping()?;
        Ok(())
    }

    fn require_session(&self) -> std::result::Result<&str, QueryError> {
        self.session_id
            .as_deref()
            .ok_or(QueryError::MissingField("session_id"))
    }

    fn ordering(&self) -> std::result::Result<Option<(&str, bool)>, QueryError> {
        let Some(order) = self.order_by.as_deref() else {
            return Ok(None);
        };
        let invalid = || QueryError::InvalidField {
            field: "order_by",
            value: order.to_string(),
        };

        let mut parts = order.split_whitespace();
        let field = parts.next().ok_or_else(invalid)?;
        let descending = match parts.next() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(_) => return Err(invalid()),
        };
        if parts.next().is_some() || probe_field(field).is_none() {
            return Err(invalid());
        }
        Ok(Some((field, descending)))
    }

    fn grouping(&self) -> std::result::Result<Option<GroupKey>, QueryError> {
        match self.group_by.as_deref() {
            None => Ok(None),
            Some("id") | Some("server") => Ok(Some(GroupKey::Server)),
            Some("type") => Ok(Some(GroupKey::Type)),
            Some(other) => Err(QueryError::InvalidField {
                field: "group_by",
                value: other.to_string(),
            }),
        }
    }

    /// Filter, order, limit and group a metric result.
    fn shape(&self, mut metrics: Vec<Metric>) -> std::result::Result<QueryResult, QueryError> {
        if !self.metrics.is_empty() {
            metrics.retain(|m| self.metrics.contains(&m.kind));
        }

        if let Some((field, descending)) = self.ordering()? {
            metrics.sort_by(|a, b| {
                let ord = compare_field(a, b, field);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        if let Some(limit) = self.limit {
            metrics.truncate(limit);
        }

        Ok(match self.grouping()? {
            None => QueryResult::Metrics(metrics),
            Some(key) => {
                let mut groups: BTreeMap<String, Vec<Metric>> = BTreeMap::new();
                for metric in metrics {
                    let k = match key {
                        GroupKey::Server => metric.id.clone(),
                        GroupKey::Type => metric.kind.clone(),
                    };
                    groups.entry(k).or_default().push(metric);
                }
                QueryResult::Grouped(groups)
            }
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupKey {
    Server,
    Type,
}

fn probe_field(field: &str) -> Option<f64> {
    Metric::new("", "", 0).field(field)
}

fn compare_field(a: &Metric, b: &Metric, field: &str) -> Ordering {
    let x = a.field(field).unwrap_or(f64::NAN);
    let y = b.field(field).unwrap_or(f64::NAN);
    x.total_cmp(&y)
}

/// Result of a unified query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryResult {
    Metrics(Vec<Metric>),
    Grouped(BTreeMap<String, Vec<Metric>>),
    Analysis(TimeSeriesAnalysis),
    Aggregates(SessionAggregates),
}

impl QueryResult {
    /// The metric list, for ungrouped metric results.
    pub fn metrics(&self) -> Option<&[Metric]> {
        match self {
            QueryResult::Metrics(m) => Some(m),
            _ => None,
        }
    }
}

/// Validate and run a unified query.
pub async fn execute(reader: &ReadRouter, query: &UnifiedQuery) -> Result<QueryResult> {
    query.validate()?;

    match query.query_type {
        QueryType::Realtime => {
            // realtime reads ignore any window
            let mut read = ReadQuery::new(query.require_session()?).realtime();
            read.server_id = query.server_id.clone();
            let routed = reader.read(&read).await?;
            Ok(query.shape(routed.metrics)?)
        }
        QueryType::Historical => {
            let mut read = ReadQuery::new(query.require_session()?);
            read.server_id = query.server_id.clone();
            read.time_range = query.time_range;
            let routed = reader.read(&read).await?;
            Ok(query.shape(routed.metrics)?)
        }
        QueryType::Analytics => {
            let server_id = query
                .server_id
                .as_deref()
                .ok_or(QueryError::MissingField("server_id"))?;
            let range = query
                .time_range
                .ok_or(QueryError::MissingField("time_range"))?;
            Ok(QueryResult::Analysis(reader.analyze(server_id, range).await?))
        }
        QueryType::Aggregated => Ok(QueryResult::Aggregates(
            reader.aggregate(query.require_session()?).await?,
        )),
    }
}
