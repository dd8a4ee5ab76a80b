//! Error types for the tier coordinator.

use crate::types::TierKind;
use thiserror::Error;

/// Result type alias for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for a single tier store call.
pub type TierResult<T> = std::result::Result<T, TierError>;

/// Main error type for the tier coordinator.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A single tier call failed.
    #[error("tier error: {0}")]
    Tier(#[from] TierError),

    /// Every tier in the cascade rejected the write.
    #[error("all tiers failed for session {session_id}: {last}")]
    AllTiersFailed {
        session_id: String,
        last: TierError,
    },

    /// Unified query validation errors.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// A migration is already running.
    #[error("migration already in progress")]
    MigrationInProgress,

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),

    /// The coordinator has been shut down.
    #[error("coordinator shutting down")]
    ShuttingDown,
}

impl Error {
    /// The tier the error originated from, if any.
    pub fn tier(&self) -> Option<TierKind> {
        match self {
            Error::Tier(e) | Error::AllTiersFailed { last: e, .. } => Some(e.tier),
            _ => None,
        }
    }
}

/// A failure reported by one tier store.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{tier} tier: {kind}")]
pub struct TierError {
    /// The tier that failed.
    pub tier: TierKind,
    /// What went wrong.
    pub kind: TierErrorKind,
}

impl TierError {
    /// Create a new tier error.
    pub fn new(tier: TierKind, kind: TierErrorKind) -> Self {
        Self { tier, kind }
    }

    /// The tier is flagged unhealthy or unreachable.
    pub fn unavailable(tier: TierKind) -> Self {
        Self::new(tier, TierErrorKind::Unavailable)
    }

    /// The store rejected the operation.
    pub fn operation(tier: TierKind, reason: impl Into<String>) -> Self {
        Self::new(tier, TierErrorKind::Operation(reason.into()))
    }

    /// Re-attribute an error to another tier (codec errors are created tierless).
    pub fn at(mut self, tier: TierKind) -> Self {
        self.tier = tier;
        self
    }
}

/// Kinds of tier failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TierErrorKind {
    /// The tier is unavailable.
    #[error("unavailable")]
    Unavailable,

    /// The store rejected or failed the operation.
    #[error("operation failed: {0}")]
    Operation(String),

    /// Payload encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// Failure injected by a fault registry.
    #[error("injected fault: {0}")]
    Injected(String),
}

/// Unified query validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The query type is not one of realtime/historical/analytics/aggregated.
    #[error("unsupported query type: {0}")]
    UnsupportedType(String),

    /// A field required by the query type is missing.
    #[error("query requires {0}")]
    MissingField(&'static str),

    /// A field value is not recognised.
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

impl From<bincode::Error> for TierError {
    fn from(e: bincode::Error) -> Self {
        // Codec errors are attributed to Hot until re-tagged with `at`.
        TierError::new(TierKind::Hot, TierErrorKind::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_error_display() {
        let err = TierError::operation(TierKind::Warm, "connection reset");
        assert_eq!(err.to_string(), "warm tier: operation failed: connection reset");

        let err = TierError::unavailable(TierKind::Cold);
        assert_eq!(err.to_string(), "cold tier: unavailable");
    }

    #[test]
    fn test_error_tier_attribution() {
        let err = Error::AllTiersFailed {
            session_id: "s1".into(),
            last: TierError::unavailable(TierKind::Cold),
        };
        assert_eq!(err.tier(), Some(TierKind::Cold));
        assert_eq!(Error::MigrationInProgress.tier(), None);
    }
}
