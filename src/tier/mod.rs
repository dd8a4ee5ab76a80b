//! Live state of the Hot, Warm and Cold tiers.
//!
//! The [`TierRegistry`] is the single mutation point for tier usage and
//! health. Each tier entry sits behind its own lock, so concurrent writers
//! touching different tiers never contend.
//!
//! [`TierHealthChecker`] grades a tier from its registry entry for the
//! status surface.

mod health;
mod registry;

pub use health::{HealthCheckConfig, HealthStatus, TierHealthChecker, TierHealthReport};
pub use registry::{DataLayer, TierRegistry};
