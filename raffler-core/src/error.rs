//! Core error types for `raffler`
//!
//! Validation errors raised before an entity is ever persisted.

use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Validation Errors
// ============================================================================

/// Rejection reasons for entity creation parameters.
///
/// A `ValidationError` always means nothing was written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `winner_count` must be at least 1
    #[error("winner count must be at least 1")]
    ZeroWinners,

    /// The entity would end before (or exactly when) it starts
    #[error("end time {end} must be after start time {start}")]
    NonPositiveDuration {
        /// Requested start time
        start: DateTime<Utc>,
        /// Requested end time
        end: DateTime<Utc>,
    },

    /// A competition needs at least one phase
    #[error("total phases must be at least 1")]
    ZeroPhases,

    /// The chain is longer than the configured phase table supports
    #[error("{requested} phases requested but only {max} are configured")]
    TooManyPhases {
        /// Phases requested by the caller
        requested: u32,
        /// Phases the chain configuration can drive
        max: u32,
    },
}
