//! Error taxonomy for the filtering pipeline.
//!
//! Callers need to tell apart four failure classes: bad input (abort the
//! run), an embedding provider failure (retry or accept degraded scores),
//! a persistence failure (retry — partial novelty state would mislead),
//! and precondition violations (programmer error). Item-level defects are
//! not errors at all; the pipeline drops those items and logs them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RadarError {
    /// The whole run is rejected: empty context, no items.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The embedding provider failed in a way that cannot be degraded
    /// per item (e.g. the baseline embedding itself).
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// A novelty backend load or save failed. Propagated as a run-level
    /// error: silently continuing with partial novelty state would make
    /// stale items look new.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// API misuse, e.g. similarity requested before a baseline was set.
    #[error("precondition violated: {0}")]
    Precondition(&'static str),
}

impl RadarError {
    pub fn provider(err: impl std::fmt::Display) -> Self {
        RadarError::Provider(err.to_string())
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        RadarError::Persistence(err.to_string())
    }
}

pub type Result<T, E = RadarError> = std::result::Result<T, E>;
