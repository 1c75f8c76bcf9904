//! Error types for a grading run.

use crate::units::Millis;

/// The target could not be retrieved. Aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("timed out after {0}")]
    Timeout(Millis),

    #[error("response exceeds {limit} byte cap")]
    TooLarge { limit: u64 },

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("forbidden destination: {0}")]
    Forbidden(String),
}

/// Settings that cannot produce a valid run. Detected before any network I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("weights sum to {sum}, expected 1.0")]
    WeightSum { sum: f64 },

    #[error("weight for {factor} is {weight}, expected a value in [0, 1]")]
    WeightRange { factor: String, weight: f64 },

    #[error("max_redirects is {0}, at most 5 allowed")]
    RedirectLimit(usize),

    #[error("invalid setting: {0}")]
    Invalid(String),

    #[error("config source error: {0}")]
    Source(#[from] config::ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("grading run cancelled")]
    Cancelled,
}

pub type GradeResult<T> = Result<T, GradeError>;
