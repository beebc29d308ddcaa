//! Failures raised by the pure domain layer.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic rule violations. Anything touching I/O is reported by the
/// infrastructure layer instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Caller-supplied data was rejected.
    #[error("validation failed: {0}")]
    Validation(String),

    /// State the domain itself should never produce, e.g. totals that do not
    /// add up.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The named subject does not exist (or has not been created yet).
    #[error("{0} not found")]
    NotFound(String),

    /// Stale version or a duplicate create.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(subject: impl Into<String>) -> Self {
        Self::NotFound(subject.into())
    }
}
