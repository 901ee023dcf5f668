//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (validation, invariants, conflicts).
/// Infrastructure failures (storage, concurrency) live in the application
/// layer's own error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation at construction (malformed or out of policy).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated by a behavior.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier could not be parsed or composed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A conflicting state was detected (e.g. stale version).
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
}
