//! Application-layer error model.
//!
//! Three kinds of failure live here, and they must not blur together:
//! uniqueness **conflicts** (a domain fact, detected against other
//! aggregates), **concurrency** failures (retryable, the stream moved under
//! us), and plain **storage** failures.

use thiserror::Error;

use keyfort_core::{TenantId, UserId};
use keyfort_identity::{Identifier, UserError};

/// A violated uniqueness invariant, detected by comparing a candidate value
/// against existing persisted aggregates.
///
/// Each variant carries the tenant, the conflicting value, the entity that
/// already holds it and the entity that attempted to claim it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    #[error("unique name '{unique_name}' is already used by user {conflict_id}")]
    UniqueNameAlreadyUsed {
        tenant_id: Option<TenantId>,
        unique_name: String,
        conflict_id: UserId,
        acting_id: UserId,
    },

    #[error("email address '{email_address}' is already used by user {conflict_id}")]
    EmailAddressAlreadyUsed {
        tenant_id: Option<TenantId>,
        email_address: String,
        conflict_id: UserId,
        acting_id: UserId,
    },

    #[error("custom identifier {key}={value} is already used by user {conflict_id}")]
    CustomIdentifierAlreadyUsed {
        tenant_id: Option<TenantId>,
        key: Identifier,
        value: String,
        conflict_id: UserId,
        acting_id: UserId,
    },
}

/// Repository operation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// Optimistic concurrency check failed: the stream moved since the
    /// aggregate was loaded. Retryable, unlike a uniqueness conflict.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// Unique-constraint backstop violation surfaced by the store itself.
    /// The pre-commit checks are best-effort; the store has the last word.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Error surface of [`crate::UserManager`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    User(#[from] UserError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ManagerError {
    fn from(error: RepositoryError) -> Self {
        // A backstop conflict is the same domain fact as a pre-check
        // conflict; surface both through the one variant.
        match error {
            RepositoryError::Conflict(conflict) => Self::Conflict(conflict),
            other => Self::Repository(other),
        }
    }
}
