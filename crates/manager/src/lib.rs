//! `keyfort-manager` — application layer above the identity aggregates.
//!
//! Event-sourced writes are optimistic; nothing in a single aggregate stream
//! can guarantee that a unique name, email address or custom identifier is
//! not already taken by *another* aggregate. The [`UserManager`] closes that
//! gap: before persisting a user it classifies the pending events, runs the
//! conflict checks they call for against the repositories, and cascades
//! session deletion when the user is being deleted.

pub mod error;
pub mod manager;
pub mod memory;
pub mod repository;

pub use error::{ConflictError, ManagerError, RepositoryError};
pub use manager::{FoundUsers, UserManager};
pub use memory::{EventLog, InMemorySessionRepository, InMemoryUserRepository};
pub use repository::{SessionRepository, UserRepository};
