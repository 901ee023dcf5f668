//! Repository contracts consumed by the manager.
//!
//! All loads are tenant-scoped by construction: the tenant is always an
//! explicit parameter (or part of the stream key), never inferred. Loading
//! and persisting are the only operations in this workspace that perform
//! I/O; everything on the aggregates themselves is pure computation.

use async_trait::async_trait;

use keyfort_core::{TenantId, UserId};
use keyfort_identity::{CustomIdentifier, Email, Identifier, Role, Session, UniqueName, User};

use crate::error::RepositoryError;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Load one user by stream key, optionally at a past version.
    ///
    /// Deleted users are invisible unless `include_deleted` is set.
    async fn load_by_id(
        &self,
        id: &UserId,
        version: Option<u64>,
        include_deleted: bool,
    ) -> Result<Option<User>, RepositoryError>;

    /// Load the user holding `unique_name` in the given tenant, if any.
    async fn load_by_unique_name(
        &self,
        tenant_id: Option<&TenantId>,
        unique_name: &UniqueName,
    ) -> Result<Option<User>, RepositoryError>;

    /// Load every user carrying `email` in the given tenant. Multiple hits
    /// are legal when the tenant does not require unique emails.
    async fn load_by_email(
        &self,
        tenant_id: Option<&TenantId>,
        email: &Email,
    ) -> Result<Vec<User>, RepositoryError>;

    /// Load the user holding the `(key, value)` custom identifier pair in
    /// the given tenant, if any.
    async fn load_by_custom_identifier(
        &self,
        tenant_id: Option<&TenantId>,
        key: &Identifier,
        value: &CustomIdentifier,
    ) -> Result<Option<User>, RepositoryError>;

    /// Load every user referencing `role`.
    async fn load_by_role(&self, role: &Role) -> Result<Vec<User>, RepositoryError>;

    /// Persist the user's uncommitted events and clear them.
    async fn save(&self, user: &mut User) -> Result<(), RepositoryError>;

    /// Persist several users. Not atomic across users.
    async fn save_all(&self, users: &mut [User]) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Load the non-deleted sessions owned by `user_id`.
    async fn load_active_by_user(&self, user_id: &UserId) -> Result<Vec<Session>, RepositoryError>;

    /// Persist the sessions' uncommitted events and clear them.
    async fn save_all(&self, sessions: &mut [Session]) -> Result<(), RepositoryError>;
}

#[async_trait]
impl<T> UserRepository for std::sync::Arc<T>
where
    T: UserRepository + ?Sized,
{
    async fn load_by_id(
        &self,
        id: &UserId,
        version: Option<u64>,
        include_deleted: bool,
    ) -> Result<Option<User>, RepositoryError> {
        (**self).load_by_id(id, version, include_deleted).await
    }

    async fn load_by_unique_name(
        &self,
        tenant_id: Option<&TenantId>,
        unique_name: &UniqueName,
    ) -> Result<Option<User>, RepositoryError> {
        (**self).load_by_unique_name(tenant_id, unique_name).await
    }

    async fn load_by_email(
        &self,
        tenant_id: Option<&TenantId>,
        email: &Email,
    ) -> Result<Vec<User>, RepositoryError> {
        (**self).load_by_email(tenant_id, email).await
    }

    async fn load_by_custom_identifier(
        &self,
        tenant_id: Option<&TenantId>,
        key: &Identifier,
        value: &CustomIdentifier,
    ) -> Result<Option<User>, RepositoryError> {
        (**self).load_by_custom_identifier(tenant_id, key, value).await
    }

    async fn load_by_role(&self, role: &Role) -> Result<Vec<User>, RepositoryError> {
        (**self).load_by_role(role).await
    }

    async fn save(&self, user: &mut User) -> Result<(), RepositoryError> {
        (**self).save(user).await
    }

    async fn save_all(&self, users: &mut [User]) -> Result<(), RepositoryError> {
        (**self).save_all(users).await
    }
}

#[async_trait]
impl<T> SessionRepository for std::sync::Arc<T>
where
    T: SessionRepository + ?Sized,
{
    async fn load_active_by_user(&self, user_id: &UserId) -> Result<Vec<Session>, RepositoryError> {
        (**self).load_active_by_user(user_id).await
    }

    async fn save_all(&self, sessions: &mut [Session]) -> Result<(), RepositoryError> {
        (**self).save_all(sessions).await
    }
}
