//! In-memory repositories.
//!
//! Intended for tests/dev. Not optimized for performance: every lookup
//! replays the stored event streams. The user repository re-verifies its
//! unique indexes on save, playing the role the real store's unique
//! constraints play as the backstop behind the manager's pre-commit checks.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use keyfort_core::{AggregateRoot, EventSourced, ExpectedVersion, TenantId, UserId};
use keyfort_events::{Event, EventEnvelope};
use keyfort_identity::{
    CustomIdentifier, Email, Identifier, Role, Session, SessionEvent, UniqueName, User, UserEvent,
};

use crate::error::{ConflictError, RepositoryError};
use crate::repository::{SessionRepository, UserRepository};

const USER_AGGREGATE_TYPE: &str = "identity.user";
const SESSION_AGGREGATE_TYPE: &str = "identity.session";

fn poisoned() -> RepositoryError {
    RepositoryError::Storage("lock poisoned".to_string())
}

/// Append-only journal of envelopes, shared between repositories so tests
/// can observe durable append order across aggregates.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: RwLock<Vec<EventEnvelope<serde_json::Value>>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn append<E>(
        &self,
        tenant_id: Option<TenantId>,
        aggregate_id: &str,
        aggregate_type: &str,
        sequence_number: u64,
        event: &E,
    ) -> Result<(), RepositoryError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| RepositoryError::Storage(format!("payload serialization failed: {e}")))?;
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type,
            sequence_number,
            payload,
        );
        self.entries.write().map_err(|_| poisoned())?.push(envelope);
        Ok(())
    }

    /// Snapshot of the journal in append order.
    pub fn entries(&self) -> Vec<EventEnvelope<serde_json::Value>> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct InMemoryUserRepository {
    streams: RwLock<HashMap<String, Vec<UserEvent>>>,
    log: Arc<EventLog>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::with_log(EventLog::new())
    }

    pub fn with_log(log: Arc<EventLog>) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            log,
        }
    }

    pub fn log(&self) -> Arc<EventLog> {
        Arc::clone(&self.log)
    }

    fn rehydrate(events: &[UserEvent], version: Option<u64>) -> Result<User, RepositoryError> {
        let events = match version {
            Some(v) => events.iter().take(v as usize).cloned().collect::<Vec<_>>(),
            None => events.to_vec(),
        };
        User::replay(events).map_err(|e| RepositoryError::Storage(format!("corrupt user stream: {e}")))
    }

    /// Unique-index backstop: the pre-commit checks upstream are
    /// check-then-act, so the store re-verifies before appending.
    fn ensure_unique(
        streams: &HashMap<String, Vec<UserEvent>>,
        user: &User,
    ) -> Result<(), RepositoryError> {
        if user.is_deleted() {
            return Ok(());
        }
        let own_key = user.id().to_string();
        for (key, events) in streams {
            if *key == own_key {
                continue;
            }
            let other = Self::rehydrate(events, None)?;
            if other.is_deleted() || other.tenant_id() != user.tenant_id() {
                continue;
            }
            if other.unique_name() == user.unique_name() {
                return Err(ConflictError::UniqueNameAlreadyUsed {
                    tenant_id: user.tenant_id().cloned(),
                    unique_name: user.unique_name().as_str().to_string(),
                    conflict_id: other.id().clone(),
                    acting_id: user.id().clone(),
                }
                .into());
            }
            for (k, v) in user.custom_identifiers() {
                if other.custom_identifiers().get(k) == Some(v) {
                    return Err(ConflictError::CustomIdentifierAlreadyUsed {
                        tenant_id: user.tenant_id().cloned(),
                        key: k.clone(),
                        value: v.as_str().to_string(),
                        conflict_id: other.id().clone(),
                        acting_id: user.id().clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn load_by_id(
        &self,
        id: &UserId,
        version: Option<u64>,
        include_deleted: bool,
    ) -> Result<Option<User>, RepositoryError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        let Some(events) = streams.get(&id.to_string()) else {
            return Ok(None);
        };
        let user = Self::rehydrate(events, version)?;
        if user.is_deleted() && !include_deleted {
            return Ok(None);
        }
        Ok(Some(user))
    }

    async fn load_by_unique_name(
        &self,
        tenant_id: Option<&TenantId>,
        unique_name: &UniqueName,
    ) -> Result<Option<User>, RepositoryError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        for events in streams.values() {
            let user = Self::rehydrate(events, None)?;
            if !user.is_deleted()
                && user.tenant_id() == tenant_id
                && user.unique_name() == unique_name
            {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }

    async fn load_by_email(
        &self,
        tenant_id: Option<&TenantId>,
        email: &Email,
    ) -> Result<Vec<User>, RepositoryError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        let mut users = Vec::new();
        for events in streams.values() {
            let user = Self::rehydrate(events, None)?;
            let matches = user
                .email()
                .is_some_and(|e| e.address().eq_ignore_ascii_case(email.address()));
            if !user.is_deleted() && user.tenant_id() == tenant_id && matches {
                users.push(user);
            }
        }
        Ok(users)
    }

    async fn load_by_custom_identifier(
        &self,
        tenant_id: Option<&TenantId>,
        key: &Identifier,
        value: &CustomIdentifier,
    ) -> Result<Option<User>, RepositoryError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        for events in streams.values() {
            let user = Self::rehydrate(events, None)?;
            if !user.is_deleted()
                && user.tenant_id() == tenant_id
                && user.custom_identifiers().get(key) == Some(value)
            {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }

    async fn load_by_role(&self, role: &Role) -> Result<Vec<User>, RepositoryError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        let mut users = Vec::new();
        for events in streams.values() {
            let user = Self::rehydrate(events, None)?;
            if !user.is_deleted() && user.roles().contains(role.id()) {
                users.push(user);
            }
        }
        Ok(users)
    }

    async fn save(&self, user: &mut User) -> Result<(), RepositoryError> {
        let uncommitted = user.uncommitted_events().to_vec();
        if uncommitted.is_empty() {
            return Ok(());
        }
        let key = user.id().to_string();
        let mut streams = self.streams.write().map_err(|_| poisoned())?;
        let current = streams.get(&key).map_or(0, |s| s.len() as u64);
        let expected = ExpectedVersion::Exact(user.version() - uncommitted.len() as u64);
        if !expected.matches(current) {
            return Err(RepositoryError::Concurrency(format!(
                "stream {key}: expected {expected:?}, found {current}"
            )));
        }
        Self::ensure_unique(&streams, user)?;
        for (offset, event) in uncommitted.iter().enumerate() {
            self.log.append(
                user.tenant_id().cloned(),
                &key,
                USER_AGGREGATE_TYPE,
                current + 1 + offset as u64,
                event,
            )?;
        }
        streams.entry(key).or_default().extend(uncommitted);
        user.mark_committed();
        Ok(())
    }

    async fn save_all(&self, users: &mut [User]) -> Result<(), RepositoryError> {
        for user in users {
            self.save(user).await?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct InMemorySessionRepository {
    streams: RwLock<HashMap<String, Vec<SessionEvent>>>,
    log: Arc<EventLog>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::with_log(EventLog::new())
    }

    pub fn with_log(log: Arc<EventLog>) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            log,
        }
    }

    fn rehydrate(events: &[SessionEvent]) -> Result<Session, RepositoryError> {
        Session::replay(events.to_vec())
            .map_err(|e| RepositoryError::Storage(format!("corrupt session stream: {e}")))
    }

    fn save_one(&self, session: &mut Session) -> Result<(), RepositoryError> {
        let uncommitted = session.uncommitted_events().to_vec();
        if uncommitted.is_empty() {
            return Ok(());
        }
        let key = session.id().to_string();
        let mut streams = self.streams.write().map_err(|_| poisoned())?;
        let current = streams.get(&key).map_or(0, |s| s.len() as u64);
        let expected = ExpectedVersion::Exact(session.version() - uncommitted.len() as u64);
        if !expected.matches(current) {
            return Err(RepositoryError::Concurrency(format!(
                "stream {key}: expected {expected:?}, found {current}"
            )));
        }
        for (offset, event) in uncommitted.iter().enumerate() {
            self.log.append(
                session.id().tenant_id().cloned(),
                &key,
                SESSION_AGGREGATE_TYPE,
                current + 1 + offset as u64,
                event,
            )?;
        }
        streams.entry(key).or_default().extend(uncommitted);
        session.mark_committed();
        Ok(())
    }
}

impl Default for InMemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn load_active_by_user(&self, user_id: &UserId) -> Result<Vec<Session>, RepositoryError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        let mut sessions = Vec::new();
        for events in streams.values() {
            let session = Self::rehydrate(events)?;
            if !session.is_deleted() && session.user_id() == user_id {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    async fn save_all(&self, sessions: &mut [Session]) -> Result<(), RepositoryError> {
        for session in sessions {
            self.save_one(session)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyfort_identity::UniqueNameSettings;

    fn unique_name(value: &str) -> UniqueName {
        UniqueName::try_new(value, &UniqueNameSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn save_then_load_round_trips_the_aggregate() {
        let repo = InMemoryUserRepository::new();
        let tenant_id = TenantId::new();
        let mut user = User::create(UserId::new(Some(tenant_id.clone())), unique_name("alice"));
        user.set_email(Some(Email::try_new("alice@example.com", true).unwrap()));
        repo.save(&mut user).await.unwrap();
        assert!(!user.has_uncommitted_events());

        let loaded = repo.load_by_id(user.id(), None, false).await.unwrap().unwrap();
        assert_eq!(loaded.unique_name(), user.unique_name());
        assert!(loaded.is_confirmed());

        let by_name = repo
            .load_by_unique_name(Some(&tenant_id), &unique_name("alice"))
            .await
            .unwrap();
        assert_eq!(by_name.unwrap().id(), user.id());
    }

    #[tokio::test]
    async fn load_by_id_honors_version_and_deletion_visibility() {
        let repo = InMemoryUserRepository::new();
        let mut user = User::create(UserId::new(None), unique_name("alice"));
        user.disable();
        user.delete();
        repo.save(&mut user).await.unwrap();

        assert!(repo.load_by_id(user.id(), None, false).await.unwrap().is_none());

        let deleted = repo.load_by_id(user.id(), None, true).await.unwrap().unwrap();
        assert!(deleted.is_deleted());

        // At version 2 the user existed, disabled but not yet deleted.
        let past = repo.load_by_id(user.id(), Some(2), true).await.unwrap().unwrap();
        assert!(past.is_disabled());
        assert!(!past.is_deleted());
    }

    #[tokio::test]
    async fn stale_aggregates_are_rejected_with_a_concurrency_error() {
        let repo = InMemoryUserRepository::new();
        let mut user = User::create(UserId::new(None), unique_name("alice"));
        repo.save(&mut user).await.unwrap();

        let mut first = repo.load_by_id(user.id(), None, false).await.unwrap().unwrap();
        let mut second = repo.load_by_id(user.id(), None, false).await.unwrap().unwrap();

        first.disable();
        repo.save(&mut first).await.unwrap();

        second.disable();
        let err = repo.save(&mut second).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Concurrency(_)));
    }

    #[tokio::test]
    async fn unique_index_backstop_rejects_a_duplicate_name() {
        let repo = InMemoryUserRepository::new();
        let tenant_id = TenantId::new();
        let mut alice = User::create(UserId::new(Some(tenant_id.clone())), unique_name("alice"));
        repo.save(&mut alice).await.unwrap();

        // Straight to the repository, skipping the manager's pre-checks.
        let mut impostor = User::create(UserId::new(Some(tenant_id)), unique_name("alice"));
        let err = repo.save(&mut impostor).await.unwrap_err();
        match err {
            RepositoryError::Conflict(ConflictError::UniqueNameAlreadyUsed {
                conflict_id,
                acting_id,
                ..
            }) => {
                assert_eq!(&conflict_id, alice.id());
                assert_eq!(&acting_id, impostor.id());
            }
            other => panic!("expected unique-name conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn load_by_role_returns_the_referencing_users() {
        let repo = InMemoryUserRepository::new();
        let tenant_id = TenantId::new();
        let role = Role::new(
            keyfort_core::RoleId::new(Some(tenant_id.clone())),
            unique_name("admin"),
        )
        .with_display_name(keyfort_identity::DisplayName::try_new("Administrator").unwrap());

        let mut alice = User::create(UserId::new(Some(tenant_id.clone())), unique_name("alice"));
        alice.add_role(&role).unwrap();
        let mut bob = User::create(UserId::new(Some(tenant_id)), unique_name("bob"));
        repo.save(&mut alice).await.unwrap();
        repo.save(&mut bob).await.unwrap();

        let admins = repo.load_by_role(&role).await.unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].id(), alice.id());
    }

    #[tokio::test]
    async fn session_repository_tracks_active_sessions() {
        let repo = InMemorySessionRepository::new();
        let mut user = User::create(UserId::new(Some(TenantId::new())), unique_name("alice"));
        let mut sessions = vec![
            user.sign_in(None, None, None).unwrap(),
            user.sign_in(None, None, None).unwrap(),
        ];
        repo.save_all(&mut sessions).await.unwrap();
        assert_eq!(repo.load_active_by_user(user.id()).await.unwrap().len(), 2);

        sessions[0].delete();
        repo.save_all(&mut sessions).await.unwrap();
        assert_eq!(repo.load_active_by_user(user.id()).await.unwrap().len(), 1);
    }
}
