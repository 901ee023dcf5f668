//! The user save/find protocol.

use tracing::{debug, instrument};

use keyfort_core::{AggregateRoot, EntityId, EventSourced, TenantId, UserId};
use keyfort_identity::{
    CustomIdentifier, Email, Identifier, UniqueName, User, UserEvent, UserSettings,
};

use crate::error::{ConflictError, ManagerError};
use crate::repository::{SessionRepository, UserRepository};

/// Invariant enforcer above the [`User`] aggregate and its repositories.
///
/// Saving inspects the aggregate's pending events to decide which
/// existence checks are needed, runs them all before any persistence, and
/// cascades session deletion ahead of a user deletion. The protocol is
/// check-then-act: a concurrent writer can pass the same checks, so the
/// repository's unique constraint stays the authoritative backstop and
/// surfaces the same conflict error shape.
pub struct UserManager<U, S> {
    users: U,
    sessions: S,
    settings: UserSettings,
}

impl<U, S> UserManager<U, S>
where
    U: UserRepository,
    S: SessionRepository,
{
    pub fn new(users: U, sessions: S, settings: UserSettings) -> Self {
        Self {
            users,
            sessions,
            settings,
        }
    }

    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    #[instrument(skip_all, fields(user = %user.id()))]
    pub async fn save(&self, user: &mut User) -> Result<(), ManagerError> {
        let mut unique_name_changed = false;
        let mut email_changed = false;
        let mut custom_identifier_changes: Vec<(Identifier, CustomIdentifier)> = Vec::new();
        let mut deleted = false;
        for event in user.uncommitted_events() {
            match event {
                // Creation claims the initial unique name.
                UserEvent::Created(_) | UserEvent::UniqueNameChanged(_) => {
                    unique_name_changed = true;
                }
                UserEvent::EmailChanged(_) => email_changed = true,
                UserEvent::CustomIdentifierSet(e) => {
                    custom_identifier_changes.push((e.key.clone(), e.value.clone()));
                }
                UserEvent::Deleted(_) => deleted = true,
                _ => {}
            }
        }

        // Every check resolves before anything is persisted; aborting here
        // leaves the aggregate untouched.
        if unique_name_changed {
            if let Some(conflict) = self
                .users
                .load_by_unique_name(user.tenant_id(), user.unique_name())
                .await?
            {
                if conflict.id() != user.id() {
                    debug!(conflict = %conflict.id(), "unique name already used");
                    return Err(ConflictError::UniqueNameAlreadyUsed {
                        tenant_id: user.tenant_id().cloned(),
                        unique_name: user.unique_name().as_str().to_string(),
                        conflict_id: conflict.id().clone(),
                        acting_id: user.id().clone(),
                    }
                    .into());
                }
            }
        }

        if email_changed && self.settings.require_unique_email {
            if let Some(email) = user.email() {
                let conflicts = self.users.load_by_email(user.tenant_id(), email).await?;
                if let Some(conflict) = conflicts.iter().find(|c| c.id() != user.id()) {
                    debug!(conflict = %conflict.id(), "email address already used");
                    return Err(ConflictError::EmailAddressAlreadyUsed {
                        tenant_id: user.tenant_id().cloned(),
                        email_address: email.address().to_string(),
                        conflict_id: conflict.id().clone(),
                        acting_id: user.id().clone(),
                    }
                    .into());
                }
            }
        }

        // Per changed key: one save may touch several custom identifiers,
        // each independently unique.
        for (key, value) in &custom_identifier_changes {
            if let Some(conflict) = self
                .users
                .load_by_custom_identifier(user.tenant_id(), key, value)
                .await?
            {
                if conflict.id() != user.id() {
                    debug!(conflict = %conflict.id(), key = %key, "custom identifier already used");
                    return Err(ConflictError::CustomIdentifierAlreadyUsed {
                        tenant_id: user.tenant_id().cloned(),
                        key: key.clone(),
                        value: value.as_str().to_string(),
                        conflict_id: conflict.id().clone(),
                        acting_id: user.id().clone(),
                    }
                    .into());
                }
            }
        }

        if deleted {
            // The cascade must be durable before the user's own deletion is,
            // or a crash in between leaves active sessions behind for a
            // deleted user.
            let mut sessions = self.sessions.load_active_by_user(user.id()).await?;
            for session in &mut sessions {
                session.delete();
            }
            self.sessions.save_all(&mut sessions).await?;
            debug!(count = sessions.len(), "cascaded session deletion");
        }

        self.users.save(user).await?;
        Ok(())
    }

    /// Best-effort lookup: `id` is simultaneously interpreted as an entity
    /// id, a unique name and — only when the tenant enforces unique emails —
    /// an email address. Callers disambiguate between the matches.
    #[instrument(skip(self))]
    pub async fn find(
        &self,
        tenant_id: Option<&TenantId>,
        id: &str,
    ) -> Result<FoundUsers, ManagerError> {
        let mut found = FoundUsers::default();
        if let Ok(entity_id) = EntityId::try_new(id) {
            let user_id = UserId::from_parts(tenant_id.cloned(), entity_id);
            found.by_id = self.users.load_by_id(&user_id, None, false).await?;
        }
        if let Ok(unique_name) = UniqueName::try_new(id, &self.settings.unique_name) {
            found.by_unique_name = self
                .users
                .load_by_unique_name(tenant_id, &unique_name)
                .await?;
        }
        if self.settings.require_unique_email {
            if let Ok(email) = Email::try_new(id, false) {
                found.by_email = self
                    .users
                    .load_by_email(tenant_id, &email)
                    .await?
                    .into_iter()
                    .next();
            }
        }
        Ok(found)
    }
}

/// Matches of one [`UserManager::find`] call, one slot per interpretation
/// of the input string.
#[derive(Debug, Default)]
pub struct FoundUsers {
    pub by_id: Option<User>,
    pub by_unique_name: Option<User>,
    pub by_email: Option<User>,
}

impl FoundUsers {
    pub fn count(&self) -> usize {
        [&self.by_id, &self.by_unique_name, &self.by_email]
            .into_iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// The first match, in id → unique name → email order.
    pub fn into_first(self) -> Option<User> {
        self.by_id.or(self.by_unique_name).or(self.by_email)
    }
}
