//! Session aggregate.
//!
//! Sessions are produced by [`crate::User::sign_in`] and live in their own
//! event stream. Only their contract with the user matters here: creation
//! time, owning user, optional secret, and an idempotent `delete` used by
//! the deletion cascade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keyfort_core::{AggregateRoot, DomainError, EventSourced, SessionId, UserId};
use keyfort_events::Event;

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub secret: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDeleted {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    Created(SessionCreated),
    Deleted(SessionDeleted),
}

impl Event for SessionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Created(_) => "identity.session.created",
            SessionEvent::Deleted(_) => "identity.session.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::Created(e) => e.occurred_at,
            SessionEvent::Deleted(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    user_id: UserId,
    secret: Option<String>,
    created_on: DateTime<Utc>,
    is_deleted: bool,
    version: u64,
    uncommitted: Vec<SessionEvent>,
}

impl Session {
    /// Construct a new session owned by `user_id`.
    ///
    /// Only [`crate::User::sign_in`] calls this; it guarantees the session
    /// id's tenant matches the user's.
    pub(crate) fn new(user_id: UserId, secret: Option<String>, id: Option<SessionId>) -> Self {
        let id = id.unwrap_or_else(|| SessionId::new(user_id.tenant_id().cloned()));
        let event = SessionCreated {
            session_id: id.clone(),
            user_id: user_id.clone(),
            secret: secret.clone(),
            occurred_at: Utc::now(),
        };
        let mut session = Self::seed(&event);
        session.version = 1;
        session.uncommitted.push(SessionEvent::Created(event));
        session
    }

    /// Rebuild a session from its event history.
    ///
    /// The first event must be the creation event.
    pub fn replay(events: impl IntoIterator<Item = SessionEvent>) -> Result<Self, DomainError> {
        let mut events = events.into_iter();
        let seed_event = match events.next() {
            Some(SessionEvent::Created(e)) => e,
            Some(other) => {
                return Err(DomainError::invariant(format!(
                    "session stream must start with a creation event, got {}",
                    other.event_type()
                )));
            }
            None => return Err(DomainError::invariant("session stream is empty")),
        };
        let mut session = Self::seed(&seed_event);
        session.version = 1;
        for event in events {
            session.apply(&event);
        }
        Ok(session)
    }

    fn seed(e: &SessionCreated) -> Self {
        Self {
            id: e.session_id.clone(),
            user_id: e.user_id.clone(),
            secret: e.secret.clone(),
            created_on: e.occurred_at,
            is_deleted: false,
            version: 0,
            uncommitted: Vec::new(),
        }
    }

    fn raise(&mut self, event: SessionEvent) {
        self.apply(&event);
        self.uncommitted.push(event);
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Mark the session deleted. No-op when already deleted.
    pub fn delete(&mut self) {
        if self.is_deleted {
            return;
        }
        self.raise(SessionEvent::Deleted(SessionDeleted {
            occurred_at: Utc::now(),
        }));
    }
}

impl AggregateRoot for Session {
    type Id = SessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl EventSourced for Session {
    type Event = SessionEvent;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SessionEvent::Created(e) => {
                self.id = e.session_id.clone();
                self.user_id = e.user_id.clone();
                self.secret = e.secret.clone();
                self.created_on = e.occurred_at;
                self.is_deleted = false;
            }
            SessionEvent::Deleted(_) => {
                self.is_deleted = true;
            }
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted
    }

    fn mark_committed(&mut self) {
        self.uncommitted.clear();
    }
}
