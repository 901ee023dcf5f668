//! User aggregate (event-sourced).
//!
//! The aggregate owns identity attributes, credentials, contact information,
//! role membership and custom attributes/identifiers. Behaviors validate
//! their preconditions, then raise events; replay of those events is the
//! single source of truth for rebuilding state.
//!
//! Structural changes (unique name, contacts, password, roles, custom
//! identifiers, lifecycle) each raise their own event. The many
//! independently-optional scalar attributes instead stage tri-state deltas
//! into a pending buffer that [`User::update`] flushes as one batched event.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keyfort_core::{AggregateRoot, DomainError, EventSourced, RoleId, SessionId, TenantId, UserId};
use keyfort_events::{Change, Event};

use crate::contact::{Address, Contact, Email, Phone};
use crate::password::Password;
use crate::role::Role;
use crate::session::Session;
use crate::values::{
    CustomIdentifier, Gender, Identifier, Locale, PersonName, TimeZone, UniqueName, WebUrl,
};

// ─────────────────────────────────────────────────────────────────────────────
// Error
// ─────────────────────────────────────────────────────────────────────────────

/// User aggregate error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// Password-gated behavior invoked on a disabled user.
    #[error("user {user_id} is disabled")]
    UserIsDisabled { user_id: UserId },

    /// Password-gated behavior invoked on a user with no password set.
    #[error("user {user_id} has no password")]
    UserHasNoPassword { user_id: UserId },

    /// Supplied plaintext did not match the user's password. The attempted
    /// plaintext is carried for auditing; it must never be logged in clear.
    #[error("incorrect password for user {user_id}")]
    IncorrectPassword {
        user_id: UserId,
        attempted_password: String,
    },

    /// Cross-tenant association attempted.
    #[error("tenant mismatch (expected {expected:?}, actual {actual:?})")]
    TenantMismatch {
        expected: Option<TenantId>,
        actual: Option<TenantId>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Event originating a user. Always the first event of a user stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: UserId,
    pub unique_name: UniqueName,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUniqueNameChanged {
    pub unique_name: UniqueName,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEmailChanged {
    pub email: Option<Email>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPhoneChanged {
    pub phone: Option<Phone>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAddressChanged {
    pub address: Option<Address>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPasswordChanged {
    pub password: Password,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAuthenticated {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSignedIn {
    pub session_id: SessionId,
    /// Creation time of the session this sign-in produced.
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDisabled {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEnabled {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleAdded {
    pub role_id: RoleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleRemoved {
    pub role_id: RoleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCustomIdentifierSet {
    pub key: Identifier,
    pub value: CustomIdentifier,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCustomIdentifierRemoved {
    pub key: Identifier,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    pub occurred_at: DateTime<Utc>,
}

/// Batched update event: one tri-state delta per scalar attribute.
///
/// A field left [`Change::Unchanged`] is untouched by replay; a
/// `Change::Changed(None)` clears it. Custom-attribute deltas map a key to
/// `Some(value)` (set) or `None` (removed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdated {
    pub first_name: Change<PersonName>,
    pub middle_name: Change<PersonName>,
    pub last_name: Change<PersonName>,
    pub nickname: Change<PersonName>,
    /// Derived from first/middle/last; recomputed whenever one of them
    /// changes.
    pub full_name: Change<String>,
    pub birthdate: Change<DateTime<Utc>>,
    pub gender: Change<Gender>,
    pub locale: Change<Locale>,
    pub time_zone: Change<TimeZone>,
    pub picture: Change<WebUrl>,
    pub profile: Change<WebUrl>,
    pub website: Change<WebUrl>,
    pub custom_attributes: BTreeMap<Identifier, Option<String>>,
    pub occurred_at: DateTime<Utc>,
}

impl Default for UserUpdated {
    fn default() -> Self {
        Self {
            first_name: Change::Unchanged,
            middle_name: Change::Unchanged,
            last_name: Change::Unchanged,
            nickname: Change::Unchanged,
            full_name: Change::Unchanged,
            birthdate: Change::Unchanged,
            gender: Change::Unchanged,
            locale: Change::Unchanged,
            time_zone: Change::Unchanged,
            picture: Change::Unchanged,
            profile: Change::Unchanged,
            website: Change::Unchanged,
            custom_attributes: BTreeMap::new(),
            occurred_at: DateTime::<Utc>::MIN_UTC,
        }
    }
}

impl UserUpdated {
    pub fn has_changes(&self) -> bool {
        self.first_name.is_changed()
            || self.middle_name.is_changed()
            || self.last_name.is_changed()
            || self.nickname.is_changed()
            || self.full_name.is_changed()
            || self.birthdate.is_changed()
            || self.gender.is_changed()
            || self.locale.is_changed()
            || self.time_zone.is_changed()
            || self.picture.is_changed()
            || self.profile.is_changed()
            || self.website.is_changed()
            || !self.custom_attributes.is_empty()
    }
}

/// All user events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    UniqueNameChanged(UserUniqueNameChanged),
    EmailChanged(UserEmailChanged),
    PhoneChanged(UserPhoneChanged),
    AddressChanged(UserAddressChanged),
    PasswordChanged(UserPasswordChanged),
    Authenticated(UserAuthenticated),
    SignedIn(UserSignedIn),
    Disabled(UserDisabled),
    Enabled(UserEnabled),
    RoleAdded(UserRoleAdded),
    RoleRemoved(UserRoleRemoved),
    CustomIdentifierSet(UserCustomIdentifierSet),
    CustomIdentifierRemoved(UserCustomIdentifierRemoved),
    Updated(UserUpdated),
    Deleted(UserDeleted),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "identity.user.created",
            UserEvent::UniqueNameChanged(_) => "identity.user.unique_name_changed",
            UserEvent::EmailChanged(_) => "identity.user.email_changed",
            UserEvent::PhoneChanged(_) => "identity.user.phone_changed",
            UserEvent::AddressChanged(_) => "identity.user.address_changed",
            UserEvent::PasswordChanged(_) => "identity.user.password_changed",
            UserEvent::Authenticated(_) => "identity.user.authenticated",
            UserEvent::SignedIn(_) => "identity.user.signed_in",
            UserEvent::Disabled(_) => "identity.user.disabled",
            UserEvent::Enabled(_) => "identity.user.enabled",
            UserEvent::RoleAdded(_) => "identity.user.role_added",
            UserEvent::RoleRemoved(_) => "identity.user.role_removed",
            UserEvent::CustomIdentifierSet(_) => "identity.user.custom_identifier_set",
            UserEvent::CustomIdentifierRemoved(_) => "identity.user.custom_identifier_removed",
            UserEvent::Updated(_) => "identity.user.updated",
            UserEvent::Deleted(_) => "identity.user.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::UniqueNameChanged(e) => e.occurred_at,
            UserEvent::EmailChanged(e) => e.occurred_at,
            UserEvent::PhoneChanged(e) => e.occurred_at,
            UserEvent::AddressChanged(e) => e.occurred_at,
            UserEvent::PasswordChanged(e) => e.occurred_at,
            UserEvent::Authenticated(e) => e.occurred_at,
            UserEvent::SignedIn(e) => e.occurred_at,
            UserEvent::Disabled(e) => e.occurred_at,
            UserEvent::Enabled(e) => e.occurred_at,
            UserEvent::RoleAdded(e) => e.occurred_at,
            UserEvent::RoleRemoved(e) => e.occurred_at,
            UserEvent::CustomIdentifierSet(e) => e.occurred_at,
            UserEvent::CustomIdentifierRemoved(e) => e.occurred_at,
            UserEvent::Updated(e) => e.occurred_at,
            UserEvent::Deleted(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    unique_name: UniqueName,
    password: Option<Password>,
    is_disabled: bool,
    address: Option<Address>,
    email: Option<Email>,
    phone: Option<Phone>,
    first_name: Option<PersonName>,
    middle_name: Option<PersonName>,
    last_name: Option<PersonName>,
    nickname: Option<PersonName>,
    full_name: Option<String>,
    birthdate: Option<DateTime<Utc>>,
    gender: Option<Gender>,
    locale: Option<Locale>,
    time_zone: Option<TimeZone>,
    picture: Option<WebUrl>,
    profile: Option<WebUrl>,
    website: Option<WebUrl>,
    authenticated_on: Option<DateTime<Utc>>,
    custom_attributes: BTreeMap<Identifier, String>,
    custom_identifiers: BTreeMap<Identifier, CustomIdentifier>,
    roles: BTreeSet<RoleId>,
    is_deleted: bool,
    version: u64,
    pending_update: UserUpdated,
    uncommitted: Vec<UserEvent>,
}

impl User {
    /// Originate a new user. The only way to bring a user into existence.
    pub fn create(id: UserId, unique_name: UniqueName) -> Self {
        let event = UserCreated {
            user_id: id,
            unique_name,
            occurred_at: Utc::now(),
        };
        let mut user = Self::seed(&event);
        user.version = 1;
        user.uncommitted.push(UserEvent::Created(event));
        user
    }

    /// Rebuild a user from its event history.
    ///
    /// The first event must be the creation event; replay applies the rest
    /// in order with no validation and no side effects.
    pub fn replay(events: impl IntoIterator<Item = UserEvent>) -> Result<Self, DomainError> {
        let mut events = events.into_iter();
        let seed_event = match events.next() {
            Some(UserEvent::Created(e)) => e,
            Some(other) => {
                return Err(DomainError::invariant(format!(
                    "user stream must start with a creation event, got {}",
                    other.event_type()
                )));
            }
            None => return Err(DomainError::invariant("user stream is empty")),
        };
        let mut user = Self::seed(&seed_event);
        user.version = 1;
        for event in events {
            user.apply(&event);
        }
        Ok(user)
    }

    fn seed(e: &UserCreated) -> Self {
        Self {
            id: e.user_id.clone(),
            unique_name: e.unique_name.clone(),
            password: None,
            is_disabled: false,
            address: None,
            email: None,
            phone: None,
            first_name: None,
            middle_name: None,
            last_name: None,
            nickname: None,
            full_name: None,
            birthdate: None,
            gender: None,
            locale: None,
            time_zone: None,
            picture: None,
            profile: None,
            website: None,
            authenticated_on: None,
            custom_attributes: BTreeMap::new(),
            custom_identifiers: BTreeMap::new(),
            roles: BTreeSet::new(),
            is_deleted: false,
            version: 0,
            pending_update: UserUpdated::default(),
            uncommitted: Vec::new(),
        }
    }

    fn raise(&mut self, event: UserEvent) {
        self.apply(&event);
        self.uncommitted.push(event);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.id.tenant_id()
    }

    pub fn unique_name(&self) -> &UniqueName {
        &self.unique_name
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn is_disabled(&self) -> bool {
        self.is_disabled
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn email(&self) -> Option<&Email> {
        self.email.as_ref()
    }

    pub fn phone(&self) -> Option<&Phone> {
        self.phone.as_ref()
    }

    /// A user is confirmed iff at least one contact is verified.
    pub fn is_confirmed(&self) -> bool {
        self.address.as_ref().is_some_and(Contact::is_verified)
            || self.email.as_ref().is_some_and(Contact::is_verified)
            || self.phone.as_ref().is_some_and(Contact::is_verified)
    }

    pub fn first_name(&self) -> Option<&PersonName> {
        self.first_name.as_ref()
    }

    pub fn middle_name(&self) -> Option<&PersonName> {
        self.middle_name.as_ref()
    }

    pub fn last_name(&self) -> Option<&PersonName> {
        self.last_name.as_ref()
    }

    pub fn nickname(&self) -> Option<&PersonName> {
        self.nickname.as_ref()
    }

    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    pub fn birthdate(&self) -> Option<DateTime<Utc>> {
        self.birthdate
    }

    pub fn gender(&self) -> Option<Gender> {
        self.gender
    }

    pub fn locale(&self) -> Option<&Locale> {
        self.locale.as_ref()
    }

    pub fn time_zone(&self) -> Option<&TimeZone> {
        self.time_zone.as_ref()
    }

    pub fn picture(&self) -> Option<&WebUrl> {
        self.picture.as_ref()
    }

    pub fn profile(&self) -> Option<&WebUrl> {
        self.profile.as_ref()
    }

    pub fn website(&self) -> Option<&WebUrl> {
        self.website.as_ref()
    }

    pub fn authenticated_on(&self) -> Option<DateTime<Utc>> {
        self.authenticated_on
    }

    pub fn custom_attributes(&self) -> &BTreeMap<Identifier, String> {
        &self.custom_attributes
    }

    pub fn custom_identifiers(&self) -> &BTreeMap<Identifier, CustomIdentifier> {
        &self.custom_identifiers
    }

    pub fn roles(&self) -> &BTreeSet<RoleId> {
        &self.roles
    }

    // ─────────────────────────────────────────────────────────────────────
    // Structural behaviors (one event each)
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_unique_name(&mut self, unique_name: UniqueName) {
        if self.unique_name != unique_name {
            self.raise(UserEvent::UniqueNameChanged(UserUniqueNameChanged {
                unique_name,
                occurred_at: Utc::now(),
            }));
        }
    }

    pub fn set_email(&mut self, email: Option<Email>) {
        if self.email != email {
            self.raise(UserEvent::EmailChanged(UserEmailChanged {
                email,
                occurred_at: Utc::now(),
            }));
        }
    }

    pub fn set_phone(&mut self, phone: Option<Phone>) {
        if self.phone != phone {
            self.raise(UserEvent::PhoneChanged(UserPhoneChanged {
                phone,
                occurred_at: Utc::now(),
            }));
        }
    }

    pub fn set_address(&mut self, address: Option<Address>) {
        if self.address != address {
            self.raise(UserEvent::AddressChanged(UserAddressChanged {
                address,
                occurred_at: Utc::now(),
            }));
        }
    }

    /// Set the password unconditionally. Always a change: password material
    /// cannot be compared.
    pub fn set_password(&mut self, password: Password) {
        self.raise(UserEvent::PasswordChanged(UserPasswordChanged {
            password,
            occurred_at: Utc::now(),
        }));
    }

    /// Same effect as [`User::set_password`], but refused for a disabled user.
    pub fn reset_password(&mut self, password: Password) -> Result<(), UserError> {
        if self.is_disabled {
            return Err(UserError::UserIsDisabled {
                user_id: self.id.clone(),
            });
        }
        self.set_password(password);
        Ok(())
    }

    /// Replace the password after verifying the current one.
    pub fn change_password(&mut self, current: &str, password: Password) -> Result<(), UserError> {
        self.ensure_can_authenticate(current)?;
        self.set_password(password);
        Ok(())
    }

    fn ensure_can_authenticate(&self, plaintext: &str) -> Result<(), UserError> {
        if self.is_disabled {
            return Err(UserError::UserIsDisabled {
                user_id: self.id.clone(),
            });
        }
        let Some(password) = &self.password else {
            return Err(UserError::UserHasNoPassword {
                user_id: self.id.clone(),
            });
        };
        if !password.is_match(plaintext) {
            return Err(UserError::IncorrectPassword {
                user_id: self.id.clone(),
                attempted_password: plaintext.to_string(),
            });
        }
        Ok(())
    }

    /// Verify the password and stamp the authentication time.
    pub fn authenticate(&mut self, plaintext: &str) -> Result<(), UserError> {
        self.ensure_can_authenticate(plaintext)?;
        self.raise(UserEvent::Authenticated(UserAuthenticated {
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    /// Sign the user in, producing a new [`Session`] owned by this user.
    ///
    /// When `password` is supplied the same checks as [`User::authenticate`]
    /// gate the sign-in. An explicitly supplied session id must share the
    /// user's tenant.
    pub fn sign_in(
        &mut self,
        password: Option<&str>,
        secret: Option<String>,
        session_id: Option<SessionId>,
    ) -> Result<Session, UserError> {
        if let Some(plaintext) = password {
            self.ensure_can_authenticate(plaintext)?;
        }
        if let Some(id) = &session_id {
            if id.tenant_id() != self.id.tenant_id() {
                return Err(UserError::TenantMismatch {
                    expected: self.id.tenant_id().cloned(),
                    actual: id.tenant_id().cloned(),
                });
            }
        }
        let session = Session::new(self.id.clone(), secret, session_id);
        self.raise(UserEvent::SignedIn(UserSignedIn {
            session_id: session.id().clone(),
            occurred_at: session.created_on(),
        }));
        Ok(session)
    }

    pub fn disable(&mut self) {
        if !self.is_disabled {
            self.raise(UserEvent::Disabled(UserDisabled {
                occurred_at: Utc::now(),
            }));
        }
    }

    pub fn enable(&mut self) {
        if self.is_disabled {
            self.raise(UserEvent::Enabled(UserEnabled {
                occurred_at: Utc::now(),
            }));
        }
    }

    /// Soft-delete. Absorbing: deleting a deleted user raises nothing.
    pub fn delete(&mut self) {
        if !self.is_deleted {
            self.raise(UserEvent::Deleted(UserDeleted {
                occurred_at: Utc::now(),
            }));
        }
    }

    fn ensure_same_tenant(&self, other: Option<&TenantId>) -> Result<(), UserError> {
        if self.id.tenant_id() != other {
            return Err(UserError::TenantMismatch {
                expected: self.id.tenant_id().cloned(),
                actual: other.cloned(),
            });
        }
        Ok(())
    }

    /// Reference a role. The role must share the user's tenant.
    pub fn add_role(&mut self, role: &Role) -> Result<(), UserError> {
        self.ensure_same_tenant(role.tenant_id())?;
        if !self.roles.contains(role.id()) {
            self.raise(UserEvent::RoleAdded(UserRoleAdded {
                role_id: role.id().clone(),
                occurred_at: Utc::now(),
            }));
        }
        Ok(())
    }

    pub fn remove_role(&mut self, role: &Role) -> Result<(), UserError> {
        self.ensure_same_tenant(role.tenant_id())?;
        if self.roles.contains(role.id()) {
            self.raise(UserEvent::RoleRemoved(UserRoleRemoved {
                role_id: role.id().clone(),
                occurred_at: Utc::now(),
            }));
        }
        Ok(())
    }

    /// Set a custom identifier. Uniqueness of the `(tenant, key, value)`
    /// triple is enforced at save time, which is why each change raises its
    /// own event instead of joining the batched update.
    pub fn set_custom_identifier(&mut self, key: Identifier, value: CustomIdentifier) {
        if self.custom_identifiers.get(&key) != Some(&value) {
            self.raise(UserEvent::CustomIdentifierSet(UserCustomIdentifierSet {
                key,
                value,
                occurred_at: Utc::now(),
            }));
        }
    }

    pub fn remove_custom_identifier(&mut self, key: &Identifier) {
        if self.custom_identifiers.contains_key(key) {
            self.raise(UserEvent::CustomIdentifierRemoved(UserCustomIdentifierRemoved {
                key: key.clone(),
                occurred_at: Utc::now(),
            }));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Staged behaviors (batched into one update event)
    // ─────────────────────────────────────────────────────────────────────

    /// Set a custom attribute. A blank value is equivalent to
    /// [`User::remove_custom_attribute`]. The change is staged into the
    /// pending update, not raised on its own.
    pub fn set_custom_attribute(&mut self, key: Identifier, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.remove_custom_attribute(&key);
            return;
        }
        if self.custom_attributes.get(&key).map(String::as_str) != Some(value) {
            self.custom_attributes.insert(key.clone(), value.to_string());
            self.pending_update
                .custom_attributes
                .insert(key, Some(value.to_string()));
        }
    }

    pub fn remove_custom_attribute(&mut self, key: &Identifier) {
        if self.custom_attributes.remove(key).is_some() {
            self.pending_update.custom_attributes.insert(key.clone(), None);
        }
    }

    pub fn set_first_name(&mut self, first_name: Option<PersonName>) {
        if self.first_name != first_name {
            self.first_name = first_name.clone();
            self.pending_update.first_name = Change::Changed(first_name);
            self.stage_full_name();
        }
    }

    pub fn set_middle_name(&mut self, middle_name: Option<PersonName>) {
        if self.middle_name != middle_name {
            self.middle_name = middle_name.clone();
            self.pending_update.middle_name = Change::Changed(middle_name);
            self.stage_full_name();
        }
    }

    pub fn set_last_name(&mut self, last_name: Option<PersonName>) {
        if self.last_name != last_name {
            self.last_name = last_name.clone();
            self.pending_update.last_name = Change::Changed(last_name);
            self.stage_full_name();
        }
    }

    pub fn set_nickname(&mut self, nickname: Option<PersonName>) {
        if self.nickname != nickname {
            self.nickname = nickname.clone();
            self.pending_update.nickname = Change::Changed(nickname);
        }
    }

    fn stage_full_name(&mut self) {
        let full_name = build_full_name(
            self.first_name.as_ref(),
            self.middle_name.as_ref(),
            self.last_name.as_ref(),
        );
        if self.full_name != full_name {
            self.full_name = full_name.clone();
            self.pending_update.full_name = Change::Changed(full_name);
        }
    }

    /// Set the birthdate; it must lie strictly in the past.
    pub fn set_birthdate(&mut self, birthdate: Option<DateTime<Utc>>) -> Result<(), UserError> {
        if let Some(value) = birthdate {
            if value >= Utc::now() {
                return Err(UserError::Domain(DomainError::validation(
                    "birthdate must be strictly in the past",
                )));
            }
        }
        if self.birthdate != birthdate {
            self.birthdate = birthdate;
            self.pending_update.birthdate = Change::Changed(birthdate);
        }
        Ok(())
    }

    pub fn set_gender(&mut self, gender: Option<Gender>) {
        if self.gender != gender {
            self.gender = gender;
            self.pending_update.gender = Change::Changed(gender);
        }
    }

    pub fn set_locale(&mut self, locale: Option<Locale>) {
        if self.locale != locale {
            self.locale = locale.clone();
            self.pending_update.locale = Change::Changed(locale);
        }
    }

    pub fn set_time_zone(&mut self, time_zone: Option<TimeZone>) {
        if self.time_zone != time_zone {
            self.time_zone = time_zone;
            self.pending_update.time_zone = Change::Changed(time_zone);
        }
    }

    pub fn set_picture(&mut self, picture: Option<WebUrl>) {
        if self.picture != picture {
            self.picture = picture.clone();
            self.pending_update.picture = Change::Changed(picture);
        }
    }

    pub fn set_profile(&mut self, profile: Option<WebUrl>) {
        if self.profile != profile {
            self.profile = profile.clone();
            self.pending_update.profile = Change::Changed(profile);
        }
    }

    pub fn set_website(&mut self, website: Option<WebUrl>) {
        if self.website != website {
            self.website = website.clone();
            self.pending_update.website = Change::Changed(website);
        }
    }

    /// Flush the pending update buffer.
    ///
    /// Raises exactly one batched event when at least one delta is staged,
    /// nothing otherwise; the buffer is reset either way.
    pub fn update(&mut self) {
        if self.pending_update.has_changes() {
            let mut event = std::mem::take(&mut self.pending_update);
            event.occurred_at = Utc::now();
            self.raise(UserEvent::Updated(event));
        }
    }

    fn apply_updated(&mut self, e: &UserUpdated) {
        e.first_name.apply_to(&mut self.first_name);
        e.middle_name.apply_to(&mut self.middle_name);
        e.last_name.apply_to(&mut self.last_name);
        e.nickname.apply_to(&mut self.nickname);
        e.full_name.apply_to(&mut self.full_name);
        e.birthdate.apply_to(&mut self.birthdate);
        e.gender.apply_to(&mut self.gender);
        e.locale.apply_to(&mut self.locale);
        e.time_zone.apply_to(&mut self.time_zone);
        e.picture.apply_to(&mut self.picture);
        e.profile.apply_to(&mut self.profile);
        e.website.apply_to(&mut self.website);
        for (key, value) in &e.custom_attributes {
            match value {
                Some(v) => {
                    self.custom_attributes.insert(key.clone(), v.clone());
                }
                None => {
                    self.custom_attributes.remove(key);
                }
            }
        }
    }
}

/// Concatenation of the non-empty name parts, whitespace collapsed.
fn build_full_name(
    first: Option<&PersonName>,
    middle: Option<&PersonName>,
    last: Option<&PersonName>,
) -> Option<String> {
    let joined = [first, middle, last]
        .into_iter()
        .flatten()
        .map(PersonName::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() { None } else { Some(collapsed) }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl EventSourced for User {
    type Event = UserEvent;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => {
                self.id = e.user_id.clone();
                self.unique_name = e.unique_name.clone();
            }
            UserEvent::UniqueNameChanged(e) => {
                self.unique_name = e.unique_name.clone();
            }
            UserEvent::EmailChanged(e) => {
                self.email = e.email.clone();
            }
            UserEvent::PhoneChanged(e) => {
                self.phone = e.phone.clone();
            }
            UserEvent::AddressChanged(e) => {
                self.address = e.address.clone();
            }
            UserEvent::PasswordChanged(e) => {
                self.password = Some(e.password.clone());
            }
            UserEvent::Authenticated(e) => {
                self.authenticated_on = Some(e.occurred_at);
            }
            UserEvent::SignedIn(e) => {
                self.authenticated_on = Some(e.occurred_at);
            }
            UserEvent::Disabled(_) => {
                self.is_disabled = true;
            }
            UserEvent::Enabled(_) => {
                self.is_disabled = false;
            }
            UserEvent::RoleAdded(e) => {
                self.roles.insert(e.role_id.clone());
            }
            UserEvent::RoleRemoved(e) => {
                self.roles.remove(&e.role_id);
            }
            UserEvent::CustomIdentifierSet(e) => {
                self.custom_identifiers.insert(e.key.clone(), e.value.clone());
            }
            UserEvent::CustomIdentifierRemoved(e) => {
                self.custom_identifiers.remove(&e.key);
            }
            UserEvent::Updated(e) => self.apply_updated(e),
            UserEvent::Deleted(_) => {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{PasswordSettings, UniqueNameSettings};

    fn unique_name(value: &str) -> UniqueName {
        UniqueName::try_new(value, &UniqueNameSettings::default()).unwrap()
    }

    fn password(plaintext: &str) -> Password {
        Password::new(plaintext, &PasswordSettings::default()).unwrap()
    }

    fn tenant_user(tenant_id: Option<TenantId>) -> User {
        User::create(UserId::new(tenant_id), unique_name("alice"))
    }

    fn test_user() -> User {
        tenant_user(Some(TenantId::new()))
    }

    fn email(address: &str, is_verified: bool) -> Email {
        Email::try_new(address, is_verified).unwrap()
    }

    fn identifier(value: &str) -> Identifier {
        Identifier::try_new(value).unwrap()
    }

    #[test]
    fn create_originates_the_user() {
        let user = test_user();
        assert_eq!(user.unique_name().as_str(), "alice");
        assert_eq!(user.version(), 1);
        assert!(!user.is_disabled());
        assert!(!user.is_deleted());
        assert!(!user.has_password());
        assert!(!user.is_confirmed());

        let events = user.uncommitted_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            UserEvent::Created(e) => {
                assert_eq!(&e.user_id, user.id());
                assert_eq!(e.unique_name, *user.unique_name());
            }
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn set_unique_name_raises_only_on_actual_change() {
        let mut user = test_user();
        user.mark_committed();

        user.set_unique_name(unique_name("alice"));
        assert!(user.uncommitted_events().is_empty());

        user.set_unique_name(unique_name("alicia"));
        assert_eq!(user.uncommitted_events().len(), 1);
        assert_eq!(user.unique_name().as_str(), "alicia");
        assert_eq!(user.version(), 2);
    }

    #[test]
    fn contact_setters_use_value_equality() {
        let mut user = test_user();
        user.mark_committed();

        user.set_email(Some(email("alice@example.com", false)));
        user.set_email(Some(email("alice@example.com", false)));
        assert_eq!(user.uncommitted_events().len(), 1);

        // Verification flag participates in value equality.
        user.set_email(Some(email("alice@example.com", true)));
        assert_eq!(user.uncommitted_events().len(), 2);

        user.set_email(None);
        assert_eq!(user.uncommitted_events().len(), 3);
        assert!(user.email().is_none());

        user.set_email(None);
        assert_eq!(user.uncommitted_events().len(), 3);
    }

    #[test]
    fn confirmation_requires_at_least_one_verified_contact() {
        for (email_verified, phone_verified, address_verified) in [
            (false, false, false),
            (true, false, false),
            (false, true, false),
            (false, false, true),
            (true, true, true),
        ] {
            let mut user = test_user();
            user.set_email(Some(email("alice@example.com", email_verified)));
            user.set_phone(Some(
                Phone::try_new(Some("CA"), "+15148454636", None, phone_verified).unwrap(),
            ));
            user.set_address(Some(
                Address::try_new("1 Main St", "Springfield", None, None, "USA", address_verified)
                    .unwrap(),
            ));
            assert_eq!(
                user.is_confirmed(),
                email_verified || phone_verified || address_verified
            );
        }

        let bare = test_user();
        assert!(!bare.is_confirmed());
    }

    #[test]
    fn set_password_always_raises() {
        let mut user = test_user();
        user.mark_committed();

        user.set_password(password("Correct1Horse"));
        user.set_password(password("Correct1Horse"));
        assert_eq!(user.uncommitted_events().len(), 2);
        assert!(user.has_password());
    }

    #[test]
    fn reset_password_is_refused_for_disabled_users() {
        let mut user = test_user();
        user.disable();
        let err = user.reset_password(password("Correct1Horse")).unwrap_err();
        assert_eq!(
            err,
            UserError::UserIsDisabled {
                user_id: user.id().clone()
            }
        );

        user.enable();
        assert!(user.reset_password(password("Correct1Horse")).is_ok());
    }

    #[test]
    fn change_password_verifies_the_current_one() {
        let mut user = test_user();
        user.set_password(password("Old1Password"));
        user.mark_committed();

        let err = user
            .change_password("Wrong1Password", password("New1Password"))
            .unwrap_err();
        match err {
            UserError::IncorrectPassword {
                attempted_password, ..
            } => assert_eq!(attempted_password, "Wrong1Password"),
            other => panic!("expected IncorrectPassword, got {other:?}"),
        }
        assert!(user.uncommitted_events().is_empty());

        user.change_password("Old1Password", password("New1Password")).unwrap();
        assert_eq!(user.uncommitted_events().len(), 1);
    }

    #[test]
    fn authenticate_stamps_authenticated_on() {
        let mut user = test_user();
        user.set_password(password("Correct1Horse"));
        assert!(user.authenticated_on().is_none());

        user.authenticate("Correct1Horse").unwrap();
        assert!(user.authenticated_on().is_some());
    }

    #[test]
    fn credential_gating_order_is_disabled_then_missing_then_mismatch() {
        // Disabled wins even with a correct password.
        let mut user = test_user();
        user.set_password(password("Correct1Horse"));
        user.disable();
        assert!(matches!(
            user.authenticate("Correct1Horse"),
            Err(UserError::UserIsDisabled { .. })
        ));

        // No password set.
        let mut user = test_user();
        assert!(matches!(
            user.authenticate("Correct1Horse"),
            Err(UserError::UserHasNoPassword { .. })
        ));

        // Mismatch never stamps the authentication time.
        let mut user = test_user();
        user.set_password(password("Correct1Horse"));
        assert!(matches!(
            user.authenticate("Wrong1Horse"),
            Err(UserError::IncorrectPassword { .. })
        ));
        assert!(user.authenticated_on().is_none());
    }

    #[test]
    fn sign_in_produces_an_owned_session() {
        let mut user = test_user();
        user.set_password(password("Correct1Horse"));
        user.mark_committed();

        let session = user.sign_in(Some("Correct1Horse"), None, None).unwrap();
        assert_eq!(session.user_id(), user.id());
        assert_eq!(session.id().tenant_id(), user.tenant_id());

        let events = user.uncommitted_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            UserEvent::SignedIn(e) => {
                assert_eq!(&e.session_id, session.id());
                assert_eq!(e.occurred_at, session.created_on());
            }
            other => panic!("expected SignedIn, got {other:?}"),
        }
        assert_eq!(user.authenticated_on(), Some(session.created_on()));
    }

    #[test]
    fn sign_in_without_password_check_skips_credential_gating() {
        let mut user = test_user();
        let session = user.sign_in(None, Some("s3cret".into()), None).unwrap();
        assert_eq!(session.secret(), Some("s3cret"));
    }

    #[test]
    fn sign_in_gates_on_credentials_when_a_password_is_supplied() {
        let mut user = test_user();
        user.set_password(password("Correct1Horse"));
        user.disable();
        user.mark_committed();

        assert!(matches!(
            user.sign_in(Some("Correct1Horse"), None, None),
            Err(UserError::UserIsDisabled { .. })
        ));
        assert!(user.uncommitted_events().is_empty());
    }

    #[test]
    fn sign_in_rejects_a_session_id_from_another_tenant() {
        let mut user = test_user();
        let foreign = SessionId::new(Some(TenantId::new()));
        let err = user.sign_in(None, None, Some(foreign.clone())).unwrap_err();
        assert_eq!(
            err,
            UserError::TenantMismatch {
                expected: user.tenant_id().cloned(),
                actual: foreign.tenant_id().cloned(),
            }
        );
    }

    #[test]
    fn disable_and_enable_raise_only_on_transition() {
        let mut user = test_user();
        user.mark_committed();

        user.enable();
        assert!(user.uncommitted_events().is_empty());

        user.disable();
        user.disable();
        assert_eq!(user.uncommitted_events().len(), 1);
        assert!(user.is_disabled());

        user.enable();
        user.enable();
        assert_eq!(user.uncommitted_events().len(), 2);
        assert!(!user.is_disabled());
    }

    #[test]
    fn delete_is_absorbing() {
        let mut user = test_user();
        user.mark_committed();

        user.delete();
        user.delete();
        assert_eq!(user.uncommitted_events().len(), 1);
        assert!(user.is_deleted());
    }

    #[test]
    fn add_role_requires_matching_tenant() {
        let tenant_id = TenantId::new();
        let mut user = tenant_user(Some(tenant_id.clone()));
        user.mark_committed();

        // Same-tenant role is accepted, idempotently.
        let role = Role::new(RoleId::new(Some(tenant_id.clone())), unique_name("admin"));
        user.add_role(&role).unwrap();
        user.add_role(&role).unwrap();
        assert_eq!(user.uncommitted_events().len(), 1);
        assert!(user.roles().contains(role.id()));

        // Foreign tenant, including the one-sided-none cases.
        for foreign in [Some(TenantId::new()), None] {
            let foreign_role = Role::new(RoleId::new(foreign.clone()), unique_name("admin"));
            let err = user.add_role(&foreign_role).unwrap_err();
            assert_eq!(
                err,
                UserError::TenantMismatch {
                    expected: Some(tenant_id.clone()),
                    actual: foreign,
                }
            );
        }
        assert_eq!(user.uncommitted_events().len(), 1);

        // Tenant-less user vs tenant-ful role.
        let mut global = tenant_user(None);
        global.mark_committed();
        let tenant_role = Role::new(RoleId::new(Some(TenantId::new())), unique_name("admin"));
        assert!(matches!(
            global.add_role(&tenant_role),
            Err(UserError::TenantMismatch { .. })
        ));
        assert!(global.uncommitted_events().is_empty());
    }

    #[test]
    fn remove_role_raises_only_when_membership_changes() {
        let tenant_id = TenantId::new();
        let mut user = tenant_user(Some(tenant_id.clone()));
        let role = Role::new(RoleId::new(Some(tenant_id)), unique_name("admin"));
        user.add_role(&role).unwrap();
        user.mark_committed();

        user.remove_role(&role).unwrap();
        user.remove_role(&role).unwrap();
        assert_eq!(user.uncommitted_events().len(), 1);
        assert!(user.roles().is_empty());
    }

    #[test]
    fn custom_identifiers_raise_their_own_events() {
        let mut user = test_user();
        user.mark_committed();

        let key = identifier("GoogleId");
        let value = CustomIdentifier::try_new("1234567890").unwrap();
        user.set_custom_identifier(key.clone(), value.clone());
        user.set_custom_identifier(key.clone(), value.clone());
        assert_eq!(user.uncommitted_events().len(), 1);
        assert_eq!(user.custom_identifiers().get(&key), Some(&value));

        user.remove_custom_identifier(&key);
        user.remove_custom_identifier(&key);
        assert_eq!(user.uncommitted_events().len(), 2);
        assert!(user.custom_identifiers().is_empty());
    }

    #[test]
    fn custom_attributes_are_staged_not_raised() {
        let mut user = test_user();
        user.mark_committed();

        let key = identifier("employee_number");
        user.set_custom_attribute(key.clone(), " 109-28 ");
        assert!(user.uncommitted_events().is_empty());
        assert_eq!(user.custom_attributes().get(&key).map(String::as_str), Some("109-28"));

        user.update();
        assert_eq!(user.uncommitted_events().len(), 1);
        match &user.uncommitted_events()[0] {
            UserEvent::Updated(e) => {
                assert_eq!(e.custom_attributes.get(&key), Some(&Some("109-28".to_string())));
            }
            other => panic!("expected Updated, got {other:?}"),
        }
    }

    #[test]
    fn blank_custom_attribute_value_means_removal() {
        let mut user = test_user();
        let key = identifier("employee_number");
        user.set_custom_attribute(key.clone(), "109-28");
        user.update();
        user.mark_committed();

        user.set_custom_attribute(key.clone(), "   ");
        user.update();
        assert_eq!(user.uncommitted_events().len(), 1);
        match &user.uncommitted_events()[0] {
            UserEvent::Updated(e) => assert_eq!(e.custom_attributes.get(&key), Some(&None)),
            other => panic!("expected Updated, got {other:?}"),
        }
        assert!(user.custom_attributes().is_empty());
    }

    #[test]
    fn removing_an_absent_custom_attribute_stages_nothing() {
        let mut user = test_user();
        user.mark_committed();

        user.remove_custom_attribute(&identifier("missing"));
        user.update();
        assert!(user.uncommitted_events().is_empty());
    }

    #[test]
    fn batched_update_flushes_all_staged_deltas_at_once() {
        let mut user = test_user();
        user.mark_committed();

        user.set_first_name(Some(PersonName::try_new("Alice").unwrap()));
        user.set_last_name(Some(PersonName::try_new("Martin").unwrap()));
        assert!(user.uncommitted_events().is_empty());

        user.update();
        let events = user.uncommitted_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            UserEvent::Updated(e) => {
                assert!(e.first_name.is_changed());
                assert!(e.last_name.is_changed());
                assert_eq!(e.full_name.changed(), Some(&Some("Alice Martin".to_string())));
                assert!(!e.middle_name.is_changed());
                assert!(!e.locale.is_changed());
            }
            other => panic!("expected Updated, got {other:?}"),
        }
        assert_eq!(user.full_name(), Some("Alice Martin"));

        // The buffer was reset: flushing again raises nothing.
        user.update();
        assert_eq!(user.uncommitted_events().len(), 1);
    }

    #[test]
    fn setting_the_same_scalar_twice_stages_nothing() {
        let mut user = test_user();
        let locale = Locale::try_new("fr-CA").unwrap();
        user.set_locale(Some(locale.clone()));
        user.update();
        user.mark_committed();

        user.set_locale(Some(locale));
        user.update();
        assert!(user.uncommitted_events().is_empty());
    }

    #[test]
    fn cleared_fields_are_distinct_from_untouched_fields() {
        let mut user = test_user();
        user.set_locale(Some(Locale::try_new("fr-CA").unwrap()));
        user.set_gender(Some(Gender::Female));
        user.update();
        user.mark_committed();

        user.set_locale(None);
        user.update();
        let events = user.uncommitted_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            UserEvent::Updated(e) => {
                assert_eq!(e.locale.changed(), Some(&None));
                assert!(!e.gender.is_changed());
            }
            other => panic!("expected Updated, got {other:?}"),
        }
        assert!(user.locale().is_none());
        assert_eq!(user.gender(), Some(Gender::Female));
    }

    #[test]
    fn birthdate_must_lie_strictly_in_the_past() {
        let mut user = test_user();
        let future = Utc::now() + chrono::Duration::days(1);
        assert!(matches!(
            user.set_birthdate(Some(future)),
            Err(UserError::Domain(DomainError::Validation(_)))
        ));

        let past = Utc::now() - chrono::Duration::days(365 * 30);
        user.set_birthdate(Some(past)).unwrap();
        assert_eq!(user.birthdate(), Some(past));
    }

    #[test]
    fn full_name_collapses_whitespace_between_parts() {
        let mut user = test_user();
        user.set_first_name(Some(PersonName::try_new("Mary  Ann").unwrap()));
        user.set_last_name(Some(PersonName::try_new("Moore").unwrap()));
        user.update();
        assert_eq!(user.full_name(), Some("Mary Ann Moore"));

        user.set_last_name(None);
        user.update();
        assert_eq!(user.full_name(), Some("Mary Ann"));

        user.set_first_name(None);
        user.update();
        assert_eq!(user.full_name(), None);
    }

    #[test]
    fn replay_rebuilds_live_state() {
        let tenant_id = TenantId::new();
        let mut user = tenant_user(Some(tenant_id.clone()));
        user.set_password(password("Correct1Horse"));
        user.set_email(Some(email("alice@example.com", true)));
        user.set_first_name(Some(PersonName::try_new("Alice").unwrap()));
        user.set_last_name(Some(PersonName::try_new("Martin").unwrap()));
        user.set_time_zone(Some(TimeZone::try_new("America/Montreal").unwrap()));
        user.update();
        let role = Role::new(RoleId::new(Some(tenant_id)), unique_name("admin"));
        user.add_role(&role).unwrap();
        user.set_custom_identifier(
            identifier("GoogleId"),
            CustomIdentifier::try_new("1234567890").unwrap(),
        );
        user.authenticate("Correct1Horse").unwrap();
        user.disable();

        let history = user.uncommitted_events().to_vec();
        let replayed = User::replay(history).unwrap();

        assert_eq!(replayed.id(), user.id());
        assert_eq!(replayed.unique_name(), user.unique_name());
        assert_eq!(replayed.email(), user.email());
        assert_eq!(replayed.full_name(), user.full_name());
        assert_eq!(replayed.time_zone(), user.time_zone());
        assert_eq!(replayed.roles(), user.roles());
        assert_eq!(replayed.custom_identifiers(), user.custom_identifiers());
        assert_eq!(replayed.authenticated_on(), user.authenticated_on());
        assert_eq!(replayed.is_disabled(), user.is_disabled());
        assert_eq!(replayed.version(), user.version());
        assert!(replayed.is_confirmed());
        assert!(!replayed.has_uncommitted_events());
    }

    #[test]
    fn replay_rejects_streams_not_starting_with_creation() {
        let err = User::replay(vec![UserEvent::Disabled(UserDisabled {
            occurred_at: Utc::now(),
        })])
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert!(matches!(User::replay(vec![]), Err(DomainError::InvariantViolation(_))));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 200,
                ..ProptestConfig::default()
            })]

            /// Property: replay of the raised history always reproduces the
            /// live state, whatever the name parts were.
            #[test]
            fn replay_is_deterministic(
                first in "[A-Za-z]{1,20}",
                last in "[A-Za-z]{1,20}",
            ) {
                let mut user = test_user();
                user.set_first_name(Some(PersonName::try_new(first).unwrap()));
                user.set_last_name(Some(PersonName::try_new(last).unwrap()));
                user.update();
                user.disable();

                let replayed = User::replay(user.uncommitted_events().to_vec()).unwrap();
                prop_assert_eq!(replayed.full_name(), user.full_name());
                prop_assert_eq!(replayed.first_name(), user.first_name());
                prop_assert_eq!(replayed.version(), user.version());
                prop_assert!(replayed.is_disabled());
            }
        }
    }
}
