//! `keyfort-identity` — the identity domain model.
//!
//! Event-sourced [`User`] aggregates in a multi-tenant identity store:
//! self-validating value objects, an opaque [`Password`] credential, the
//! user state machine with its batched-update protocol, and the [`Role`] /
//! [`Session`] collaborators users reference and produce.

pub mod contact;
pub mod password;
pub mod role;
pub mod session;
pub mod settings;
pub mod user;
pub mod values;

pub use contact::{Address, Contact, Email, Phone};
pub use password::Password;
pub use role::Role;
pub use session::{Session, SessionEvent};
pub use settings::{PasswordSettings, UniqueNameSettings, UserSettings};
pub use user::{User, UserError, UserEvent, UserUpdated};
pub use values::{
    CustomIdentifier, Description, DisplayName, Gender, Identifier, Locale, PersonName, TimeZone,
    UniqueName, WebUrl,
};
