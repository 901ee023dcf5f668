//! Tenant-level identity policy settings.

use serde::{Deserialize, Serialize};

use keyfort_core::DomainError;

/// Characters allowed in a unique name when no policy overrides them.
pub const DEFAULT_ALLOWED_UNIQUE_NAME_CHARACTERS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-._@+";

/// Allowed-character policy for unique names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniqueNameSettings {
    /// Characters a unique name may contain; `None` lifts the restriction.
    pub allowed_characters: Option<String>,
}

impl Default for UniqueNameSettings {
    fn default() -> Self {
        Self {
            allowed_characters: Some(DEFAULT_ALLOWED_UNIQUE_NAME_CHARACTERS.to_string()),
        }
    }
}

/// Structural password policy, checked before hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordSettings {
    pub required_length: usize,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_digit: bool,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            required_length: 8,
            require_lowercase: true,
            require_uppercase: true,
            require_digit: true,
        }
    }
}

impl PasswordSettings {
    pub fn validate(&self, plaintext: &str) -> Result<(), DomainError> {
        if plaintext.chars().count() < self.required_length {
            return Err(DomainError::validation(format!(
                "password must be at least {} characters long",
                self.required_length
            )));
        }
        if self.require_lowercase && !plaintext.chars().any(|c| c.is_lowercase()) {
            return Err(DomainError::validation("password must contain a lowercase letter"));
        }
        if self.require_uppercase && !plaintext.chars().any(|c| c.is_uppercase()) {
            return Err(DomainError::validation("password must contain an uppercase letter"));
        }
        if self.require_digit && !plaintext.chars().any(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation("password must contain a digit"));
        }
        Ok(())
    }
}

/// Per-tenant user policy consumed by the value objects and the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UserSettings {
    pub unique_name: UniqueNameSettings,
    pub password: PasswordSettings,
    /// When true, an email address may belong to at most one user per tenant.
    pub require_unique_email: bool,
}
