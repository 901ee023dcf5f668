//! Opaque password credential.
//!
//! `Password` is a capability object, not a DTO: construction validates the
//! plaintext against policy and hashes it (Argon2id, PHC string format);
//! afterwards the only question it answers is [`Password::is_match`]. The
//! plaintext is never stored and `Debug` output is redacted.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};

use keyfort_core::DomainError;

use crate::settings::PasswordSettings;

#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    /// Validate `plaintext` against `settings` and hash it.
    pub fn new(plaintext: &str, settings: &PasswordSettings) -> Result<Self, DomainError> {
        settings.validate(plaintext)?;
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| DomainError::validation(format!("password hashing failed: {e}")))?;
        Ok(Self(hash.to_string()))
    }

    /// Rehydrate from a previously produced PHC string (replay path).
    pub fn from_phc_string(phc: impl Into<String>) -> Result<Self, DomainError> {
        let phc = phc.into();
        PasswordHash::new(&phc)
            .map_err(|e| DomainError::validation(format!("malformed password hash: {e}")))?;
        Ok(Self(phc))
    }

    /// Whether `plaintext` matches the stored hash.
    pub fn is_match(&self, plaintext: &str) -> bool {
        PasswordHash::new(&self.0)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(plaintext.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

impl PartialEq for Password {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Password {}

impl core::fmt::Debug for Password {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}
