//! Self-validating value objects.
//!
//! Every type here validates eagerly at construction and fails fast on
//! invalid input; a constructed value is a legal value. Types whose fields
//! are optional on the aggregate also expose a `try_new_opt` entry point
//! that maps absent/blank input to `Ok(None)` and otherwise behaves exactly
//! like the fallible constructor.

use core::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use url::Url;

use keyfort_core::{DomainError, ValueObject};

use crate::settings::UniqueNameSettings;

const MAX_LENGTH: usize = 255;
const MAX_URL_LENGTH: usize = 2048;

fn trimmed(value: impl Into<String>, kind: &str) -> Result<String, DomainError> {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{kind}: value cannot be empty")));
    }
    Ok(trimmed.to_string())
}

fn bounded(value: &str, kind: &str, max: usize) -> Result<(), DomainError> {
    if value.len() > max {
        return Err(DomainError::validation(format!(
            "{kind}: value exceeds {max} characters"
        )));
    }
    Ok(())
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// UniqueName
// ─────────────────────────────────────────────────────────────────────────────

/// Per-tenant-unique sign-in name.
///
/// Character set is policy-controlled via [`UniqueNameSettings`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueName(String);

impl UniqueName {
    pub fn try_new(
        value: impl Into<String>,
        settings: &UniqueNameSettings,
    ) -> Result<Self, DomainError> {
        let value = trimmed(value, "UniqueName")?;
        bounded(&value, "UniqueName", MAX_LENGTH)?;
        if let Some(allowed) = &settings.allowed_characters {
            if let Some(invalid) = value.chars().find(|c| !allowed.contains(*c)) {
                return Err(DomainError::validation(format!(
                    "UniqueName: character '{invalid}' is not allowed"
                )));
            }
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for UniqueName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for UniqueName {}

// ─────────────────────────────────────────────────────────────────────────────
// DisplayName / Description
// ─────────────────────────────────────────────────────────────────────────────

/// Human-readable display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn try_new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = trimmed(value, "DisplayName")?;
        bounded(&value, "DisplayName", MAX_LENGTH)?;
        Ok(Self(value))
    }

    pub fn try_new_opt(value: Option<&str>) -> Result<Option<Self>, DomainError> {
        if is_blank(value) {
            return Ok(None);
        }
        Self::try_new(value.unwrap_or_default()).map(Some)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DisplayName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for DisplayName {}

/// Free-form description; no length cap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Description(String);

impl Description {
    pub fn try_new(value: impl Into<String>) -> Result<Self, DomainError> {
        Ok(Self(trimmed(value, "Description")?))
    }

    pub fn try_new_opt(value: Option<&str>) -> Result<Option<Self>, DomainError> {
        if is_blank(value) {
            return Ok(None);
        }
        Self::try_new(value.unwrap_or_default()).map(Some)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Description {}

// ─────────────────────────────────────────────────────────────────────────────
// Identifier / CustomIdentifier
// ─────────────────────────────────────────────────────────────────────────────

/// Constrained key token: must not start with a digit, and may contain only
/// alphanumerics and underscores. Used as the key of custom attributes and
/// custom identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn try_new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = trimmed(value, "Identifier")?;
        bounded(&value, "Identifier", MAX_LENGTH)?;
        if value.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation("Identifier: value cannot start with a digit"));
        }
        if let Some(invalid) = value.chars().find(|c| !c.is_alphanumeric() && *c != '_') {
            return Err(DomainError::validation(format!(
                "Identifier: character '{invalid}' is not allowed"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Identifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_new(s)
    }
}

impl ValueObject for Identifier {}

/// External-system correlation value, unique per `(tenant, key, value)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomIdentifier(String);

impl CustomIdentifier {
    pub fn try_new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = trimmed(value, "CustomIdentifier")?;
        bounded(&value, "CustomIdentifier", MAX_LENGTH)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CustomIdentifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for CustomIdentifier {}

// ─────────────────────────────────────────────────────────────────────────────
// PersonName / Gender
// ─────────────────────────────────────────────────────────────────────────────

/// One part of a person's name (first, middle, last, nickname).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonName(String);

impl PersonName {
    pub fn try_new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = trimmed(value, "PersonName")?;
        bounded(&value, "PersonName", MAX_LENGTH)?;
        Ok(Self(value))
    }

    pub fn try_new_opt(value: Option<&str>) -> Result<Option<Self>, DomainError> {
        if is_blank(value) {
            return Ok(None);
        }
        Self::try_new(value.unwrap_or_default()).map(Some)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PersonName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for PersonName {}

/// Gender, normalized to lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn try_new(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(DomainError::validation(format!("Gender: unknown value '{other}'"))),
        }
    }

    pub fn try_new_opt(value: Option<&str>) -> Result<Option<Self>, DomainError> {
        if is_blank(value) {
            return Ok(None);
        }
        Self::try_new(value.unwrap_or_default()).map(Some)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl core::fmt::Display for Gender {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ValueObject for Gender {}

// ─────────────────────────────────────────────────────────────────────────────
// Locale / TimeZone
// ─────────────────────────────────────────────────────────────────────────────

/// Locale code, `language[-REGION]`: a 2–3 letter lowercase language tag,
/// optionally followed by a 2 letter uppercase region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(String);

impl Locale {
    pub fn try_new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = trimmed(value, "Locale")?;
        let mut segments = value.split('-');
        let language = segments.next().unwrap_or_default();
        let region = segments.next();
        let language_ok = (2..=3).contains(&language.len())
            && language.chars().all(|c| c.is_ascii_lowercase());
        let region_ok = region.is_none_or(|r| r.len() == 2 && r.chars().all(|c| c.is_ascii_uppercase()));
        if !language_ok || !region_ok || segments.next().is_some() {
            return Err(DomainError::validation(format!("Locale: invalid code '{value}'")));
        }
        Ok(Self(value))
    }

    pub fn try_new_opt(value: Option<&str>) -> Result<Option<Self>, DomainError> {
        if is_blank(value) {
            return Ok(None);
        }
        Self::try_new(value.unwrap_or_default()).map(Some)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Language tag without the region part.
    pub fn language(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl core::fmt::Display for Locale {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for Locale {}

/// Time zone, resolved against the tz database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeZone(Tz);

impl TimeZone {
    pub fn try_new(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DomainError::validation("TimeZone: value cannot be empty"));
        }
        let tz = Tz::from_str(value)
            .map_err(|_| DomainError::validation(format!("TimeZone: unknown tz id '{value}'")))?;
        Ok(Self(tz))
    }

    pub fn try_new_opt(value: Option<&str>) -> Result<Option<Self>, DomainError> {
        if is_blank(value) {
            return Ok(None);
        }
        Self::try_new(value.unwrap_or_default()).map(Some)
    }

    pub fn tz(&self) -> Tz {
        self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.name()
    }
}

impl core::fmt::Display for TimeZone {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ValueObject for TimeZone {}

// ─────────────────────────────────────────────────────────────────────────────
// WebUrl
// ─────────────────────────────────────────────────────────────────────────────

/// Absolute http(s) URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebUrl(Url);

impl WebUrl {
    pub fn try_new(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DomainError::validation("Url: value cannot be empty"));
        }
        bounded(value, "Url", MAX_URL_LENGTH)?;
        let url = Url::parse(value)
            .map_err(|e| DomainError::validation(format!("Url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DomainError::validation(format!(
                "Url: scheme '{}' is not allowed",
                url.scheme()
            )));
        }
        Ok(Self(url))
    }

    pub fn try_new_opt(value: Option<&str>) -> Result<Option<Self>, DomainError> {
        if is_blank(value) {
            return Ok(None);
        }
        Self::try_new(value.unwrap_or_default()).map(Some)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl core::fmt::Display for WebUrl {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ValueObject for WebUrl {}
