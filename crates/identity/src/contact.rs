//! Contact value objects.
//!
//! Each contact carries an `is_verified` flag. A user is **confirmed** iff
//! at least one of its contacts is verified.

use serde::{Deserialize, Serialize};

use keyfort_core::{DomainError, ValueObject};

const MAX_LENGTH: usize = 255;
const MAX_PHONE_NUMBER_LENGTH: usize = 20;
const MAX_PHONE_EXTENSION_LENGTH: usize = 10;

/// Common surface of all contact values.
pub trait Contact {
    fn is_verified(&self) -> bool;
}

fn required(value: impl Into<String>, kind: &str, max: usize) -> Result<String, DomainError> {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{kind}: value cannot be empty")));
    }
    if trimmed.len() > max {
        return Err(DomainError::validation(format!("{kind}: value exceeds {max} characters")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<&str>, kind: &str, max: usize) -> Result<Option<String>, DomainError> {
    match value {
        Some(v) if !v.trim().is_empty() => required(v, kind, max).map(Some),
        _ => Ok(None),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Email
// ─────────────────────────────────────────────────────────────────────────────

/// Email address, optionally verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    address: String,
    is_verified: bool,
}

impl Email {
    pub fn try_new(address: impl Into<String>, is_verified: bool) -> Result<Self, DomainError> {
        let address = required(address, "Email", MAX_LENGTH)?;
        let mut parts = address.split('@');
        let local = parts.next().unwrap_or_default();
        let domain = parts.next().unwrap_or_default();
        let well_formed = parts.next().is_none()
            && !local.is_empty()
            && domain.split('.').count() >= 2
            && domain.split('.').all(|s| !s.is_empty());
        if !well_formed {
            return Err(DomainError::validation(format!("Email: malformed address '{address}'")));
        }
        Ok(Self { address, is_verified })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Contact for Email {
    fn is_verified(&self) -> bool {
        self.is_verified
    }
}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.address)
    }
}

impl ValueObject for Email {}

// ─────────────────────────────────────────────────────────────────────────────
// Phone
// ─────────────────────────────────────────────────────────────────────────────

/// Phone number with optional country code and extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phone {
    country_code: Option<String>,
    number: String,
    extension: Option<String>,
    is_verified: bool,
}

impl Phone {
    pub fn try_new(
        country_code: Option<&str>,
        number: impl Into<String>,
        extension: Option<&str>,
        is_verified: bool,
    ) -> Result<Self, DomainError> {
        let country_code = match optional(country_code, "Phone country code", 2)? {
            Some(code) => {
                if code.len() != 2 || !code.chars().all(|c| c.is_ascii_uppercase()) {
                    return Err(DomainError::validation(format!(
                        "Phone: invalid country code '{code}'"
                    )));
                }
                Some(code)
            }
            None => None,
        };
        let number = required(number, "Phone number", MAX_PHONE_NUMBER_LENGTH)?;
        if let Some(invalid) = number
            .chars()
            .find(|c| !c.is_ascii_digit() && !matches!(c, '+' | '-' | ' ' | '(' | ')'))
        {
            return Err(DomainError::validation(format!(
                "Phone: character '{invalid}' is not allowed in a number"
            )));
        }
        let extension = match optional(extension, "Phone extension", MAX_PHONE_EXTENSION_LENGTH)? {
            Some(ext) => {
                if !ext.chars().all(|c| c.is_ascii_digit()) {
                    return Err(DomainError::validation(format!("Phone: invalid extension '{ext}'")));
                }
                Some(ext)
            }
            None => None,
        };
        Ok(Self {
            country_code,
            number,
            extension,
            is_verified,
        })
    }

    pub fn country_code(&self) -> Option<&str> {
        self.country_code.as_deref()
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }
}

impl Contact for Phone {
    fn is_verified(&self) -> bool {
        self.is_verified
    }
}

impl ValueObject for Phone {}

// ─────────────────────────────────────────────────────────────────────────────
// Address
// ─────────────────────────────────────────────────────────────────────────────

/// Postal address. Street, locality and country are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    street: String,
    locality: String,
    postal_code: Option<String>,
    region: Option<String>,
    country: String,
    is_verified: bool,
}

impl Address {
    pub fn try_new(
        street: impl Into<String>,
        locality: impl Into<String>,
        postal_code: Option<&str>,
        region: Option<&str>,
        country: impl Into<String>,
        is_verified: bool,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            street: required(street, "Address street", MAX_LENGTH)?,
            locality: required(locality, "Address locality", MAX_LENGTH)?,
            postal_code: optional(postal_code, "Address postal code", MAX_LENGTH)?,
            region: optional(region, "Address region", MAX_LENGTH)?,
            country: required(country, "Address country", MAX_LENGTH)?,
            is_verified,
        })
    }

    pub fn street(&self) -> &str {
        &self.street
    }

    pub fn locality(&self) -> &str {
        &self.locality
    }

    pub fn postal_code(&self) -> Option<&str> {
        self.postal_code.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    /// Non-empty lines of the address, joined by newlines.
    pub fn formatted(&self) -> String {
        let mut lines = vec![self.street.clone()];
        let mut locality_line = self.locality.clone();
        if let Some(region) = &self.region {
            locality_line.push_str(&format!(", {region}"));
        }
        if let Some(postal_code) = &self.postal_code {
            locality_line.push_str(&format!(" {postal_code}"));
        }
        lines.push(locality_line);
        lines.push(self.country.clone());
        lines.join("\n")
    }
}

impl Contact for Address {
    fn is_verified(&self) -> bool {
        self.is_verified
    }
}

impl ValueObject for Address {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_requires_local_and_dotted_domain() {
        assert!(Email::try_new("alice@example.com", false).is_ok());
        assert!(Email::try_new("alice@example", false).is_err());
        assert!(Email::try_new("@example.com", false).is_err());
        assert!(Email::try_new("alice@@example.com", false).is_err());
        assert!(Email::try_new("alice@example..com", false).is_err());
        assert!(Email::try_new("   ", false).is_err());
    }

    #[test]
    fn email_equality_includes_verification_flag() {
        let unverified = Email::try_new("alice@example.com", false).unwrap();
        let verified = Email::try_new("alice@example.com", true).unwrap();
        assert_ne!(unverified, verified);
        assert!(verified.is_verified());
    }

    #[test]
    fn phone_validates_country_code_number_and_extension() {
        let phone = Phone::try_new(Some("CA"), "+1 (514) 845-4636", Some("123"), false).unwrap();
        assert_eq!(phone.country_code(), Some("CA"));
        assert_eq!(phone.extension(), Some("123"));

        assert!(Phone::try_new(Some("CAN"), "+15148454636", None, false).is_err());
        assert!(Phone::try_new(Some("ca"), "+15148454636", None, false).is_err());
        assert!(Phone::try_new(None, "call-me-maybe", None, false).is_err());
        assert!(Phone::try_new(None, "+15148454636", Some("12a"), false).is_err());
        assert!(Phone::try_new(None, "123456789012345678901", None, false).is_err());
    }

    #[test]
    fn address_requires_street_locality_country() {
        assert!(Address::try_new("", "Montreal", None, None, "Canada", false).is_err());
        assert!(Address::try_new("150 Saint-Catherine St W", "", None, None, "Canada", false).is_err());
        assert!(Address::try_new("150 Saint-Catherine St W", "Montreal", None, None, "", false).is_err());
    }

    #[test]
    fn address_formats_non_empty_lines() {
        let address = Address::try_new(
            "150 Saint-Catherine St W",
            "Montreal",
            Some("H2X 3Y2"),
            Some("QC"),
            "Canada",
            false,
        )
        .unwrap();
        assert_eq!(
            address.formatted(),
            "150 Saint-Catherine St W\nMontreal, QC H2X 3Y2\nCanada"
        );

        let minimal = Address::try_new("1 Main St", "Springfield", None, None, "USA", false).unwrap();
        assert_eq!(minimal.formatted(), "1 Main St\nSpringfield\nUSA");
    }
}
