//! The identifier scheme shared by every aggregate type.
//!
//! Two layers compose here:
//!
//! - [`TenantId`] and [`EntityId`] are validated string parts. An entity id is
//!   unique within its tenant (or globally when no tenant applies).
//! - [`UserId`], [`RoleId`] and [`SessionId`] are **aggregate stream keys**:
//!   the composition `(Option<TenantId>, EntityId)` rendered as one opaque
//!   string by joining the parts with [`ID_SEPARATOR`]. Serialization and
//!   parsing are exact inverses of each other.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Reserved character joining the tenant and entity parts of a stream key.
///
/// Id parts may never contain it; parsing rejects keys with more than one.
pub const ID_SEPARATOR: char = ':';

const MAX_ID_LENGTH: usize = 255;

fn validate_part(value: String, kind: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::invalid_id(format!("{kind}: value cannot be empty")));
    }
    if trimmed.len() > MAX_ID_LENGTH {
        return Err(DomainError::invalid_id(format!(
            "{kind}: value exceeds {MAX_ID_LENGTH} characters"
        )));
    }
    if trimmed.contains(ID_SEPARATOR) {
        return Err(DomainError::invalid_id(format!(
            "{kind}: value cannot contain '{ID_SEPARATOR}'"
        )));
    }
    Ok(trimmed.to_string())
}

/// Identifier of a tenant (multi-tenant isolation boundary).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

/// Identifier of an entity within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

macro_rules! impl_id_part {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new random identifier (UUIDv7, time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid.to_string())
            }

            /// Construct from an opaque string, validating the part rules
            /// (trimmed, non-empty, bounded, no separator).
            pub fn try_new(value: impl Into<String>) -> Result<Self, DomainError> {
                Ok(Self(validate_part(value.into(), $name)?))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self::from_uuid(value)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::try_new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::try_new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_id_part!(TenantId, "TenantId");
impl_id_part!(EntityId, "EntityId");

macro_rules! impl_aggregate_key {
    ($t:ident, $name:literal) => {
        #[doc = concat!("Stream key addressing one ", $name, " aggregate's event history.")]
        ///
        /// Composes an optional tenant part and a required entity part. The
        /// rendered form is `tenant:entity` inside a tenant and `entity`
        /// otherwise; `parse` is the exact inverse of `to_string`.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $t {
            tenant_id: Option<TenantId>,
            entity_id: EntityId,
        }

        impl $t {
            /// New key with a random entity part.
            pub fn new(tenant_id: Option<TenantId>) -> Self {
                Self {
                    tenant_id,
                    entity_id: EntityId::new(),
                }
            }

            pub fn from_parts(tenant_id: Option<TenantId>, entity_id: EntityId) -> Self {
                Self {
                    tenant_id,
                    entity_id,
                }
            }

            pub fn tenant_id(&self) -> Option<&TenantId> {
                self.tenant_id.as_ref()
            }

            pub fn entity_id(&self) -> &EntityId {
                &self.entity_id
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match &self.tenant_id {
                    Some(tenant_id) => {
                        write!(f, "{}{ID_SEPARATOR}{}", tenant_id, self.entity_id)
                    }
                    None => core::fmt::Display::fmt(&self.entity_id, f),
                }
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut segments = s.split(ID_SEPARATOR);
                let first = segments.next().unwrap_or_default();
                let second = segments.next();
                if segments.next().is_some() {
                    return Err(DomainError::invalid_id(format!(
                        "{}: more than two segments in '{s}'",
                        $name
                    )));
                }
                match second {
                    Some(entity) => Ok(Self {
                        tenant_id: Some(TenantId::try_new(first)?),
                        entity_id: EntityId::try_new(entity)?,
                    }),
                    None => Ok(Self {
                        tenant_id: None,
                        entity_id: EntityId::try_new(first)?,
                    }),
                }
            }
        }

        impl Serialize for $t {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $t {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = String::deserialize(deserializer)?;
                value.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_aggregate_key!(UserId, "User");
impl_aggregate_key!(RoleId, "Role");
impl_aggregate_key!(SessionId, "Session");
