//! Role reference contract.
//!
//! Users hold weak references (`RoleId`) to roles; the Role aggregate's own
//! lifecycle lives elsewhere. What the User aggregate reads from a role is
//! its id and, through it, its tenant.

use serde::{Deserialize, Serialize};

use keyfort_core::{RoleId, TenantId};

use crate::values::{Description, DisplayName, UniqueName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    unique_name: UniqueName,
    display_name: Option<DisplayName>,
    description: Option<Description>,
}

impl Role {
    pub fn new(id: RoleId, unique_name: UniqueName) -> Self {
        Self {
            id,
            unique_name,
            display_name: None,
            description: None,
        }
    }

    pub fn with_display_name(mut self, display_name: DisplayName) -> Self {
        self.display_name = Some(display_name);
        self
    }

    pub fn with_description(mut self, description: Description) -> Self {
        self.description = Some(description);
        self
    }

    pub fn id(&self) -> &RoleId {
        &self.id
    }

    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.id.tenant_id()
    }

    pub fn unique_name(&self) -> &UniqueName {
        &self.unique_name
    }

    pub fn display_name(&self) -> Option<&DisplayName> {
        self.display_name.as_ref()
    }

    pub fn description(&self) -> Option<&Description> {
        self.description.as_ref()
    }
}
