use keyfort_core::TenantId;

use crate::EventEnvelope;

/// Helper trait for tenant-scoped messages.
///
/// Marks types with an associated (possibly absent) tenant id, so
/// infrastructure components can filter or validate messages by tenant
/// without knowing their payload type.
pub trait TenantScoped {
    fn tenant_id(&self) -> Option<&TenantId>;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> Option<&TenantId> {
        EventEnvelope::tenant_id(self)
    }
}
