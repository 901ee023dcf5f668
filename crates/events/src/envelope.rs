use serde::{Deserialize, Serialize};
use uuid::Uuid;

use keyfort_core::TenantId;

/// Envelope for an event, carrying tenant + stream metadata.
///
/// This is the unit appended to an aggregate's event stream.
///
/// Notes:
/// - `tenant_id` is optional: identity aggregates may live outside any
///   tenant, and the stream key (`aggregate_id`) already encodes the
///   tenant when there is one.
/// - **Append-only**: `sequence_number` increases monotonically per stream.
/// - `payload` is the domain event itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: Option<TenantId>,

    /// Rendered stream key of the aggregate this event belongs to.
    aggregate_id: String,
    aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        tenant_id: Option<TenantId>,
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            tenant_id,
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
