//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values —
/// two instances with the same values are the same value. They validate
/// eagerly at construction and fail fast on invalid input, so a value that
/// exists is a value that is legal.
///
/// "Modifying" a value object means constructing a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
