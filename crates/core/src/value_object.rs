//! Value object trait: equality by value, not identity.
//!
//! Addresses, price quotes and admin patches are value objects: two instances
//! with the same attributes are interchangeable.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by value. To "modify" one, build a
/// new instance.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
