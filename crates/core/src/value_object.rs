//! Value objects: compared by their attributes, never by identity.
//!
//! Payment-term policies and postal addresses are value objects: two policies
//! with the same flags are interchangeable.

/// Marker trait for immutable, value-compared domain objects.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
