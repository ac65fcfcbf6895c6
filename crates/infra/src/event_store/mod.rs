//! Append-only event store boundary.
//!
//! Tenant-scoped event streams, one per aggregate instance, with no storage
//! assumptions beyond ordering and optimistic concurrency.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{
    EventStore, EventStoreError, StoredEvent, StreamKey, UncommittedEvent, stream_version,
};
