use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use shipadvice_core::{AggregateId, ExpectedVersion, TenantId};
use std::sync::Arc;

/// Identifies one stream: a single aggregate instance of a single tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
}

/// Serialized domain event waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    /// Stream name, e.g. `stock.transfer`. Fixed for the life of a stream.
    pub aggregate_type: String,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl UncommittedEvent {
    /// Serialize a typed domain event for `aggregate_type`'s stream.
    pub fn from_typed<E>(
        key: StreamKey,
        aggregate_type: impl Into<String>,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: shipadvice_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("{}: {e}", event.event_type()))
        })?;

        Ok(Self {
            event_id: Uuid::now_v7(),
            tenant_id: key.tenant_id,
            aggregate_id: key.aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }

    pub fn stream_key(&self) -> StreamKey {
        StreamKey {
            tenant_id: self.tenant_id,
            aggregate_id: self.aggregate_id,
        }
    }
}

/// An event once it has a position in its stream.
///
/// Positions start at 1; the last one is the stream version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub sequence_number: u64,
    #[serde(flatten)]
    pub event: UncommittedEvent,
}

impl StoredEvent {
    pub fn payload(&self) -> &JsonValue {
        &self.event.payload
    }

    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }
}

/// Version of a loaded stream; 0 when it is empty.
pub fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map_or(0, |e| e.sequence_number)
}

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// Append-only store of tenant-scoped streams.
///
/// An append batch targets exactly one stream and is written whole or not at
/// all, after the expected version has been checked. Loading a stream that
/// was never written returns an empty vector.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn load_stream(&self, key: StreamKey) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Streams of one tenant holding `aggregate_type`, in aggregate id order.
    fn stream_keys(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
    ) -> Result<Vec<StreamKey>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(&self, key: StreamKey) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(key)
    }

    fn stream_keys(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
    ) -> Result<Vec<StreamKey>, EventStoreError> {
        (**self).stream_keys(tenant_id, aggregate_type)
    }
}
