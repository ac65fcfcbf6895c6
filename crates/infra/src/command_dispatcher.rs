//! Load → rehydrate → decide → append, for every aggregate in the workspace.
//!
//! Tenant isolation and optimistic concurrency are enforced here once; the
//! aggregates stay pure.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use shipadvice_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};

use crate::event_store::{
    EventStore, EventStoreError, StoredEvent, StreamKey, UncommittedEvent, stream_version,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale version on append, or a command racing another writer.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    /// A loaded stream holds events of another tenant or aggregate.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("not found")]
    NotFound,
    /// A stored payload no longer matches the aggregate's event type.
    #[error("event deserialization failed: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => Self::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => Self::TenantIsolation(msg),
            other => Self::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::InvariantViolation(msg) => Self::InvariantViolation(msg),
            DomainError::Conflict(msg) => Self::Concurrency(msg),
            DomainError::NotFound => Self::NotFound,
        }
    }
}

/// For callers behind a domain-level trait (invoicing hooks, lookups).
impl From<DispatchError> for DomainError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Concurrency(msg) => DomainError::Conflict(msg),
            // Another tenant's records do not exist from the caller's side.
            DispatchError::TenantIsolation(_) | DispatchError::NotFound => DomainError::NotFound,
            DispatchError::Validation(msg) => DomainError::Validation(msg),
            DispatchError::InvariantViolation(msg) | DispatchError::Deserialize(msg) => {
                DomainError::InvariantViolation(msg)
            }
            DispatchError::Store(e) => DomainError::InvariantViolation(e.to_string()),
        }
    }
}

/// Runs commands against event-sourced aggregates kept in `S`.
///
/// Events are persisted before `dispatch` returns. A version mismatch on
/// append surfaces as [`DispatchError::Concurrency`] and nothing is written.
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
    serial: Mutex<()>,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            serial: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Exclusive write section shared by every service on this dispatcher.
    ///
    /// For rules that read many streams before appending to one, e.g. a
    /// value unique across all contacts of a tenant.
    pub fn serialize_writes(&self) -> Result<MutexGuard<'_, ()>, DispatchError> {
        self.serial
            .lock()
            .map_err(|_| DispatchError::InvariantViolation("serialized write lock poisoned".to_string()))
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Handle `command` on the aggregate stored under `aggregate_type`.
    ///
    /// `make_aggregate` builds the empty instance to rehydrate, e.g.
    /// `Transfer::empty(id)`. A command that decides nothing returns an empty
    /// vector and writes nothing.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: shipadvice_events::Event + Serialize + DeserializeOwned,
    {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };
        let aggregate_type = aggregate_type.into();

        let history = self.history(key)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));
        let aggregate = rehydrate(make_aggregate(tenant_id, aggregate_id), &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            debug!(%tenant_id, %aggregate_id, %aggregate_type, "command decided no events");
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(key, aggregate_type.as_str(), ev))
            .collect::<Result<Vec<_>, _>>()?;
        let committed = self.store.append(uncommitted, expected)?;

        debug!(
            %tenant_id,
            %aggregate_id,
            %aggregate_type,
            events = committed.len(),
            version = stream_version(&committed),
            "command dispatched"
        );
        Ok(committed)
    }

    /// Current state of an aggregate. Never-created aggregates come back as
    /// `make_aggregate`'s empty state.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };
        let history = self.history(key)?;
        rehydrate(make_aggregate(tenant_id, aggregate_id), &history)
    }

    /// Stream of `key`, checked to belong to it and to be strictly ordered.
    fn history(&self, key: StreamKey) -> Result<Vec<StoredEvent>, DispatchError> {
        let stream = self.store.load_stream(key)?;

        let mut last = 0u64;
        for stored in &stream {
            if stored.event.stream_key() != key {
                return Err(DispatchError::TenantIsolation(format!(
                    "event {} does not belong to stream {}",
                    stored.event.event_id, key.aggregate_id
                )));
            }
            if stored.sequence_number <= last {
                return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                    "sequence {} follows {last} in stream {}",
                    stored.sequence_number, key.aggregate_id
                ))));
            }
            last = stored.sequence_number;
        }
        Ok(stream)
    }
}

fn rehydrate<A>(mut aggregate: A, history: &[StoredEvent]) -> Result<A, DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload().clone()).map_err(|e| {
            DispatchError::Deserialize(format!("{} #{}: {e}", stored.event_type(), stored.sequence_number))
        })?;
        aggregate.apply(&ev);
    }
    Ok(aggregate)
}
