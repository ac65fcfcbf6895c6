use std::collections::HashMap;
use std::sync::RwLock;

use shipadvice_core::{ExpectedVersion, TenantId};

use super::r#trait::{
    EventStore, EventStoreError, StoredEvent, StreamKey, UncommittedEvent, stream_version,
};

/// Event store held in process memory; used by tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of streams across all tenants.
    pub fn stream_count(&self) -> usize {
        self.streams.read().map_or(0, |streams| streams.len())
    }
}

/// The one stream a batch targets, with a single aggregate type.
fn batch_target(events: &[UncommittedEvent]) -> Result<(StreamKey, &str), EventStoreError> {
    let first = &events[0];
    let key = first.stream_key();
    for (idx, e) in events.iter().enumerate().skip(1) {
        if e.tenant_id != key.tenant_id {
            return Err(EventStoreError::TenantIsolation(format!(
                "event {idx} of the batch belongs to tenant {}",
                e.tenant_id
            )));
        }
        if e.aggregate_id != key.aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "event {idx} of the batch targets aggregate {}",
                e.aggregate_id
            )));
        }
        if e.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "event {idx} of the batch is a {}",
                e.aggregate_type
            )));
        }
    }
    Ok((key, first.aggregate_type.as_str()))
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (key, aggregate_type) = batch_target(&events)?;

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("event store lock poisoned".to_string()))?;
        let stream = streams.entry(key).or_default();

        let current = stream_version(stream);
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "stream {} is at {current}, expected {expected_version:?}",
                key.aggregate_id
            )));
        }
        if let Some(existing) = stream.first().filter(|e| e.event.aggregate_type != aggregate_type) {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream {} holds {}, not {aggregate_type}",
                key.aggregate_id, existing.event.aggregate_type
            )));
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(current + 1..)
            .map(|(event, sequence_number)| StoredEvent {
                sequence_number,
                event,
            })
            .collect();
        stream.extend(committed.iter().cloned());
        Ok(committed)
    }

    fn load_stream(&self, key: StreamKey) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("event store lock poisoned".to_string()))?;
        Ok(streams.get(&key).cloned().unwrap_or_default())
    }

    fn stream_keys(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
    ) -> Result<Vec<StreamKey>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("event store lock poisoned".to_string()))?;
        let mut keys: Vec<StreamKey> = streams
            .iter()
            .filter(|(key, stream)| {
                key.tenant_id == tenant_id
                    && stream
                        .first()
                        .is_some_and(|e| e.event.aggregate_type == aggregate_type)
            })
            .map(|(key, _)| *key)
            .collect();
        keys.sort_by_key(|k| k.aggregate_id);
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shipadvice_core::AggregateId;
    use uuid::Uuid;

    fn key(tenant_id: TenantId, aggregate_id: AggregateId) -> StreamKey {
        StreamKey {
            tenant_id,
            aggregate_id,
        }
    }

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "stock.transfer.created".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn append_assigns_sequence_numbers_from_current_version() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();

        let first = store
            .append(
                vec![event(tenant_id, aggregate_id, "stock.transfer")],
                ExpectedVersion::Exact(0),
            )
            .unwrap();
        assert_eq!(first[0].sequence_number, 1);

        let next = store
            .append(
                vec![
                    event(tenant_id, aggregate_id, "stock.transfer"),
                    event(tenant_id, aggregate_id, "stock.transfer"),
                ],
                ExpectedVersion::Exact(1),
            )
            .unwrap();
        assert_eq!(next.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(store.load_stream(key(tenant_id, aggregate_id)).unwrap().len(), 3);
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();
        store
            .append(
                vec![event(tenant_id, aggregate_id, "stock.transfer")],
                ExpectedVersion::Exact(0),
            )
            .unwrap();

        let err = store
            .append(
                vec![event(tenant_id, aggregate_id, "stock.transfer")],
                ExpectedVersion::Exact(0),
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn streams_are_tenant_scoped() {
        let store = InMemoryEventStore::new();
        let (t1, t2) = (TenantId::new(), TenantId::new());
        let aggregate_id = AggregateId::new();
        store
            .append(vec![event(t1, aggregate_id, "stock.transfer")], ExpectedVersion::Any)
            .unwrap();

        assert!(store.load_stream(key(t2, aggregate_id)).unwrap().is_empty());
        assert_eq!(store.stream_count(), 1);

        let err = store
            .append(
                vec![
                    event(t1, aggregate_id, "stock.transfer"),
                    event(t2, aggregate_id, "stock.transfer"),
                ],
                ExpectedVersion::Any,
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::TenantIsolation(_)));
    }

    #[test]
    fn aggregate_type_is_stable_across_a_stream() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();
        store
            .append(
                vec![event(tenant_id, aggregate_id, "stock.transfer")],
                ExpectedVersion::Any,
            )
            .unwrap();

        let err = store
            .append(
                vec![event(tenant_id, aggregate_id, "invoicing.invoice")],
                ExpectedVersion::Any,
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[test]
    fn stream_keys_filter_by_tenant_and_aggregate_type() {
        let store = InMemoryEventStore::new();
        let (tenant_id, other) = (TenantId::new(), TenantId::new());
        let (c1, c2, transfer) = (AggregateId::new(), AggregateId::new(), AggregateId::new());
        for (tenant, id, kind) in [
            (tenant_id, c2, "parties.contact"),
            (tenant_id, c1, "parties.contact"),
            (tenant_id, transfer, "stock.transfer"),
            (other, AggregateId::new(), "parties.contact"),
        ] {
            store
                .append(vec![event(tenant, id, kind)], ExpectedVersion::Exact(0))
                .unwrap();
        }

        let mut expected = vec![key(tenant_id, c1), key(tenant_id, c2)];
        expected.sort_by_key(|k| k.aggregate_id);
        assert_eq!(
            store.stream_keys(tenant_id, "parties.contact").unwrap(),
            expected
        );
        assert!(store.stream_keys(TenantId::new(), "parties.contact").unwrap().is_empty());
    }
}
