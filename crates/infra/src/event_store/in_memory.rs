use std::collections::BTreeMap;
use std::sync::RwLock;

use stockledger_core::{ExpectedVersion, StockKey};

use super::store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// In-memory append-only event store.
///
/// One lock over all streams: the version check and the append happen under the
/// same write guard, so appends to a stream are serializable.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<BTreeMap<StockKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };

        // All events must target the same stream.
        let key = first.stream;
        if let Some(idx) = events.iter().position(|e| e.stream != key) {
            return Err(EventStoreError::StreamMismatch(format!(
                "batch contains multiple streams (index {idx})"
            )));
        }

        let mut streams = self.streams.write().map_err(|_| EventStoreError::Poisoned)?;

        let stream = streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "stream {key}: expected {expected_version:?}, found {current}"
            )));
        }

        // Assign sequence numbers and append (append-only).
        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                stream: e.stream,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(&self, stream: StockKey) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(streams.get(&stream).cloned().unwrap_or_default())
    }

    fn streams(&self) -> Result<Vec<StockKey>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(streams.iter().filter(|(_, s)| !s.is_empty()).map(|(k, _)| *k).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use stockledger_core::{ItemId, LocationId};
    use uuid::Uuid;

    fn key() -> StockKey {
        StockKey::new(ItemId::new(), LocationId::new())
    }

    fn event(stream: StockKey) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            stream,
            event_type: "stock.test".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[test]
    fn append_assigns_contiguous_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let k = key();
        store.append(vec![event(k), event(k)], ExpectedVersion::Exact(0)).unwrap();
        let more = store.append(vec![event(k)], ExpectedVersion::Exact(2)).unwrap();
        assert_eq!(more[0].sequence_number, 3);

        let seqs: Vec<u64> = store.load_stream(k).unwrap().iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn stale_version_is_rejected_without_writing() {
        let store = InMemoryEventStore::new();
        let k = key();
        store.append(vec![event(k)], ExpectedVersion::Exact(0)).unwrap();

        let err = store.append(vec![event(k)], ExpectedVersion::Exact(0)).unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.load_stream(k).unwrap().len(), 1);
    }

    #[test]
    fn mixed_stream_batches_are_rejected() {
        let store = InMemoryEventStore::new();
        let err = store.append(vec![event(key()), event(key())], ExpectedVersion::Any).unwrap_err();
        assert!(matches!(err, EventStoreError::StreamMismatch(_)));
        assert!(store.streams().unwrap().is_empty());
    }

    #[test]
    fn load_all_orders_by_stream_then_sequence() {
        let store = InMemoryEventStore::new();
        let (a, b) = (key(), key());
        store.append(vec![event(b)], ExpectedVersion::Any).unwrap();
        store.append(vec![event(a), event(a)], ExpectedVersion::Any).unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 3);
        let order: Vec<(StockKey, u64)> = all.iter().map(|e| (e.stream, e.sequence_number)).collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
    }
}
