use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockledger_core::{ExpectedVersion, StockKey};
use stockledger_events::{Event, EventEnvelope};
use std::sync::Arc;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Lifecycle: a domain event decided by `handle()` is wrapped here with its stream
/// key and serialized payload, becomes a [`StoredEvent`] once the store assigns it a
/// sequence number, and is published as an [`EventEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub stream: StockKey,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream (assigned a sequence number).
///
/// Sequence numbers are per stream, start at 1, and never have gaps. The stream
/// version is the sequence number of its last event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub stream: StockKey,

    /// Monotonically increasing position in the stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into an envelope for publication.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.stream,
            self.event_type.clone(),
            self.occurred_at,
            self.sequence_number,
            self.payload.clone(),
        )
    }

    /// Deserialize the payload into a typed envelope.
    pub fn to_typed_envelope<E>(&self) -> Result<EventEnvelope<E>, EventStoreError>
    where
        E: serde::de::DeserializeOwned,
    {
        let payload: E = serde_json::from_value(self.payload.clone())
            .map_err(|e| EventStoreError::Serialization(format!("{}: {e}", self.event_type)))?;
        Ok(EventEnvelope::new(
            self.event_id,
            self.stream,
            self.event_type.clone(),
            self.occurred_at,
            self.sequence_number,
            payload,
        ))
    }
}

/// Event store operation error.
///
/// These are infrastructure errors (storage, concurrency) as opposed to domain
/// errors (validation, invariants).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("payload serialization failed: {0}")]
    Serialization(String),

    #[error("event store lock poisoned")]
    Poisoned,
}

/// Append-only journal store, one stream per `StockKey`.
///
/// `append()`:
/// - requires every event in the batch to target the same stream
/// - checks optimistic concurrency against the current stream version
/// - assigns sequence numbers starting at `current_version + 1`
/// - persists the batch atomically (all or nothing)
///
/// `load_stream()` returns events in sequence order; an unknown stream is empty.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn load_stream(&self, stream: StockKey) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Every known stream key, in key order.
    fn streams(&self) -> Result<Vec<StockKey>, EventStoreError>;

    /// Every stored event, ordered by (stream, sequence).
    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut all = Vec::new();
        for key in self.streams()? {
            all.extend(self.load_stream(key)?);
        }
        Ok(all)
    }
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

    fn load_stream(&self, stream: StockKey) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(stream)
    }

    fn streams(&self) -> Result<Vec<StockKey>, EventStoreError> {
        (**self).streams()
    }
}

impl UncommittedEvent {
    /// Convenience constructor from a typed domain event.
    ///
    /// Keeps infra decoupled from the domain while capturing the metadata needed to
    /// deserialize the payload later.
    pub fn from_typed<E>(stream: StockKey, event_id: Uuid, event: &E) -> Result<Self, EventStoreError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::Serialization(format!("{}: {e}", event.event_type())))?;

        Ok(Self {
            event_id,
            stream,
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
