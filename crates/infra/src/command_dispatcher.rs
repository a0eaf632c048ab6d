//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the key's journal stream
//!   ↓
//! 2. Rehydrate the aggregate (apply historical events)
//!   ↓
//! 3. Handle the command (pure decision logic, produces events)
//!   ↓
//! 4. Append to the store (optimistic concurrency check on the stream version)
//!   ↓
//! 5. Publish committed envelopes to the bus
//! ```
//!
//! A concurrency failure at step 4 restarts the whole pipeline from step 1, up to
//! `max_conflict_retries` times. Nothing decided by a losing attempt is ever visible:
//! its events were never appended.
//!
//! This module contains no IO itself; it composes infrastructure traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use stockledger_core::{Aggregate, DomainError, ExpectedVersion, StockKey};
use stockledger_events::{Event, EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure that survived every retry.
    #[error("concurrent modification: {0}")]
    Concurrency(String),
    /// The aggregate rejected the command (deterministic).
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    /// Loading from or persisting to the event store failed.
    #[error("event store error: {0}")]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Result of a successful dispatch.
#[derive(Debug)]
pub struct Dispatched<A: Aggregate> {
    /// Aggregate state after the new events were applied.
    pub aggregate: A,
    pub events: Vec<A::Event>,
    pub committed: Vec<StoredEvent>,
    /// Conflict retries spent before the append succeeded.
    pub retries: u32,
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before publication: if append fails, nothing is published.
/// Publication is best-effort after a successful append (the journal is the source
/// of truth; consumers can always replay it).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    max_conflict_retries: u32,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate from its stream without dispatching anything.
    pub fn load<A>(&self, stream: StockKey, make_aggregate: impl FnOnce(StockKey) -> A) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(stream)?;
        validate_loaded_stream(stream, &history)?;
        let mut aggregate = make_aggregate(stream);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command through the full pipeline, retrying on conflicts.
    ///
    /// Each retry re-executes from scratch: reload, rehydrate, decide, append.
    pub fn dispatch<A>(
        &self,
        stream: StockKey,
        command: &A::Command,
        make_aggregate: impl Fn(StockKey) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let mut retries = 0;
        loop {
            match self.try_dispatch(stream, command, &make_aggregate) {
                Ok(mut dispatched) => {
                    dispatched.retries = retries;
                    return Ok(dispatched);
                }
                Err(DispatchError::Concurrency(msg)) if retries < self.max_conflict_retries => {
                    retries += 1;
                    warn!(%stream, retries, reason = %msg, "conflicting append, retrying command");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn try_dispatch<A>(
        &self,
        stream: StockKey,
        command: &A::Command,
        make_aggregate: &impl Fn(StockKey) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        // 1) Load + 2) rehydrate
        let mut aggregate = self.load(stream, make_aggregate)?;
        let expected = ExpectedVersion::Exact(aggregate.version());

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                aggregate,
                events: decided,
                committed: vec![],
                retries: 0,
            });
        }

        // 4) Persist (append-only, optimistic)
        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(stream, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;
        let committed = self.store.append(uncommitted, expected)?;
        for ev in &decided {
            aggregate.apply(ev);
        }
        debug!(%stream, events = committed.len(), version = aggregate.version(), "events committed");

        // 5) Publish committed events (after append)
        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                warn!(%stream, sequence = stored.sequence_number, error = ?err, "event publication failed");
            }
        }

        Ok(Dispatched {
            aggregate,
            events: decided,
            committed,
            retries: 0,
        })
    }
}

fn validate_loaded_stream(stream: StockKey, history: &[StoredEvent]) -> Result<(), DispatchError> {
    // Guard against a backend returning foreign or out-of-order events.
    let mut last = 0u64;
    for (idx, e) in history.iter().enumerate() {
        if e.stream != stream {
            return Err(DispatchError::Store(EventStoreError::StreamMismatch(format!(
                "loaded stream {stream} contains event for {} at index {idx}",
                e.stream
            ))));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(format!("{} #{}: {e}", stored.stream, stored.sequence_number)))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
