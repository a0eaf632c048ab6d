//! Projection implementations (read model builders).
//!
//! Projections consume committed ledger events and build query-optimized read
//! models. All projections are:
//! - **Rebuildable**: reconstructed by replaying the journal
//! - **Idempotent**: envelopes at or below a stream's cursor are skipped
//! - **Gap-checked**: an envelope past `cursor + 1` is rejected
//!
//! `ReadModels` bundles them and keeps them caught up with the event store.

pub mod allocation_index;
pub mod cursor;
pub mod lot_index;
pub mod stock_levels;

use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use stockledger_core::{AllocationId, LotId, StockKey};
use stockledger_events::{EventEnvelope, Projection};
use stockledger_inventory::{Allocation, LedgerEvent, Lot};

use crate::event_store::{EventStore, EventStoreError};
use crate::read_model::InMemoryKeyedStore;

pub use allocation_index::AllocationIndexProjection;
pub use cursor::{CursorCheck, StreamCursors};
pub use lot_index::LotIndexProjection;
pub use stock_levels::{InventoryValuation, StockLevel, StockLevelProjection};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("non-monotonic sequence on {stream}: last applied {last}, found {found}")]
    NonMonotonicSequence { stream: StockKey, last: u64, found: u64 },
    #[error("event for {found} delivered on stream {stream}")]
    StreamMismatch { stream: StockKey, found: StockKey },
    #[error("failed to deserialize ledger event: {0}")]
    Deserialize(String),
    #[error("event store error: {0}")]
    Store(#[from] EventStoreError),
    #[error("read model lock poisoned")]
    Poisoned,
}

pub type StockLevels = StockLevelProjection<InMemoryKeyedStore<StockKey, StockLevel>>;
pub type AllocationIndex = AllocationIndexProjection<InMemoryKeyedStore<AllocationId, Allocation>>;
pub type LotIndex = LotIndexProjection<InMemoryKeyedStore<LotId, Lot>>;

/// The engine's read models, applied together.
///
/// Writers on different keys commit concurrently, so envelopes are not fed in
/// from the dispatcher. Instead each writer calls [`ReadModels::catch_up`] after a
/// commit, which reads the stream past the lowest cursor and applies in order.
#[derive(Debug, Default)]
pub struct ReadModels {
    pub stock: StockLevels,
    pub allocations: AllocationIndex,
    pub lots: LotIndex,
    apply_lock: Mutex<()>,
}

impl Default for StockLevels {
    fn default() -> Self {
        Self::new(InMemoryKeyedStore::new())
    }
}

impl Default for AllocationIndex {
    fn default() -> Self {
        Self::new(InMemoryKeyedStore::new())
    }
}

impl Default for LotIndex {
    fn default() -> Self {
        Self::new(InMemoryKeyedStore::new())
    }
}

impl ReadModels {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, stream: StockKey) -> u64 {
        self.stock
            .position(stream)
            .min(self.allocations.position(stream))
            .min(self.lots.position(stream))
    }

    /// Apply everything committed on `stream` that the read models have not seen.
    ///
    /// Returns the number of envelopes applied.
    pub fn catch_up<S: EventStore>(&self, store: &S, stream: StockKey) -> Result<usize, ProjectionError> {
        let _guard = self.apply_lock.lock().map_err(|_| ProjectionError::Poisoned)?;
        let from = self.position(stream);
        let mut applied = 0;
        for stored in store.load_stream(stream)?.iter().filter(|e| e.sequence_number > from) {
            let envelope = stored
                .to_typed_envelope::<LedgerEvent>()
                .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
            self.apply(&envelope)?;
            applied += 1;
        }
        if applied > 0 {
            debug!(stream = %stream, from, applied, "read models caught up");
        }
        Ok(applied)
    }

    /// [`ReadModels::catch_up`] on every stream in the store.
    pub fn catch_up_all<S: EventStore>(&self, store: &S) -> Result<usize, ProjectionError> {
        let mut applied = 0;
        for stream in store.streams()? {
            applied += self.catch_up(store, stream)?;
        }
        Ok(applied)
    }

    /// Drop every read model and replay the whole journal.
    pub fn rebuild_all<S: EventStore>(&self, store: &S) -> Result<usize, ProjectionError> {
        let _guard = self.apply_lock.lock().map_err(|_| ProjectionError::Poisoned)?;
        let envelopes = store
            .load_all()?
            .iter()
            .map(|e| e.to_typed_envelope::<LedgerEvent>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
        let count = envelopes.len();
        self.stock.rebuild_from_scratch(envelopes.iter().cloned())?;
        self.allocations.rebuild_from_scratch(envelopes.iter().cloned())?;
        self.lots.rebuild_from_scratch(envelopes)?;
        debug!(events = count, "read models rebuilt from journal");
        Ok(count)
    }

    fn apply(&self, envelope: &EventEnvelope<LedgerEvent>) -> Result<(), ProjectionError> {
        self.stock.apply(envelope)?;
        self.allocations.apply(envelope)?;
        self.lots.apply(envelope)
    }
}
