use std::collections::BTreeSet;

use stockledger_core::{AllocationId, StockKey};
use stockledger_events::{EventEnvelope, Projection};
use stockledger_inventory::{Allocation, DemandRef, LedgerEvent};

use super::ProjectionError;
use super::cursor::{CursorCheck, StreamCursors};
use crate::read_model::KeyedStore;

/// Open allocations across all keys, for lookups by demand or allocation id.
#[derive(Debug)]
pub struct AllocationIndexProjection<S>
where
    S: KeyedStore<AllocationId, Allocation>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> AllocationIndexProjection<S>
where
    S: KeyedStore<AllocationId, Allocation>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, allocation_id: &AllocationId) -> Option<Allocation> {
        self.store.get(allocation_id)
    }

    /// Open allocations for a demand, in allocation order.
    pub fn for_demand(&self, demand_ref: &DemandRef) -> Vec<Allocation> {
        let mut open: Vec<Allocation> = self
            .store
            .list()
            .into_iter()
            .filter(|a| &a.demand_ref == demand_ref)
            .collect();
        open.sort_by(|a, b| {
            a.allocated_at
                .cmp(&b.allocated_at)
                .then_with(|| a.allocation_id.cmp(&b.allocation_id))
        });
        open
    }

    /// Keys holding open allocations for a demand.
    pub fn keys_for_demand(&self, demand_ref: &DemandRef) -> BTreeSet<StockKey> {
        self.for_demand(demand_ref)
            .iter()
            .map(|a| StockKey::new(a.item_id, a.location_id))
            .collect()
    }

    pub fn position(&self, stream: StockKey) -> u64 {
        self.cursors.position(stream)
    }
}

impl<S> Projection for AllocationIndexProjection<S>
where
    S: KeyedStore<AllocationId, Allocation>,
{
    type Payload = LedgerEvent;
    type Error = ProjectionError;

    fn apply(&self, envelope: &EventEnvelope<LedgerEvent>) -> Result<(), ProjectionError> {
        let key = envelope.stream();
        let seq = envelope.sequence_number();
        if self.cursors.check(key, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        match envelope.payload() {
            LedgerEvent::StockAllocated(e) => {
                for a in &e.allocations {
                    self.store.upsert(a.allocation_id, a.clone());
                }
            }
            LedgerEvent::AllocationReleased(e) => {
                self.store.remove(&e.allocation.allocation_id);
            }
            LedgerEvent::StockIssued(e) => {
                for c in &e.consumed {
                    self.store.remove(&c.allocation_id);
                    if let Some(residual) = &c.residual {
                        self.store.upsert(residual.allocation_id, residual.clone());
                    }
                }
            }
            _ => {}
        }

        self.cursors.advance(key, seq);
        Ok(())
    }

    fn reset(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}
