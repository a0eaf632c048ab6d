use chrono::{DateTime, Utc};

use stockledger_core::{LocationId, LotId, StockKey};
use stockledger_events::{EventEnvelope, Projection};
use stockledger_inventory::{LedgerEvent, Lot};

use super::ProjectionError;
use super::cursor::{CursorCheck, StreamCursors};
use crate::read_model::KeyedStore;

/// Every lot with its current remaining quantity, by lot id.
#[derive(Debug)]
pub struct LotIndexProjection<S>
where
    S: KeyedStore<LotId, Lot>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> LotIndexProjection<S>
where
    S: KeyedStore<LotId, Lot>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, lot_id: &LotId) -> Option<Lot> {
        self.store.get(lot_id)
    }

    /// Lots with stock left that expire before `before`, soonest first.
    pub fn expiring(&self, location: Option<LocationId>, before: DateTime<Utc>) -> Vec<Lot> {
        let mut lots: Vec<Lot> = self
            .store
            .list()
            .into_iter()
            .filter(|l| l.quantity_remaining > 0)
            .filter(|l| location.is_none_or(|loc| l.location_id == loc))
            .filter(|l| l.expires_at.is_some_and(|exp| exp < before))
            .collect();
        lots.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.lot_id.cmp(&b.lot_id)));
        lots
    }

    pub fn position(&self, stream: StockKey) -> u64 {
        self.cursors.position(stream)
    }

    fn adjust_remaining(&self, lot_id: &LotId, delta: i64) {
        if let Some(mut lot) = self.store.get(lot_id) {
            lot.quantity_remaining += delta;
            self.store.upsert(*lot_id, lot);
        }
    }
}

impl<S> Projection for LotIndexProjection<S>
where
    S: KeyedStore<LotId, Lot>,
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
            LedgerEvent::LotReceived(e) => self.store.upsert(e.lot.lot_id, e.lot.clone()),
            LedgerEvent::StockAllocated(e) => {
                for a in &e.allocations {
                    self.adjust_remaining(&a.lot_id, -a.quantity_allocated);
                }
            }
            LedgerEvent::AllocationReleased(e) => {
                self.adjust_remaining(&e.allocation.lot_id, e.allocation.quantity_allocated);
            }
            LedgerEvent::StockIssued(e) => {
                for d in &e.lot_draws {
                    self.adjust_remaining(&d.lot_id, -d.quantity);
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
