use serde::{Deserialize, Serialize};

use stockledger_core::{Money, StockKey};
use stockledger_events::{EventEnvelope, Projection};
use stockledger_inventory::{LedgerEvent, StockItem, StockItemView};

use super::ProjectionError;
use super::cursor::{CursorCheck, StreamCursors};
use crate::read_model::KeyedStore;

/// Stock level read model for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub stock: StockItem,
    /// Unallocated quantity sitting in lots.
    pub lot_backed_quantity: i64,
    pub version: u64,
}

impl StockLevel {
    pub fn view(&self) -> StockItemView {
        StockItemView {
            stock: self.stock.clone(),
            quantity_available: self.stock.quantity_available(),
            lot_drift: self.stock.quantity_available() - self.lot_backed_quantity,
            version: self.version,
        }
    }
}

/// Total carrying value over a set of stock items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryValuation {
    pub total_value: Money,
    pub total_units: i64,
    pub item_count: usize,
}

/// Stock levels per key, rebuilt from the journal.
#[derive(Debug)]
pub struct StockLevelProjection<S>
where
    S: KeyedStore<StockKey, StockLevel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> StockLevelProjection<S>
where
    S: KeyedStore<StockKey, StockLevel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, key: &StockKey) -> Option<StockLevel> {
        self.store.get(key)
    }

    /// Levels, optionally for one location, in key order.
    pub fn list(&self, location: Option<stockledger_core::LocationId>) -> Vec<StockLevel> {
        let mut levels: Vec<StockLevel> = self
            .store
            .list()
            .into_iter()
            .filter(|l| location.is_none_or(|loc| l.stock.location_id == loc))
            .collect();
        levels.sort_by_key(|l| l.stock.key());
        levels
    }

    pub fn valuation(&self, location: Option<stockledger_core::LocationId>) -> InventoryValuation {
        self.list(location)
            .iter()
            .fold(InventoryValuation::default(), |mut acc, l| {
                acc.total_value = acc.total_value.plus(l.stock.inventory_value);
                acc.total_units += l.stock.quantity_on_hand;
                acc.item_count += 1;
                acc
            })
    }

    pub fn position(&self, stream: StockKey) -> u64 {
        self.cursors.position(stream)
    }

    fn evolve(level: &mut StockLevel, event: &LedgerEvent) {
        let stock = &mut level.stock;
        match event {
            LedgerEvent::StockItemProvisioned(e) => {
                stock.policy = e.policy;
                stock.reorder_point = e.reorder_point;
                stock.reorder_quantity = e.reorder_quantity;
            }
            LedgerEvent::LotReceived(e) => {
                stock.add_value(e.lot.quantity_received, e.lot.unit_cost);
                level.lot_backed_quantity += e.lot.quantity_received;
            }
            LedgerEvent::StockAllocated(e) => {
                stock.quantity_reserved += e.quantity;
                level.lot_backed_quantity -= e.quantity;
            }
            LedgerEvent::AllocationReleased(e) => {
                stock.quantity_reserved -= e.allocation.quantity_allocated;
                level.lot_backed_quantity += e.allocation.quantity_allocated;
            }
            LedgerEvent::StockIssued(e) => {
                stock.quantity_reserved -= e.reserved_quantity();
                stock.remove_at_average(e.quantity);
                level.lot_backed_quantity -= e.lot_draws.iter().map(|d| d.quantity).sum::<i64>();
            }
            LedgerEvent::StockAdjusted(e) => {
                if e.quantity_delta > 0 {
                    let cost = e.unit_cost.unwrap_or(stock.average_cost);
                    stock.add_value(e.quantity_delta, cost);
                } else {
                    stock.remove_at_average(-e.quantity_delta);
                }
            }
            LedgerEvent::PolicyChanged(e) => stock.policy = e.policy,
            LedgerEvent::ReorderPlanUpdated(e) => {
                stock.reorder_point = e.reorder_point;
                stock.reorder_quantity = e.reorder_quantity;
            }
        }
    }
}

impl<S> Projection for StockLevelProjection<S>
where
    S: KeyedStore<StockKey, StockLevel>,
{
    type Payload = LedgerEvent;
    type Error = ProjectionError;

    fn apply(&self, envelope: &EventEnvelope<LedgerEvent>) -> Result<(), ProjectionError> {
        let key = envelope.stream();
        let seq = envelope.sequence_number();
        if self.cursors.check(key, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }
        let event = envelope.payload();
        if event.key() != key {
            return Err(ProjectionError::StreamMismatch { stream: key, found: event.key() });
        }

        let mut level = self.store.get(&key).unwrap_or_else(|| StockLevel {
            stock: StockItem::new(key, Default::default()),
            lot_backed_quantity: 0,
            version: 0,
        });
        Self::evolve(&mut level, event);
        level.version = seq;
        self.store.upsert(key, level);

        self.cursors.advance(key, seq);
        Ok(())
    }

    fn reset(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}
