use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Money, MovementId, StockKey};
use stockledger_events::Event;

use crate::allocation::{Allocation, AllocationConsumption, DemandRef};
use crate::lot::{Lot, LotDraw};
use crate::movement::{Movement, MovementType};
use crate::stock::ConsumptionPolicy;

/// Event: StockItemProvisioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItemProvisioned {
    pub key: StockKey,
    pub policy: ConsumptionPolicy,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotReceived. Balances are on-hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotReceived {
    pub key: StockKey,
    pub lot: Lot,
    pub reference: Option<String>,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAllocated. Balances are available quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAllocated {
    pub key: StockKey,
    pub demand_ref: DemandRef,
    pub quantity: i64,
    pub allocations: Vec<Allocation>,
    pub available_before: i64,
    pub available_after: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AllocationReleased. One per released allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationReleased {
    pub key: StockKey,
    pub allocation: Allocation,
    pub available_before: i64,
    pub available_after: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockIssued.
///
/// `consumed` covers the reserved portion (lots were already drawn at allocation
/// time); `lot_draws` covers the unreserved portion; `unlotted_quantity` is stock
/// with no lot behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIssued {
    pub key: StockKey,
    pub quantity: i64,
    pub reference: Option<DemandRef>,
    pub consumed: Vec<AllocationConsumption>,
    pub lot_draws: Vec<LotDraw>,
    pub unlotted_quantity: i64,
    pub unit_cost: Money,
    pub cost_at_average: Money,
    pub cost_at_lots: Money,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub occurred_at: DateTime<Utc>,
}

impl StockIssued {
    pub fn reserved_quantity(&self) -> i64 {
        self.consumed.iter().map(|c| c.quantity).sum()
    }
}

/// Event: StockAdjusted. Never touches lots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub key: StockKey,
    pub quantity_delta: i64,
    pub unit_cost: Option<Money>,
    pub reason: String,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PolicyChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyChanged {
    pub key: StockKey,
    pub policy: ConsumptionPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReorderPlanUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderPlanUpdated {
    pub key: StockKey,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    StockItemProvisioned(StockItemProvisioned),
    LotReceived(LotReceived),
    StockAllocated(StockAllocated),
    AllocationReleased(AllocationReleased),
    StockIssued(StockIssued),
    StockAdjusted(StockAdjusted),
    PolicyChanged(PolicyChanged),
    ReorderPlanUpdated(ReorderPlanUpdated),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::StockItemProvisioned(_) => "stock.item.provisioned",
            LedgerEvent::LotReceived(_) => "stock.lot.received",
            LedgerEvent::StockAllocated(_) => "stock.allocated",
            LedgerEvent::AllocationReleased(_) => "stock.allocation.released",
            LedgerEvent::StockIssued(_) => "stock.issued",
            LedgerEvent::StockAdjusted(_) => "stock.adjusted",
            LedgerEvent::PolicyChanged(_) => "stock.policy.changed",
            LedgerEvent::ReorderPlanUpdated(_) => "stock.reorder_plan.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::StockItemProvisioned(e) => e.occurred_at,
            LedgerEvent::LotReceived(e) => e.occurred_at,
            LedgerEvent::StockAllocated(e) => e.occurred_at,
            LedgerEvent::AllocationReleased(e) => e.occurred_at,
            LedgerEvent::StockIssued(e) => e.occurred_at,
            LedgerEvent::StockAdjusted(e) => e.occurred_at,
            LedgerEvent::PolicyChanged(e) => e.occurred_at,
            LedgerEvent::ReorderPlanUpdated(e) => e.occurred_at,
        }
    }
}

impl LedgerEvent {
    pub fn key(&self) -> StockKey {
        match self {
            LedgerEvent::StockItemProvisioned(e) => e.key,
            LedgerEvent::LotReceived(e) => e.key,
            LedgerEvent::StockAllocated(e) => e.key,
            LedgerEvent::AllocationReleased(e) => e.key,
            LedgerEvent::StockIssued(e) => e.key,
            LedgerEvent::StockAdjusted(e) => e.key,
            LedgerEvent::PolicyChanged(e) => e.key,
            LedgerEvent::ReorderPlanUpdated(e) => e.key,
        }
    }

    /// Journal entry for this event, if it moves quantity.
    pub fn to_movement(&self, movement_id: MovementId) -> Option<Movement> {
        let key = self.key();
        let (movement_type, quantity_delta, unit_cost, before, after, reference) = match self {
            LedgerEvent::LotReceived(e) => (
                MovementType::Receipt,
                e.lot.quantity_received,
                Some(e.lot.unit_cost),
                e.quantity_before,
                e.quantity_after,
                Some(e.reference.clone().unwrap_or_else(|| e.lot.lot_id.to_string())),
            ),
            LedgerEvent::StockAllocated(e) => (
                MovementType::Reservation,
                -e.quantity,
                None,
                e.available_before,
                e.available_after,
                Some(e.demand_ref.to_string()),
            ),
            LedgerEvent::AllocationReleased(e) => (
                MovementType::Release,
                e.allocation.quantity_allocated,
                None,
                e.available_before,
                e.available_after,
                Some(e.allocation.demand_ref.to_string()),
            ),
            LedgerEvent::StockIssued(e) => (
                MovementType::Issue,
                -e.quantity,
                Some(e.unit_cost),
                e.quantity_before,
                e.quantity_after,
                e.reference.as_ref().map(ToString::to_string),
            ),
            LedgerEvent::StockAdjusted(e) => (
                MovementType::Adjustment,
                e.quantity_delta,
                e.unit_cost,
                e.quantity_before,
                e.quantity_after,
                Some(e.reason.clone()),
            ),
            LedgerEvent::StockItemProvisioned(_)
            | LedgerEvent::PolicyChanged(_)
            | LedgerEvent::ReorderPlanUpdated(_) => return None,
        };

        Some(Movement {
            movement_id,
            item_id: key.item_id,
            location_id: key.location_id,
            movement_type,
            quantity_delta,
            unit_cost,
            quantity_before: before,
            quantity_after: after,
            reference,
            timestamp: self.occurred_at(),
        })
    }
}
