use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ItemId, LocationId, Money, MovementId, StockKey};

/// Kind of quantity change recorded in the journal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Receipt,
    Issue,
    Adjustment,
    Reservation,
    Release,
}

impl MovementType {
    /// Physical movements change on-hand; logical ones only change availability.
    pub fn is_physical(self) -> bool {
        matches!(self, Self::Receipt | Self::Issue | Self::Adjustment)
    }
}

/// Append-only journal entry.
///
/// For physical movements `quantity_before`/`quantity_after` are on-hand balances;
/// for reservations and releases they are available balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub movement_id: MovementId,
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub movement_type: MovementType,
    pub quantity_delta: i64,
    pub unit_cost: Option<Money>,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub reference: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Movement {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.item_id, self.location_id)
    }

    /// Units leaving stock for an Issue movement, zero otherwise.
    pub fn issued_quantity(&self) -> i64 {
        if self.movement_type == MovementType::Issue {
            self.quantity_delta.abs()
        } else {
            0
        }
    }
}

/// Sum of physical deltas; equals on-hand for a complete journal.
pub fn physical_balance<'a>(movements: impl IntoIterator<Item = &'a Movement>) -> i64 {
    movements
        .into_iter()
        .filter(|m| m.movement_type.is_physical())
        .map(|m| m.quantity_delta)
        .sum()
}
