use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Entity, ItemId, LocationId, LotId, Money};

use crate::stock::ConsumptionPolicy;

/// A single receipt of stock, consumed over time.
///
/// `quantity_received` and `unit_cost` never change after creation; only
/// `quantity_remaining` moves (down on allocation/issue, up on release).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub lot_id: LotId,
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub quantity_received: i64,
    pub quantity_remaining: i64,
    pub unit_cost: Money,
    pub received_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Entity for Lot {
    type Id = LotId;

    fn id(&self) -> &Self::Id {
        &self.lot_id
    }
}

impl Lot {
    pub fn is_depleted(&self) -> bool {
        self.quantity_remaining == 0
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= at)
    }
}

/// Order lots with stock remaining for consumption under `policy`.
///
/// FIFO walks `received_at` ascending, LIFO descending; equal timestamps always
/// break on `lot_id` ascending so the result is reproducible.
pub fn consumption_order<'a>(lots: impl IntoIterator<Item = &'a Lot>, policy: ConsumptionPolicy) -> Vec<&'a Lot> {
    let mut ordered: Vec<&Lot> = lots.into_iter().filter(|l| l.quantity_remaining > 0).collect();
    ordered.sort_by(|a, b| {
        let by_time = match policy {
            ConsumptionPolicy::Fifo => a.received_at.cmp(&b.received_at),
            ConsumptionPolicy::Lifo => b.received_at.cmp(&a.received_at),
        };
        by_time.then_with(|| a.lot_id.cmp(&b.lot_id))
    });
    ordered
}

/// Quantity taken from one lot by an allocation or issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: LotId,
    pub quantity: i64,
    pub unit_cost: Money,
}

/// Walk ordered lots taking `min(remaining, needed)` from each.
///
/// Returns the draws and the quantity that could not be covered. Nothing is
/// mutated; callers decide whether a shortfall is fatal.
pub fn plan_draws<'a>(ordered: impl IntoIterator<Item = &'a Lot>, quantity: i64) -> (Vec<LotDraw>, i64) {
    let mut needed = quantity;
    let mut draws = Vec::new();
    for lot in ordered {
        if needed <= 0 {
            break;
        }
        let take = lot.quantity_remaining.min(needed);
        if take <= 0 {
            continue;
        }
        draws.push(LotDraw {
            lot_id: lot.lot_id,
            quantity: take,
            unit_cost: lot.unit_cost,
        });
        needed -= take;
    }
    (draws, needed.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lot_at(day: u32, remaining: i64) -> Lot {
        Lot {
            lot_id: LotId::new(),
            item_id: ItemId::new(),
            location_id: LocationId::new(),
            quantity_received: remaining.max(1),
            quantity_remaining: remaining,
            unit_cost: Money::from_minor(100),
            received_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            expires_at: None,
        }
    }

    #[test]
    fn fifo_and_lifo_order_by_receipt_time() {
        let lots = vec![lot_at(3, 5), lot_at(1, 5), lot_at(2, 5)];

        let fifo: Vec<u32> = consumption_order(&lots, ConsumptionPolicy::Fifo)
            .iter()
            .map(|l| chrono::Datelike::day(&l.received_at))
            .collect();
        assert_eq!(fifo, vec![1, 2, 3]);

        let lifo: Vec<u32> = consumption_order(&lots, ConsumptionPolicy::Lifo)
            .iter()
            .map(|l| chrono::Datelike::day(&l.received_at))
            .collect();
        assert_eq!(lifo, vec![3, 2, 1]);
    }

    #[test]
    fn ties_break_on_lot_id_for_both_policies() {
        let a = lot_at(1, 5);
        let b = lot_at(1, 5);
        let lots = vec![b.clone(), a.clone()];
        for policy in [ConsumptionPolicy::Fifo, ConsumptionPolicy::Lifo] {
            let ordered = consumption_order(&lots, policy);
            assert_eq!(ordered[0].lot_id, a.lot_id.min(b.lot_id));
        }
    }

    #[test]
    fn depleted_lots_are_skipped() {
        let lots = vec![lot_at(1, 0), lot_at(2, 4)];
        let ordered = consumption_order(&lots, ConsumptionPolicy::Fifo);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].quantity_remaining, 4);
    }

    #[test]
    fn plan_draws_reports_shortfall() {
        let lots = vec![lot_at(1, 5), lot_at(2, 5)];
        let (draws, short) = plan_draws(consumption_order(&lots, ConsumptionPolicy::Fifo), 12);
        assert_eq!(draws.iter().map(|d| d.quantity).sum::<i64>(), 10);
        assert_eq!(short, 2);

        let (draws, short) = plan_draws(consumption_order(&lots, ConsumptionPolicy::Fifo), 7);
        assert_eq!(draws.iter().map(|d| d.quantity).collect::<Vec<_>>(), vec![5, 2]);
        assert_eq!(short, 0);
    }
}
