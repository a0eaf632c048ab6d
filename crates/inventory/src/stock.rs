use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, ItemId, LocationId, Money, StockKey};

/// Order in which receipt lots are consumed.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsumptionPolicy {
    /// Oldest receipt first.
    #[default]
    #[serde(rename = "FIFO")]
    Fifo,
    /// Newest receipt first.
    #[serde(rename = "LIFO")]
    Lifo,
}

impl FromStr for ConsumptionPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIFO" => Ok(Self::Fifo),
            "LIFO" => Ok(Self::Lifo),
            other => Err(DomainError::validation(format!(
                "unknown consumption policy '{other}' (expected FIFO or LIFO)"
            ))),
        }
    }
}

impl core::fmt::Display for ConsumptionPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Fifo => f.write_str("FIFO"),
            Self::Lifo => f.write_str("LIFO"),
        }
    }
}

/// Per (item, location) roll-up of on-hand, reserved and cost.
///
/// `quantity_available` is derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub quantity_on_hand: i64,
    pub quantity_reserved: i64,
    /// Weighted-average unit cost.
    pub average_cost: Money,
    /// Total carrying value of on-hand stock.
    pub inventory_value: Money,
    pub reorder_point: i64,
    /// Replenishment order size (EOQ when computed).
    pub reorder_quantity: i64,
    pub policy: ConsumptionPolicy,
}

impl StockItem {
    pub fn new(key: StockKey, policy: ConsumptionPolicy) -> Self {
        Self {
            item_id: key.item_id,
            location_id: key.location_id,
            quantity_on_hand: 0,
            quantity_reserved: 0,
            average_cost: Money::ZERO,
            inventory_value: Money::ZERO,
            reorder_point: 0,
            reorder_quantity: 0,
            policy,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.item_id, self.location_id)
    }

    pub fn quantity_available(&self) -> i64 {
        self.quantity_on_hand - self.quantity_reserved
    }

    pub fn is_below_reorder_point(&self) -> bool {
        self.quantity_available() <= self.reorder_point
    }

    /// Blend a receipt into the weighted-average cost.
    pub fn add_value(&mut self, quantity: i64, unit_cost: Money) {
        self.quantity_on_hand += quantity;
        self.inventory_value = self.inventory_value.plus(unit_cost.times(quantity));
        self.refresh_average();
    }

    /// Remove stock at the current average cost.
    pub fn remove_at_average(&mut self, quantity: i64) {
        self.quantity_on_hand -= quantity;
        if self.quantity_on_hand <= 0 {
            self.inventory_value = Money::ZERO;
            self.average_cost = Money::ZERO;
        } else {
            self.inventory_value = self.inventory_value.minus(self.average_cost.times(quantity));
        }
    }

    fn refresh_average(&mut self) {
        match self.inventory_value.per_unit(self.quantity_on_hand) {
            Some(avg) => self.average_cost = avg,
            None => {
                self.inventory_value = Money::ZERO;
                self.average_cost = Money::ZERO;
            }
        }
    }
}

/// Read view of a stock item with derived fields filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItemView {
    #[serde(flatten)]
    pub stock: StockItem,
    pub quantity_available: i64,
    /// `on_hand - reserved - sum(lot remaining)`; nonzero only after adjustments.
    pub lot_drift: i64,
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("fifo".parse::<ConsumptionPolicy>().unwrap(), ConsumptionPolicy::Fifo);
        assert_eq!(" LIFO ".parse::<ConsumptionPolicy>().unwrap(), ConsumptionPolicy::Lifo);
        assert!(matches!(
            "average".parse::<ConsumptionPolicy>(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn weighted_average_blends_receipts() {
        let mut stock = StockItem::new(StockKey::new(ItemId::new(), LocationId::new()), ConsumptionPolicy::Fifo);
        stock.add_value(10, Money::from_minor(1000));
        stock.add_value(30, Money::from_minor(2000));
        assert_eq!(stock.quantity_on_hand, 40);
        assert_eq!(stock.inventory_value, Money::from_minor(70_000));
        assert_eq!(stock.average_cost, Money::from_minor(1750));

        stock.remove_at_average(40);
        assert_eq!(stock.average_cost, Money::ZERO);
        assert_eq!(stock.inventory_value, Money::ZERO);
    }
}
