use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, ItemId, Money, StockKey};
use stockledger_inventory::ConsumptionPolicy;

use crate::reorder::compute_reorder_point;

/// Replenishment parameters for one stock item.
///
/// `computed_reorder_level` is always what `compute_reorder_point` gives for the
/// stored inputs; the stock item's reorder point is kept equal to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningParams {
    pub key: StockKey,
    pub demand_rate_per_day: f64,
    pub lead_time_days: i64,
    pub safety_stock: i64,
    pub consumption_policy: ConsumptionPolicy,
    pub computed_reorder_level: i64,
    pub updated_at: DateTime<Utc>,
}

impl PlanningParams {
    pub fn new(
        key: StockKey,
        demand_rate_per_day: f64,
        lead_time_days: i64,
        safety_stock: i64,
        consumption_policy: ConsumptionPolicy,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let mut params = Self {
            key,
            demand_rate_per_day,
            lead_time_days,
            safety_stock,
            consumption_policy,
            computed_reorder_level: 0,
            updated_at,
        };
        params.validate()?;
        params.recompute();
        Ok(params)
    }

    fn validate(&self) -> DomainResult<()> {
        if !self.demand_rate_per_day.is_finite() || self.demand_rate_per_day < 0.0 {
            return Err(DomainError::validation("demand rate must be a non-negative number"));
        }
        if self.lead_time_days < 0 || self.safety_stock < 0 {
            return Err(DomainError::validation("lead time and safety stock cannot be negative"));
        }
        Ok(())
    }

    fn recompute(&mut self) {
        self.computed_reorder_level =
            compute_reorder_point(self.demand_rate_per_day, self.lead_time_days, self.safety_stock);
    }

    /// Apply a partial update; the original is left untouched on error.
    pub fn patched(&self, patch: &PlanningParamsPatch, at: DateTime<Utc>) -> DomainResult<Self> {
        let mut next = self.clone();
        if let Some(rate) = patch.demand_rate_per_day {
            next.demand_rate_per_day = rate;
        }
        if let Some(lead) = patch.lead_time_days {
            next.lead_time_days = lead;
        }
        if let Some(safety) = patch.safety_stock {
            next.safety_stock = safety;
        }
        if let Some(policy) = patch.consumption_policy {
            next.consumption_policy = policy;
        }
        next.validate()?;
        next.recompute();
        next.updated_at = at;
        Ok(next)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningParamsPatch {
    pub demand_rate_per_day: Option<f64>,
    pub lead_time_days: Option<i64>,
    pub safety_stock: Option<i64>,
    pub consumption_policy: Option<ConsumptionPolicy>,
}

/// Item master data the planner needs (cost basis, order constraints, lead time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProfile {
    pub item_id: ItemId,
    pub standard_cost: Money,
    pub minimum_order_quantity: i64,
    pub lead_time_days: i64,
    pub safety_stock: i64,
    pub active: bool,
}

impl ItemProfile {
    pub fn new(item_id: ItemId, standard_cost: Money) -> Self {
        Self {
            item_id,
            standard_cost,
            minimum_order_quantity: 1,
            lead_time_days: 7,
            safety_stock: 0,
            active: true,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.standard_cost.is_negative() {
            return Err(DomainError::validation("standard cost cannot be negative"));
        }
        if self.minimum_order_quantity < 0 || self.lead_time_days < 0 || self.safety_stock < 0 {
            return Err(DomainError::validation(
                "order quantity, lead time and safety stock cannot be negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockledger_core::LocationId;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn key() -> StockKey {
        StockKey::new(ItemId::new(), LocationId::new())
    }

    #[test]
    fn new_params_compute_reorder_level() {
        let p = PlanningParams::new(key(), 2.5, 10, 3, ConsumptionPolicy::Fifo, test_time()).unwrap();
        assert_eq!(p.computed_reorder_level, 28);
    }

    #[test]
    fn negative_inputs_are_rejected() {
        assert!(PlanningParams::new(key(), -1.0, 10, 3, ConsumptionPolicy::Fifo, test_time()).is_err());
        assert!(PlanningParams::new(key(), 1.0, -1, 3, ConsumptionPolicy::Fifo, test_time()).is_err());
    }

    #[test]
    fn patch_recomputes_level() {
        let p = PlanningParams::new(key(), 2.0, 5, 0, ConsumptionPolicy::Fifo, test_time()).unwrap();
        let patch = PlanningParamsPatch {
            safety_stock: Some(4),
            consumption_policy: Some(ConsumptionPolicy::Lifo),
            ..PlanningParamsPatch::default()
        };
        let next = p.patched(&patch, test_time()).unwrap();
        assert_eq!(next.computed_reorder_level, 14);
        assert_eq!(next.consumption_policy, ConsumptionPolicy::Lifo);

        let bad = PlanningParamsPatch {
            lead_time_days: Some(-2),
            ..PlanningParamsPatch::default()
        };
        assert!(p.patched(&bad, test_time()).is_err());
    }
}
