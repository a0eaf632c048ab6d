use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use stockledger_core::{Money, StockKey};
use stockledger_inventory::StockItem;

use crate::abc::AbcClass;
use crate::params::ItemProfile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderRecommendation {
    pub key: StockKey,
    pub abc_class: Option<AbcClass>,
    pub quantity_on_hand: i64,
    pub quantity_available: i64,
    pub quantity_reserved: i64,
    pub reorder_point: i64,
    pub suggested_order_quantity: i64,
    pub minimum_order_quantity: i64,
    pub economic_order_quantity: i64,
    pub lead_time_days: i64,
    /// 0 to 100, higher is more urgent.
    pub urgency_score: f64,
    pub estimated_stockout: Option<NaiveDate>,
    pub unit_cost: Money,
    pub total_order_value: Money,
}

/// EOQ (or MOQ when unset), plus the shortage when the shortage is larger, floored at MOQ.
pub fn suggested_order_quantity(stock: &StockItem, minimum_order_quantity: i64) -> i64 {
    let mut suggested = if stock.reorder_quantity > 0 {
        stock.reorder_quantity
    } else {
        minimum_order_quantity
    };
    let shortage = stock.reorder_point - stock.quantity_available();
    if shortage > suggested {
        suggested += shortage;
    }
    suggested.max(minimum_order_quantity)
}

pub fn urgency_score(stock: &StockItem, class: Option<AbcClass>, lead_time_days: i64) -> f64 {
    let available = stock.quantity_available();
    let shortage_ratio = if stock.reorder_point > 0 {
        ((stock.reorder_point - available) as f64 / stock.reorder_point as f64).max(0.0)
    } else if available <= 0 {
        1.0
    } else {
        0.0
    };

    let mut score = shortage_ratio * 50.0;
    score *= match class {
        Some(AbcClass::A) => 1.5,
        Some(AbcClass::B) => 1.2,
        _ => 1.0,
    };
    score += (lead_time_days.max(0) as f64 / 30.0).min(1.0) * 20.0;
    score.min(100.0)
}

/// Day stock runs out at `daily_demand`; `None` without demand.
pub fn estimate_stockout(available: i64, daily_demand: f64, today: NaiveDate) -> Option<NaiveDate> {
    if available <= 0 {
        return Some(today);
    }
    if !(daily_demand.is_finite() && daily_demand > 0.0) {
        return None;
    }
    let days = (available as f64 / daily_demand) as i64;
    today.checked_add_signed(Duration::days(days))
}

pub fn recommend(
    stock: &StockItem,
    class: Option<AbcClass>,
    profile: Option<&ItemProfile>,
    daily_demand: f64,
    today: NaiveDate,
) -> ReorderRecommendation {
    let moq = profile.map_or(0, |p| p.minimum_order_quantity);
    let lead_time_days = profile.map_or(0, |p| p.lead_time_days);
    let suggested = suggested_order_quantity(stock, moq);

    ReorderRecommendation {
        key: stock.key(),
        abc_class: class,
        quantity_on_hand: stock.quantity_on_hand,
        quantity_available: stock.quantity_available(),
        quantity_reserved: stock.quantity_reserved,
        reorder_point: stock.reorder_point,
        suggested_order_quantity: suggested,
        minimum_order_quantity: moq,
        economic_order_quantity: stock.reorder_quantity,
        lead_time_days,
        urgency_score: urgency_score(stock, class, lead_time_days),
        estimated_stockout: estimate_stockout(stock.quantity_available(), daily_demand, today),
        unit_cost: stock.average_cost,
        total_order_value: stock.average_cost.times(suggested),
    }
}
