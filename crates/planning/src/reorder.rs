use serde::{Deserialize, Serialize};

use stockledger_core::StockKey;

use crate::abc::AbcClass;
use crate::demand::DemandStatistics;
use crate::settings::PlanningSettings;

/// `round(demand_rate_per_day * lead_time_days) + safety_stock`, inputs clamped to zero.
pub fn compute_reorder_point(demand_rate_per_day: f64, lead_time_days: i64, safety_stock: i64) -> i64 {
    let rate = if demand_rate_per_day.is_finite() {
        demand_rate_per_day.max(0.0)
    } else {
        0.0
    };
    let lead = lead_time_days.max(0);
    let safety = safety_stock.max(0);
    let lead_time_demand = (rate * lead as f64).round() as i64;
    (lead_time_demand + safety).max(0)
}

/// Reorder point from observed demand, with variability buffer and class scaling.
///
/// Buffer and multipliers truncate toward zero.
pub fn recalculated_reorder_point(
    stats: &DemandStatistics,
    lead_time_days: i64,
    safety_stock: i64,
    class: Option<AbcClass>,
    settings: &PlanningSettings,
) -> i64 {
    let mut point = compute_reorder_point(stats.daily_demand, lead_time_days, safety_stock);
    if stats.coefficient_of_variation > settings.variability_threshold {
        point += (stats.daily_demand * settings.variability_buffer_ratio) as i64;
    }
    match class {
        Some(AbcClass::A) => (point as f64 * settings.class_a_multiplier) as i64,
        Some(AbcClass::C) => (point as f64 * settings.class_c_multiplier) as i64,
        Some(AbcClass::B) | None => point,
    }
}

/// True when `new` differs from `old` by more than `max(1, 10% of old)`.
pub fn is_significant_change(old: i64, new: i64) -> bool {
    let tolerance = (old as f64 * 0.1).max(1.0);
    ((old - new).abs() as f64) > tolerance
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderChange {
    pub key: StockKey,
    pub old_reorder_point: i64,
    pub new_reorder_point: i64,
    pub daily_demand: f64,
    pub lead_time_days: i64,
    pub abc_class: Option<AbcClass>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReorderReport {
    pub items_analyzed: usize,
    pub items_updated: usize,
    pub changes: Vec<ReorderChange>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stats(daily_demand: f64, cov: f64) -> DemandStatistics {
        DemandStatistics {
            total_demand: (daily_demand * 90.0) as i64,
            daily_demand,
            variance: 0.0,
            coefficient_of_variation: cov,
            issue_count: 10,
        }
    }

    #[test]
    fn reorder_point_rounds_lead_time_demand() {
        assert_eq!(compute_reorder_point(2.5, 10, 3), 28);
        assert_eq!(compute_reorder_point(0.25, 2, 0), 1);
    }

    #[test]
    fn reorder_point_clamps_negative_inputs() {
        assert_eq!(compute_reorder_point(-4.0, 10, 3), 3);
        assert_eq!(compute_reorder_point(2.0, -5, -3), 0);
        assert_eq!(compute_reorder_point(f64::NAN, 5, 2), 2);
    }

    #[test]
    fn variability_buffer_and_class_scaling() {
        let settings = PlanningSettings::default();
        // base = round(10 * 7) + 0 = 70, buffer = int(10 * 0.2) = 2
        let volatile = stats(10.0, 0.8);
        assert_eq!(recalculated_reorder_point(&volatile, 7, 0, None, &settings), 72);
        assert_eq!(recalculated_reorder_point(&volatile, 7, 0, Some(AbcClass::A), &settings), 86);
        assert_eq!(recalculated_reorder_point(&volatile, 7, 0, Some(AbcClass::C), &settings), 57);

        let steady = stats(10.0, 0.2);
        assert_eq!(recalculated_reorder_point(&steady, 7, 0, Some(AbcClass::B), &settings), 70);
    }

    #[test]
    fn small_changes_are_not_significant() {
        assert!(!is_significant_change(0, 1));
        assert!(is_significant_change(0, 2));
        assert!(!is_significant_change(100, 110));
        assert!(is_significant_change(100, 111));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn reorder_point_is_never_negative(
            rate in -100.0f64..100.0,
            lead in -30i64..60,
            safety in -50i64..50,
        ) {
            prop_assert!(compute_reorder_point(rate, lead, safety) >= 0);
        }
    }
}
