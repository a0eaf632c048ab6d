use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult};
use stockledger_inventory::{Movement, MovementType};

/// Demand observed over a trailing window of Issue movements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DemandStatistics {
    pub total_demand: i64,
    /// `total_demand / window_days`.
    pub daily_demand: f64,
    /// Population variance of per-day issued totals, over days with issues.
    pub variance: f64,
    pub coefficient_of_variation: f64,
    pub issue_count: usize,
}

fn in_window(m: &Movement, now: DateTime<Utc>, window_days: u32) -> bool {
    let cutoff = now - Duration::days(i64::from(window_days));
    m.movement_type == MovementType::Issue && m.timestamp >= cutoff && m.timestamp <= now
}

/// Demand statistics over `[now - window_days, now]`.
pub fn calculate_demand_statistics<'a>(
    movements: impl IntoIterator<Item = &'a Movement>,
    now: DateTime<Utc>,
    window_days: u32,
) -> DomainResult<DemandStatistics> {
    if window_days == 0 {
        return Err(DomainError::validation("demand window must be at least one day"));
    }

    let issues: Vec<&Movement> = movements.into_iter().filter(|m| in_window(m, now, window_days)).collect();
    if issues.is_empty() {
        return Ok(DemandStatistics::default());
    }

    let total_demand: i64 = issues.iter().map(|m| m.issued_quantity()).sum();
    let daily_demand = total_demand as f64 / f64::from(window_days);

    let (variance, coefficient_of_variation) = if issues.len() > 1 {
        let mut per_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for m in &issues {
            *per_day.entry(m.timestamp.date_naive()).or_default() += m.issued_quantity();
        }
        let n = per_day.len() as f64;
        let mean = per_day.values().sum::<i64>() as f64 / n;
        let variance = per_day.values().map(|&q| (q as f64 - mean).powi(2)).sum::<f64>() / n;
        let cov = if mean > 0.0 { variance.sqrt() / mean } else { 0.0 };
        (variance, cov)
    } else {
        (0.0, 0.0)
    };

    Ok(DemandStatistics {
        total_demand,
        daily_demand,
        variance,
        coefficient_of_variation,
        issue_count: issues.len(),
    })
}

/// Total units issued in the trailing window (annual demand estimate).
pub fn issued_volume<'a>(movements: impl IntoIterator<Item = &'a Movement>, now: DateTime<Utc>, window_days: u32) -> i64 {
    movements
        .into_iter()
        .filter(|m| in_window(m, now, window_days))
        .map(|m| m.issued_quantity())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockledger_core::{ItemId, LocationId, MovementId};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 18, 0, 0).unwrap()
    }

    fn movement(kind: MovementType, delta: i64, days_ago: i64) -> Movement {
        Movement {
            movement_id: MovementId::new(),
            item_id: ItemId::new(),
            location_id: LocationId::new(),
            movement_type: kind,
            quantity_delta: delta,
            unit_cost: None,
            quantity_before: 0,
            quantity_after: 0,
            reference: None,
            timestamp: now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(matches!(
            calculate_demand_statistics(&Vec::<Movement>::new(), now(), 0),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn only_issues_inside_the_window_count() {
        let movements = vec![
            movement(MovementType::Issue, -10, 1),
            movement(MovementType::Issue, -30, 2),
            movement(MovementType::Receipt, 100, 3),
            movement(MovementType::Reservation, -5, 3),
            movement(MovementType::Issue, -99, 45),
        ];
        let stats = calculate_demand_statistics(&movements, now(), 30).unwrap();
        assert_eq!(stats.total_demand, 40);
        assert_eq!(stats.issue_count, 2);
        assert!((stats.daily_demand - 40.0 / 30.0).abs() < 1e-9);
        // Days: 10 and 30, mean 20, variance 100, stddev 10.
        assert!((stats.variance - 100.0).abs() < 1e-9);
        assert!((stats.coefficient_of_variation - 0.5).abs() < 1e-9);
    }

    #[test]
    fn same_day_issues_are_grouped() {
        let movements = vec![
            movement(MovementType::Issue, -4, 1),
            movement(MovementType::Issue, -6, 1),
        ];
        let stats = calculate_demand_statistics(&movements, now(), 10).unwrap();
        assert_eq!(stats.total_demand, 10);
        assert_eq!(stats.variance, 0.0);
        assert_eq!(stats.coefficient_of_variation, 0.0);
    }

    #[test]
    fn single_issue_has_no_variance() {
        let movements = vec![movement(MovementType::Issue, -7, 1)];
        let stats = calculate_demand_statistics(&movements, now(), 7).unwrap();
        assert_eq!(stats.daily_demand, 1.0);
        assert_eq!(stats.variance, 0.0);
    }

    #[test]
    fn issued_volume_sums_trailing_issues() {
        let movements = vec![
            movement(MovementType::Issue, -10, 10),
            movement(MovementType::Issue, -5, 400),
            movement(MovementType::Adjustment, -3, 1),
        ];
        assert_eq!(issued_volume(&movements, now(), 365), 10);
    }
}
