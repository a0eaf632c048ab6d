use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult};

/// Demand multipliers by calendar month (1 = January). Missing months are 1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<u32, f64>", into = "BTreeMap<u32, f64>")]
pub struct SeasonalFactors(BTreeMap<u32, f64>);

impl SeasonalFactors {
    pub fn new(factors: impl IntoIterator<Item = (u32, f64)>) -> DomainResult<Self> {
        let factors: BTreeMap<u32, f64> = factors.into_iter().collect();
        for (&month, &factor) in &factors {
            if !(1..=12).contains(&month) {
                return Err(DomainError::validation(format!("month {month} outside 1..=12")));
            }
            if !factor.is_finite() || factor < 0.0 {
                return Err(DomainError::validation(format!(
                    "seasonal factor for month {month} must be a non-negative number"
                )));
            }
        }
        Ok(Self(factors))
    }

    pub fn factor_for(&self, month: u32) -> f64 {
        self.0.get(&month).copied().unwrap_or(1.0)
    }
}

impl TryFrom<BTreeMap<u32, f64>> for SeasonalFactors {
    type Error = DomainError;

    fn try_from(value: BTreeMap<u32, f64>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SeasonalFactors> for BTreeMap<u32, f64> {
    fn from(value: SeasonalFactors) -> Self {
        value.0
    }
}

/// Reorder point scaled by a seasonal factor, truncated toward zero.
pub fn seasonal_reorder_point(reorder_point: i64, factor: f64) -> i64 {
    (reorder_point as f64 * factor) as i64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonalAdjustment {
    pub month: u32,
    pub factor: f64,
    pub items_updated: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_months_default_to_one() {
        let factors = SeasonalFactors::new([(12, 1.5), (1, 0.5)]).unwrap();
        assert_eq!(factors.factor_for(12), 1.5);
        assert_eq!(factors.factor_for(6), 1.0);
    }

    #[test]
    fn rejects_bad_months_and_factors() {
        assert!(matches!(SeasonalFactors::new([(13, 1.0)]), Err(DomainError::Validation(_))));
        assert!(matches!(SeasonalFactors::new([(0, 1.0)]), Err(DomainError::Validation(_))));
        assert!(matches!(SeasonalFactors::new([(3, -0.1)]), Err(DomainError::Validation(_))));
        assert!(serde_json::from_str::<SeasonalFactors>(r#"{"4": 1.2}"#).is_ok());
        assert!(serde_json::from_str::<SeasonalFactors>(r#"{"14": 1.2}"#).is_err());
    }

    #[test]
    fn scaling_truncates() {
        assert_eq!(seasonal_reorder_point(15, 1.5), 22);
        assert_eq!(seasonal_reorder_point(15, 0.5), 7);
        assert_eq!(seasonal_reorder_point(0, 2.0), 0);
    }
}
