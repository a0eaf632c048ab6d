use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Money};

/// Tunables for reorder-point recalculation and EOQ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningSettings {
    /// Trailing window for demand statistics.
    pub window_days: u32,
    /// Trailing window used to estimate annual demand.
    pub annual_window_days: u32,
    /// Cost of placing one order, in minor units.
    pub ordering_cost: Money,
    /// Annual holding cost as a fraction of standard cost.
    pub holding_cost_rate: f64,
    pub variability_threshold: f64,
    pub variability_buffer_ratio: f64,
    pub class_a_multiplier: f64,
    pub class_c_multiplier: f64,
}

impl Default for PlanningSettings {
    fn default() -> Self {
        Self {
            window_days: 90,
            annual_window_days: 365,
            ordering_cost: Money::from_minor(5000),
            holding_cost_rate: 0.25,
            variability_threshold: 0.5,
            variability_buffer_ratio: 0.2,
            class_a_multiplier: 1.2,
            class_c_multiplier: 0.8,
        }
    }
}

impl PlanningSettings {
    pub fn validate(&self) -> DomainResult<()> {
        if self.window_days == 0 || self.annual_window_days == 0 {
            return Err(DomainError::validation("planning windows must be at least one day"));
        }
        if self.ordering_cost.is_negative() {
            return Err(DomainError::validation("ordering cost cannot be negative"));
        }
        let non_negative = [
            ("holding_cost_rate", self.holding_cost_rate),
            ("variability_threshold", self.variability_threshold),
            ("variability_buffer_ratio", self.variability_buffer_ratio),
            ("class_a_multiplier", self.class_a_multiplier),
            ("class_c_multiplier", self.class_c_multiplier),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(DomainError::validation(format!("{name} must be a non-negative number")));
            }
        }
        Ok(())
    }
}

/// Cumulative value-share cut-offs for classes A and B.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbcThresholds {
    pub a_threshold: f64,
    pub b_threshold: f64,
}

impl Default for AbcThresholds {
    fn default() -> Self {
        Self {
            a_threshold: 0.80,
            b_threshold: 0.95,
        }
    }
}

impl AbcThresholds {
    pub fn validate(&self) -> DomainResult<()> {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_range(self.a_threshold) || !in_range(self.b_threshold) || self.a_threshold > self.b_threshold {
            return Err(DomainError::validation(
                "abc thresholds must satisfy 0 <= a_threshold <= b_threshold <= 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(PlanningSettings::default().validate().is_ok());
        assert!(AbcThresholds::default().validate().is_ok());
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let t = AbcThresholds {
            a_threshold: 0.9,
            b_threshold: 0.8,
        };
        assert!(t.validate().is_err());
    }
}
