use serde::{Deserialize, Serialize};

use stockledger_core::Money;

/// Economic order quantity with the annual cost picture behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EoqReport {
    pub economic_order_quantity: i64,
    pub annual_demand: i64,
    pub ordering_cost: Money,
    pub holding_cost_rate: f64,
    pub holding_cost_per_unit: Money,
    pub orders_per_year: f64,
    pub annual_ordering_cost: Money,
    pub annual_holding_cost: Money,
    pub total_annual_cost: Money,
}

/// `sqrt(2 * D * S / H)` rounded, floored at the minimum order quantity.
///
/// `H = standard_cost * holding_cost_rate`. When `H <= 0` or `D <= 0` the result is
/// the minimum order quantity with zero costs.
pub fn calculate_eoq(
    annual_demand: i64,
    ordering_cost: Money,
    holding_cost_rate: f64,
    standard_cost: Money,
    minimum_order_quantity: i64,
) -> EoqReport {
    let moq = minimum_order_quantity.max(0);
    let holding = standard_cost.as_f64() * holding_cost_rate;

    if holding.is_nan() || holding <= 0.0 || annual_demand <= 0 {
        return EoqReport {
            economic_order_quantity: moq,
            annual_demand,
            ordering_cost,
            holding_cost_rate,
            holding_cost_per_unit: standard_cost.scale(holding_cost_rate),
            orders_per_year: if moq > 0 { annual_demand.max(0) as f64 / moq as f64 } else { 0.0 },
            annual_ordering_cost: Money::ZERO,
            annual_holding_cost: Money::ZERO,
            total_annual_cost: Money::ZERO,
        };
    }

    let demand = annual_demand as f64;
    let raw = (2.0 * demand * ordering_cost.as_f64() / holding).sqrt();
    let eoq = (raw.round() as i64).max(moq);

    let (orders_per_year, annual_ordering, annual_holding) = if eoq > 0 {
        let orders = demand / eoq as f64;
        (
            orders,
            ordering_cost.scale(orders),
            Money::from_minor((eoq as f64 / 2.0 * holding).round() as i64),
        )
    } else {
        (0.0, Money::ZERO, Money::ZERO)
    };

    EoqReport {
        economic_order_quantity: eoq,
        annual_demand,
        ordering_cost,
        holding_cost_rate,
        holding_cost_per_unit: Money::from_minor(holding.round() as i64),
        orders_per_year,
        annual_ordering_cost: annual_ordering,
        annual_holding_cost: annual_holding,
        total_annual_cost: annual_ordering.plus(annual_holding),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textbook_eoq() {
        // D = 1000, S = 50.00, H = 20.00 * 0.25 = 5.00 -> sqrt(20000) = 141.42
        let report = calculate_eoq(1000, Money::from_minor(5000), 0.25, Money::from_minor(2000), 1);
        assert_eq!(report.economic_order_quantity, 141);
        assert_eq!(report.holding_cost_per_unit, Money::from_minor(500));
        assert!((report.orders_per_year - 1000.0 / 141.0).abs() < 1e-9);
        assert_eq!(
            report.total_annual_cost,
            report.annual_ordering_cost.plus(report.annual_holding_cost)
        );
    }

    #[test]
    fn eoq_is_floored_at_moq() {
        let report = calculate_eoq(1000, Money::from_minor(5000), 0.25, Money::from_minor(2000), 500);
        assert_eq!(report.economic_order_quantity, 500);
    }

    #[test]
    fn degenerate_inputs_fall_back_to_moq() {
        let no_cost = calculate_eoq(1000, Money::from_minor(5000), 0.25, Money::ZERO, 12);
        assert_eq!(no_cost.economic_order_quantity, 12);
        assert_eq!(no_cost.total_annual_cost, Money::ZERO);

        let no_demand = calculate_eoq(0, Money::from_minor(5000), 0.25, Money::from_minor(2000), 12);
        assert_eq!(no_demand.economic_order_quantity, 12);
    }
}
