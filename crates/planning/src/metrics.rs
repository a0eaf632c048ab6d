use serde::{Deserialize, Serialize};

use stockledger_core::StockKey;

/// Replenishment health over a set of stock items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReorderPerformance {
    pub total_items: usize,
    pub items_below_reorder: usize,
    pub items_stocked_out: usize,
    /// Mean of `available / daily demand` over items with demand.
    pub average_days_of_stock: f64,
    /// Share of items not stocked out, in percent.
    pub in_stock_rate: f64,
    pub stockouts: Vec<Stockout>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stockout {
    pub key: StockKey,
    pub quantity_available: i64,
}

/// Days `available` lasts at `daily_demand`; `None` without demand.
pub fn days_of_stock(available: i64, daily_demand: f64) -> Option<f64> {
    (daily_demand.is_finite() && daily_demand > 0.0).then(|| available as f64 / daily_demand)
}

/// Accumulates per-item observations into a [`ReorderPerformance`].
#[derive(Debug, Default)]
pub struct PerformanceTally {
    report: ReorderPerformance,
    days_total: f64,
    with_demand: usize,
}

impl PerformanceTally {
    pub fn observe(&mut self, key: StockKey, available: i64, reorder_point: i64, daily_demand: f64) {
        let r = &mut self.report;
        r.total_items += 1;
        if available <= reorder_point {
            r.items_below_reorder += 1;
        }
        if available <= 0 {
            r.items_stocked_out += 1;
            r.stockouts.push(Stockout {
                key,
                quantity_available: available,
            });
        }
        if let Some(days) = days_of_stock(available, daily_demand) {
            self.days_total += days;
            self.with_demand += 1;
        }
    }

    pub fn finish(mut self) -> ReorderPerformance {
        if self.with_demand > 0 {
            self.report.average_days_of_stock = self.days_total / self.with_demand as f64;
        }
        let r = &mut self.report;
        if r.total_items > 0 {
            r.in_stock_rate = (r.total_items - r.items_stocked_out) as f64 / r.total_items as f64 * 100.0;
        }
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_core::{ItemId, LocationId};

    fn key() -> StockKey {
        StockKey::new(ItemId::new(), LocationId::new())
    }

    #[test]
    fn tally_counts_and_averages() {
        let out = key();
        let mut tally = PerformanceTally::default();
        tally.observe(key(), 30, 10, 3.0);
        tally.observe(key(), 5, 10, 1.0);
        tally.observe(out, 0, 4, 2.0);
        tally.observe(key(), 12, 0, 0.0);

        let report = tally.finish();
        assert_eq!(report.total_items, 4);
        assert_eq!(report.items_below_reorder, 2);
        assert_eq!(report.items_stocked_out, 1);
        assert_eq!(report.stockouts, vec![Stockout { key: out, quantity_available: 0 }]);
        // (10 + 5 + 0) / 3
        assert_eq!(report.average_days_of_stock, 5.0);
        assert_eq!(report.in_stock_rate, 75.0);
    }

    #[test]
    fn empty_tally_is_zeroed() {
        assert_eq!(PerformanceTally::default().finish(), ReorderPerformance::default());
        assert_eq!(days_of_stock(10, 0.0), None);
    }
}
