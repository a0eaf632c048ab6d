//! Replenishment planning over the journal: reorder points, EOQ, ABC classes.
//!
//! Planning records (params, profiles, ABC records) live in keyed stores. Reorder
//! settings on stock items are written back through `InventoryService`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Datelike;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use stockledger_core::{DomainError, ItemId, LocationId, Money, StockKey};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::{ConsumptionPolicy, StockItemView};
use stockledger_planning::{
    AbcClass, AbcRecord, AbcSummary, AbcThresholds, DemandStatistics, EoqReport, ItemProfile, PerformanceTally,
    PlanningParams, PlanningParamsPatch, PlanningSettings, ReorderChange, ReorderPerformance, ReorderRecommendation,
    ReorderReport, SeasonalAdjustment, SeasonalFactors, classify, is_significant_change, issued_volume,
    recalculated_reorder_point, recommend, seasonal_reorder_point,
};

use super::error::ServiceResult;
use super::inventory::InventoryService;
use crate::config::EngineConfig;
use crate::event_store::EventStore;
use crate::import::{ImportReport, ItemImportBatch};
use crate::read_model::{InMemoryKeyedStore, KeyedStore};

/// Trailing window used to estimate stockout dates.
const STOCKOUT_WINDOW_DAYS: u32 = 30;

pub struct PlanningService<S, B> {
    inventory: Arc<InventoryService<S, B>>,
    params: Arc<dyn KeyedStore<StockKey, PlanningParams>>,
    profiles: Arc<dyn KeyedStore<ItemId, ItemProfile>>,
    abc: Arc<dyn KeyedStore<ItemId, AbcRecord>>,
    settings: PlanningSettings,
    thresholds: AbcThresholds,
}

impl<S, B> core::fmt::Debug for PlanningService<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PlanningService")
            .field("settings", &self.settings)
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl<S, B> PlanningService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Planning over in-memory record stores.
    pub fn new(inventory: Arc<InventoryService<S, B>>, config: &EngineConfig) -> Self {
        Self::with_stores(
            inventory,
            Arc::new(InMemoryKeyedStore::<StockKey, PlanningParams>::new()),
            Arc::new(InMemoryKeyedStore::<ItemId, ItemProfile>::new()),
            Arc::new(InMemoryKeyedStore::<ItemId, AbcRecord>::new()),
            config,
        )
    }

    pub fn with_stores(
        inventory: Arc<InventoryService<S, B>>,
        params: Arc<dyn KeyedStore<StockKey, PlanningParams>>,
        profiles: Arc<dyn KeyedStore<ItemId, ItemProfile>>,
        abc: Arc<dyn KeyedStore<ItemId, AbcRecord>>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            inventory,
            params,
            profiles,
            abc,
            settings: config.planning.clone(),
            thresholds: config.abc,
        }
    }

    pub fn inventory(&self) -> &InventoryService<S, B> {
        &self.inventory
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.inventory.clock().now()
    }

    // ---- reorder points ---------------------------------------------------------

    pub fn compute_reorder_point(&self, demand_rate_per_day: f64, lead_time_days: i64, safety_stock: i64) -> i64 {
        stockledger_planning::compute_reorder_point(demand_rate_per_day, lead_time_days, safety_stock)
    }

    /// Issue statistics for one stock item over the trailing window.
    pub fn calculate_demand_statistics(&self, key: StockKey, window_days: u32) -> ServiceResult<DemandStatistics> {
        self.inventory.stock_item(key)?;
        let movements = self.inventory.movements(key)?;
        Ok(stockledger_planning::calculate_demand_statistics(&movements, self.now(), window_days)?)
    }

    /// Stored params, reconciled with the stock item's current reorder point and policy.
    pub fn planning_params(&self, key: StockKey) -> ServiceResult<Option<PlanningParams>> {
        self.synced_params(key)
    }

    /// Stock items can be re-planned from the inventory side (reorder overrides, imports).
    /// Stored params adopt those values so both sides keep the same reorder level.
    fn synced_params(&self, key: StockKey) -> ServiceResult<Option<PlanningParams>> {
        let Some(mut params) = self.params.get(&key) else {
            return Ok(None);
        };
        let stock = self.inventory.stock_item(key)?.stock;
        if params.computed_reorder_level != stock.reorder_point || params.consumption_policy != stock.policy {
            debug!(
                stock = %key,
                stored = params.computed_reorder_level,
                current = stock.reorder_point,
                "planning params follow stock item override"
            );
            params.computed_reorder_level = stock.reorder_point;
            params.consumption_policy = stock.policy;
            params.updated_at = self.now();
            self.params.upsert(key, params.clone());
        }
        Ok(Some(params))
    }

    /// Override reorder point and/or quantity, keeping stored params in step.
    pub fn set_reorder_plan(
        &self,
        key: StockKey,
        reorder_point: Option<i64>,
        reorder_quantity: Option<i64>,
    ) -> ServiceResult<StockItemView> {
        let view = self.inventory.set_reorder_plan(key, reorder_point, reorder_quantity)?;
        self.synced_params(key)?;
        Ok(view)
    }

    /// Manual override of a stock item's planning inputs.
    ///
    /// The stock item's reorder point and policy follow the stored params.
    pub fn upsert_planning_params(
        &self,
        key: StockKey,
        demand_rate_per_day: f64,
        lead_time_days: i64,
        safety_stock: i64,
        policy: ConsumptionPolicy,
    ) -> ServiceResult<PlanningParams> {
        let params = PlanningParams::new(key, demand_rate_per_day, lead_time_days, safety_stock, policy, self.now())?;
        self.store_params(params)
    }

    /// Patch existing params. NotFound when none were stored.
    pub fn update_planning_params(&self, key: StockKey, patch: &PlanningParamsPatch) -> ServiceResult<PlanningParams> {
        let current = self
            .synced_params(key)?
            .ok_or_else(|| DomainError::not_found(format!("planning params for {key}")))?;
        let next = current.patched(patch, self.now())?;
        self.store_params(next)
    }

    fn store_params(&self, params: PlanningParams) -> ServiceResult<PlanningParams> {
        let key = params.key;
        self.inventory
            .set_reorder_plan(key, Some(params.computed_reorder_level), None)?;
        self.inventory.set_policy(key, params.consumption_policy)?;
        self.params.upsert(key, params.clone());
        info!(
            stock = %key,
            reorder_point = params.computed_reorder_level,
            demand_rate = params.demand_rate_per_day,
            lead_time_days = params.lead_time_days,
            "planning params stored"
        );
        Ok(params)
    }

    /// Recompute reorder points from observed demand.
    ///
    /// Items of inactive profiles and items without demand in the window are skipped.
    /// Only significant changes are written.
    pub fn recalculate_reorder_points(
        &self,
        location: Option<LocationId>,
        window_days: Option<u32>,
    ) -> ServiceResult<ReorderReport> {
        let window = window_days.unwrap_or(self.settings.window_days);
        let now = self.now();
        let mut report = ReorderReport {
            items_analyzed: 0,
            items_updated: 0,
            changes: Vec::new(),
        };

        for view in self.inventory.stock_items(location) {
            let key = view.stock.key();
            let profile = self.profiles.get(&key.item_id);
            if profile.as_ref().is_some_and(|p| !p.active) {
                continue;
            }
            let movements = self.inventory.movements(key)?;
            let stats = stockledger_planning::calculate_demand_statistics(&movements, now, window)?;
            if stats.daily_demand <= 0.0 {
                continue;
            }
            report.items_analyzed += 1;

            let params = self.synced_params(key)?;
            let (lead_time_days, safety_stock) = match (&params, &profile) {
                (Some(p), _) => (p.lead_time_days, p.safety_stock),
                (None, Some(p)) => (p.lead_time_days, p.safety_stock),
                (None, None) => (0, 0),
            };
            let class = self.abc.get(&key.item_id).and_then(|r| r.abc_class);
            let old = view.stock.reorder_point;
            let new = recalculated_reorder_point(&stats, lead_time_days, safety_stock, class, &self.settings);
            debug!(stock = %key, daily_demand = stats.daily_demand, cv = stats.coefficient_of_variation, old, new, "reorder point evaluated");

            if !is_significant_change(old, new) {
                continue;
            }
            self.inventory.set_reorder_plan(key, Some(new), None)?;
            if let Some(mut p) = params {
                p.demand_rate_per_day = stats.daily_demand;
                p.computed_reorder_level = new;
                p.updated_at = now;
                self.params.upsert(key, p);
            }
            report.items_updated += 1;
            report.changes.push(ReorderChange {
                key,
                old_reorder_point: old,
                new_reorder_point: new,
                daily_demand: stats.daily_demand,
                lead_time_days,
                abc_class: class,
            });
        }

        info!(
            location = ?location,
            window_days = window,
            analyzed = report.items_analyzed,
            updated = report.items_updated,
            "reorder points recalculated"
        );
        Ok(report)
    }

    // ---- EOQ --------------------------------------------------------------------

    /// Economic order quantity for an item; stored as reorder quantity on each of its stock items.
    ///
    /// Omitted inputs fall back to the trailing annual issue volume and the configured costs.
    pub fn calculate_eoq(
        &self,
        item_id: ItemId,
        annual_demand: Option<i64>,
        ordering_cost: Option<Money>,
        holding_cost_rate: Option<f64>,
    ) -> ServiceResult<EoqReport> {
        let profile = self
            .profiles
            .get(&item_id)
            .ok_or_else(|| DomainError::not_found(format!("item profile {item_id}")))?;
        let annual_demand = match annual_demand {
            Some(d) => d,
            None => self.trailing_issue_volume(item_id, self.settings.annual_window_days)?,
        };

        let report = stockledger_planning::calculate_eoq(
            annual_demand,
            ordering_cost.unwrap_or(self.settings.ordering_cost),
            holding_cost_rate.unwrap_or(self.settings.holding_cost_rate),
            profile.standard_cost,
            profile.minimum_order_quantity,
        );

        for view in self.inventory.stock_items_for(item_id) {
            self.inventory
                .set_reorder_plan(view.stock.key(), None, Some(report.economic_order_quantity))?;
        }
        info!(item = %item_id, annual_demand, eoq = report.economic_order_quantity, "economic order quantity computed");
        Ok(report)
    }

    fn trailing_issue_volume(&self, item_id: ItemId, window_days: u32) -> ServiceResult<i64> {
        let movements = self.inventory.item_movements(item_id)?;
        Ok(issued_volume(&movements, self.now(), window_days))
    }

    // ---- recommendations --------------------------------------------------------

    /// Stock items at or below their reorder point, most urgent first.
    pub fn reorder_recommendations(
        &self,
        location: Option<LocationId>,
        class_filter: Option<AbcClass>,
    ) -> ServiceResult<Vec<ReorderRecommendation>> {
        let now = self.now();
        let mut recommendations = Vec::new();

        for view in self.inventory.items_below_reorder_point(location) {
            let key = view.stock.key();
            let class = self.abc.get(&key.item_id).and_then(|r| r.abc_class);
            if class_filter.is_some_and(|wanted| class != Some(wanted)) {
                continue;
            }
            let profile = self.profiles.get(&key.item_id);
            let movements = self.inventory.movements(key)?;
            let daily = issued_volume(&movements, now, STOCKOUT_WINDOW_DAYS) as f64 / f64::from(STOCKOUT_WINDOW_DAYS);
            recommendations.push(recommend(&view.stock, class, profile.as_ref(), daily, now.date_naive()));
        }

        recommendations.sort_by(|a, b| {
            b.urgency_score
                .total_cmp(&a.urgency_score)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(recommendations)
    }

    /// Stock coverage across active items: below-reorder and stocked-out counts and
    /// average days of stock at trailing demand.
    pub fn reorder_performance_metrics(
        &self,
        location: Option<LocationId>,
        window_days: Option<u32>,
    ) -> ServiceResult<ReorderPerformance> {
        let window = window_days.unwrap_or(STOCKOUT_WINDOW_DAYS);
        let now = self.now();
        let mut tally = PerformanceTally::default();
        for view in self.active_stock_items(location) {
            let key = view.stock.key();
            let movements = self.inventory.movements(key)?;
            let stats = stockledger_planning::calculate_demand_statistics(&movements, now, window)?;
            tally.observe(key, view.quantity_available, view.stock.reorder_point, stats.daily_demand);
        }
        let report = tally.finish();
        info!(
            items = report.total_items,
            below_reorder = report.items_below_reorder,
            stocked_out = report.items_stocked_out,
            "reorder performance measured"
        );
        Ok(report)
    }

    /// Scale every active item's reorder point by the current month's factor.
    ///
    /// Each call scales the current reorder points again.
    pub fn apply_seasonal_adjustments(&self, factors: &SeasonalFactors) -> ServiceResult<SeasonalAdjustment> {
        let month = self.now().month();
        let factor = factors.factor_for(month);
        let mut adjustment = SeasonalAdjustment {
            month,
            factor,
            items_updated: 0,
        };
        if factor == 1.0 {
            return Ok(adjustment);
        }
        for view in self.active_stock_items(None) {
            let old = view.stock.reorder_point;
            let new = seasonal_reorder_point(old, factor);
            if new != old {
                self.set_reorder_plan(view.stock.key(), Some(new), None)?;
                adjustment.items_updated += 1;
            }
        }
        info!(month, factor, updated = adjustment.items_updated, "seasonal adjustment applied");
        Ok(adjustment)
    }

    /// Stock items whose profile is active; items without a profile count as active.
    fn active_stock_items(&self, location: Option<LocationId>) -> Vec<StockItemView> {
        self.inventory
            .stock_items(location)
            .into_iter()
            .filter(|v| self.profiles.get(&v.stock.item_id).is_none_or(|p| p.active))
            .collect()
    }

    // ---- item profiles ----------------------------------------------------------

    pub fn upsert_item_profile(&self, profile: ItemProfile) -> ServiceResult<ItemProfile> {
        profile.validate()?;
        self.profiles.upsert(profile.item_id, profile.clone());
        debug!(item = %profile.item_id, standard_cost = %profile.standard_cost, "item profile stored");
        Ok(profile)
    }

    pub fn item_profile(&self, item_id: ItemId) -> Option<ItemProfile> {
        self.profiles.get(&item_id)
    }

    // ---- ABC --------------------------------------------------------------------

    /// Record an item's annual demand. Its class is assigned by the next `recompute_all`.
    pub fn set_annual_demand(&self, item_id: ItemId, annual_demand: i64) -> ServiceResult<AbcRecord> {
        if annual_demand < 0 {
            return Err(DomainError::validation("annual demand cannot be negative").into());
        }
        let record = AbcRecord::new(item_id, annual_demand);
        self.abc.upsert(item_id, record.clone());
        Ok(record)
    }

    /// Reclassify every tracked item.
    ///
    /// Journal-sourced records (and stocked items without a record) take their demand
    /// from the trailing annual issues on every pass. Manual demands are kept.
    pub fn recompute_all(&self) -> ServiceResult<AbcSummary> {
        let now = self.now();
        let views = self.inventory.stock_items(None);
        let window = self.settings.annual_window_days;

        let mut records: HashMap<ItemId, AbcRecord> = self.abc.list().into_iter().map(|r| (r.item_id, r)).collect();
        let stocked: BTreeSet<ItemId> = views.iter().map(|v| v.stock.item_id).collect();
        for item_id in stocked {
            records
                .entry(item_id)
                .or_insert_with(|| AbcRecord::from_journal(item_id, 0));
        }
        for record in records.values_mut().filter(|r| r.tracks_journal()) {
            record.annual_demand = self.trailing_issue_volume(record.item_id, window)?;
        }

        // Value-weighted average cost per item, across its locations.
        let mut totals: HashMap<ItemId, (Money, i64)> = HashMap::new();
        for v in &views {
            let t = totals.entry(v.stock.item_id).or_insert((Money::ZERO, 0));
            t.0 = t.0.plus(v.stock.inventory_value);
            t.1 += v.stock.quantity_on_hand;
        }
        let unit_cost = |item_id: ItemId| -> Money {
            if let Some(cost) = totals.get(&item_id).and_then(|(value, qty)| value.per_unit(*qty)) {
                return cost;
            }
            self.profiles.get(&item_id).map_or(Money::ZERO, |p| p.standard_cost)
        };

        let (ranked, summary) = classify(records.into_values().collect(), unit_cost, &self.thresholds, now);
        for record in ranked {
            self.abc.upsert(record.item_id, record);
        }
        info!(
            items = summary.updated_count,
            a = summary.counts.a,
            b = summary.counts.b,
            c = summary.counts.c,
            "abc classification recomputed"
        );
        Ok(summary)
    }

    /// ABC records, highest consumption value first.
    pub fn abc_records(&self) -> Vec<AbcRecord> {
        let mut records = self.abc.list();
        records.sort_by(|a, b| {
            b.annual_consumption_value
                .cmp(&a.annual_consumption_value)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        records
    }

    // ---- import -----------------------------------------------------------------

    /// Import stock items and store the rows' item profiles.
    pub fn import_items(&self, batch: ItemImportBatch) -> ServiceResult<ImportReport> {
        let profiles: Vec<ItemProfile> = batch.rows.iter().filter_map(|r| r.profile.clone()).collect();
        let keys: Vec<StockKey> = batch.rows.iter().map(|r| r.key()).collect();
        let mut report = self.inventory.import_items(batch)?;
        for profile in profiles {
            self.upsert_item_profile(profile)?;
            report.profiles += 1;
        }
        for key in keys {
            self.synced_params(key)?;
        }
        Ok(report)
    }
}
