//! Inventory operations: receipts, lots, allocations, issues and adjustments.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use stockledger_core::{
    AllocationId, Clock, DomainError, ItemId, LocationId, LotId, Money, MovementId, StockKey, SystemClock,
};
use stockledger_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use stockledger_inventory::{
    AdjustStock, AllocateStock, Allocation, ConsumptionPolicy, DemandRef, IssueStock, LedgerCommand, LedgerEvent, Lot,
    Movement, ProvisionStockItem, ReceiveLot, ReleaseAllocations, ReleaseSelector, SetPolicy, SetReorderPlan,
    StockIssued, StockItemView, StockLedger,
};

use super::error::{ServiceError, ServiceResult};
use crate::command_dispatcher::{CommandDispatcher, Dispatched};
use crate::config::EngineConfig;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::import::{ImportReport, ItemImportBatch};
use crate::projections::{InventoryValuation, ReadModels};

pub type InMemoryInventoryService =
    InventoryService<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

/// A goods receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub key: StockKey,
    pub quantity: i64,
    pub unit_cost: Money,
    /// Defaults to the service clock.
    pub received_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reference: Option<String>,
}

impl Receipt {
    pub fn new(key: StockKey, quantity: i64, unit_cost: Money) -> Self {
        Self {
            key,
            quantity,
            unit_cost,
            received_at: None,
            expires_at: None,
            reference: None,
        }
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = Some(at);
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// One line of a multi-line demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandLine {
    pub key: StockKey,
    pub quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityLine {
    pub key: StockKey,
    pub required: i64,
    pub available: i64,
    pub shortfall: i64,
}

/// Feasibility of a demand. Lines on the same key are summed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub lines: Vec<AvailabilityLine>,
    pub can_fulfill: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlowMovingItem {
    pub stock: StockItemView,
    pub last_movement: DateTime<Utc>,
    pub days_since_movement: i64,
}

pub struct InventoryService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    read_models: Arc<ReadModels>,
    clock: Arc<dyn Clock>,
    default_policy: ConsumptionPolicy,
}

impl<S, B> core::fmt::Debug for InventoryService<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InventoryService")
            .field("default_policy", &self.default_policy)
            .finish_non_exhaustive()
    }
}

impl InMemoryInventoryService {
    /// Service over an in-memory journal and bus, on the wall clock.
    pub fn in_memory(config: &EngineConfig) -> Self {
        Self::in_memory_with_clock(config, Arc::new(SystemClock))
    }

    pub fn in_memory_with_clock(config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            config,
            clock,
        )
    }
}

impl<S, B> InventoryService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus).with_max_conflict_retries(config.max_conflict_retries),
            read_models: Arc::new(ReadModels::new()),
            clock,
            default_policy: config.default_policy,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn read_models(&self) -> &ReadModels {
        &self.read_models
    }

    /// Committed journal envelopes published after this call.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }

    fn execute(&self, command: LedgerCommand) -> ServiceResult<Dispatched<StockLedger>> {
        let key = command.key();
        let dispatched = self.dispatcher.dispatch(key, &command, StockLedger::empty)?;
        if !dispatched.committed.is_empty() {
            // The journal already holds the events; a lagging read model catches up on the next write.
            if let Err(err) = self.read_models.catch_up(self.dispatcher.store(), key) {
                warn!(stock = %key, command = command.name(), error = %err, "read model catch-up failed");
            }
        }
        Ok(dispatched)
    }

    fn load(&self, key: StockKey) -> ServiceResult<StockLedger> {
        let ledger = self.dispatcher.load(key, StockLedger::empty)?;
        if !ledger.is_created() {
            return Err(DomainError::not_found(format!("stock item {key}")).into());
        }
        Ok(ledger)
    }

    fn warn_on_drift(view: &StockItemView, operation: &str) {
        if view.lot_drift != 0 {
            warn!(
                item = %view.stock.item_id,
                location = %view.stock.location_id,
                lot_drift = view.lot_drift,
                operation,
                "stock aggregate and lot ledger disagree"
            );
        }
    }

    // ---- Lot Ledger -------------------------------------------------------------

    /// Create a stock item explicitly. Conflict if it already exists.
    pub fn provision(
        &self,
        key: StockKey,
        policy: Option<ConsumptionPolicy>,
        reorder_point: Option<i64>,
        reorder_quantity: Option<i64>,
    ) -> ServiceResult<StockItemView> {
        let dispatched = self.execute(LedgerCommand::Provision(ProvisionStockItem {
            key,
            policy: policy.unwrap_or(self.default_policy),
            reorder_point: reorder_point.unwrap_or(0),
            reorder_quantity: reorder_quantity.unwrap_or(0),
            occurred_at: self.clock.now(),
        }))?;
        info!(stock = %key, policy = %dispatched.aggregate.stock().policy, "stock item provisioned");
        Ok(dispatched.aggregate.view())
    }

    /// Record a receipt as a new lot. Creates the stock item on first receipt.
    pub fn receive(&self, receipt: Receipt) -> ServiceResult<Lot> {
        let now = self.clock.now();
        let lot_id = LotId::new();
        let dispatched = self.execute(LedgerCommand::Receive(ReceiveLot {
            key: receipt.key,
            lot_id,
            quantity: receipt.quantity,
            unit_cost: receipt.unit_cost,
            received_at: receipt.received_at.unwrap_or(now),
            expires_at: receipt.expires_at,
            reference: receipt.reference,
            policy_if_new: self.default_policy,
            occurred_at: now,
        }))?;

        let ledger = &dispatched.aggregate;
        let lot = ledger
            .lot(lot_id)
            .cloned()
            .ok_or_else(|| DomainError::invariant(format!("lot {lot_id} missing after receipt")))?;
        info!(
            stock = %receipt.key,
            lot = %lot_id,
            quantity = lot.quantity_received,
            unit_cost = %lot.unit_cost,
            on_hand = ledger.stock().quantity_on_hand,
            average_cost = %ledger.stock().average_cost,
            "lot received"
        );
        Ok(lot)
    }

    /// Lots of a stock item, received_at ascending (lot id breaks ties).
    pub fn list_lots(&self, key: StockKey) -> ServiceResult<Vec<Lot>> {
        Ok(self.load(key)?.lots().into_iter().cloned().collect())
    }

    pub fn lot(&self, lot_id: LotId) -> ServiceResult<Lot> {
        self.read_models
            .lots
            .get(&lot_id)
            .ok_or_else(|| DomainError::not_found(format!("lot {lot_id}")).into())
    }

    /// Lots with stock left that expire before `before`.
    pub fn expiring_lots(&self, location: Option<LocationId>, before: DateTime<Utc>) -> Vec<Lot> {
        self.read_models.lots.expiring(location, before)
    }

    // ---- Allocation Engine ------------------------------------------------------

    /// Reserve `quantity` for a demand, all or nothing.
    pub fn allocate(&self, demand_ref: &DemandRef, key: StockKey, quantity: i64) -> ServiceResult<Vec<Allocation>> {
        let dispatched = self.execute(LedgerCommand::Allocate(AllocateStock {
            key,
            demand_ref: demand_ref.clone(),
            quantity,
            occurred_at: self.clock.now(),
        }))?;

        let allocations: Vec<Allocation> = dispatched
            .events
            .iter()
            .filter_map(|ev| match ev {
                LedgerEvent::StockAllocated(e) => Some(e.allocations.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        for a in &allocations {
            debug!(stock = %key, lot = %a.lot_id, allocation = %a.allocation_id, quantity = a.quantity_allocated, "lot allocated");
        }
        info!(
            stock = %key,
            demand = %demand_ref,
            quantity,
            lots = allocations.len(),
            retries = dispatched.retries,
            available = dispatched.aggregate.stock().quantity_available(),
            "stock allocated"
        );
        Ok(allocations)
    }

    /// Release every open allocation of a demand, on every stock item.
    ///
    /// An unknown or already released demand returns an empty list. Keys are resolved
    /// through the allocation index, which is caught up with the journal first.
    pub fn release(&self, demand_ref: &DemandRef) -> ServiceResult<Vec<Allocation>> {
        self.read_models.catch_up_all(self.dispatcher.store())?;
        let keys = self.read_models.allocations.keys_for_demand(demand_ref);
        let mut released = Vec::new();
        for key in keys {
            released.extend(self.release_on(key, ReleaseSelector::Demand(demand_ref.clone()))?);
        }
        info!(demand = %demand_ref, allocations = released.len(), "demand released");
        Ok(released)
    }

    /// Release specific allocations. Unknown ids are ignored.
    pub fn release_allocations(&self, ids: &[AllocationId]) -> ServiceResult<Vec<Allocation>> {
        self.read_models.catch_up_all(self.dispatcher.store())?;
        let mut by_key: BTreeMap<StockKey, Vec<AllocationId>> = BTreeMap::new();
        for id in ids {
            if let Some(a) = self.read_models.allocations.get(id) {
                by_key.entry(StockKey::new(a.item_id, a.location_id)).or_default().push(*id);
            }
        }
        let mut released = Vec::new();
        for (key, ids) in by_key {
            released.extend(self.release_on(key, ReleaseSelector::Ids(ids))?);
        }
        info!(requested = ids.len(), allocations = released.len(), "allocations released");
        Ok(released)
    }

    fn release_on(&self, key: StockKey, selector: ReleaseSelector) -> ServiceResult<Vec<Allocation>> {
        let dispatched = self.execute(LedgerCommand::Release(ReleaseAllocations {
            key,
            selector,
            occurred_at: self.clock.now(),
        }))?;
        let released: Vec<Allocation> = dispatched
            .events
            .into_iter()
            .filter_map(|ev| match ev {
                LedgerEvent::AllocationReleased(e) => Some(e.allocation),
                _ => None,
            })
            .collect();
        let quantity: i64 = released.iter().map(|a| a.quantity_allocated).sum();
        if quantity > 0 {
            info!(stock = %key, quantity, allocations = released.len(), "stock released");
        }
        Ok(released)
    }

    /// Physically remove stock, consuming the reference's allocations first.
    pub fn issue(&self, key: StockKey, quantity: i64, reference: Option<&DemandRef>) -> ServiceResult<StockIssued> {
        let dispatched = self.execute(LedgerCommand::Issue(IssueStock {
            key,
            quantity,
            reference: reference.cloned(),
            occurred_at: self.clock.now(),
        }))?;
        let issued = dispatched
            .events
            .into_iter()
            .find_map(|ev| match ev {
                LedgerEvent::StockIssued(e) => Some(e),
                _ => None,
            })
            .ok_or_else(|| DomainError::invariant(format!("issue on {key} produced no event")))?;

        info!(
            stock = %key,
            quantity,
            reserved = issued.reserved_quantity(),
            cost_at_average = %issued.cost_at_average,
            cost_at_lots = %issued.cost_at_lots,
            on_hand = issued.quantity_after,
            "stock issued"
        );
        if issued.unlotted_quantity > 0 {
            warn!(stock = %key, unlotted = issued.unlotted_quantity, "issued stock not backed by any lot");
        }
        Ok(issued)
    }

    /// Set on-hand to a counted quantity. Lots are not touched.
    pub fn adjust(&self, key: StockKey, new_quantity: i64, reason: &str) -> ServiceResult<StockItemView> {
        let dispatched = self.execute(LedgerCommand::Adjust(AdjustStock {
            key,
            new_quantity,
            reason: reason.to_string(),
            occurred_at: self.clock.now(),
        }))?;
        let view = dispatched.aggregate.view();
        if !dispatched.events.is_empty() {
            info!(stock = %key, new_quantity, reason, "stock adjusted");
        }
        Self::warn_on_drift(&view, "adjust");
        Ok(view)
    }

    /// Open allocations of a demand, in allocation order.
    pub fn allocations_for(&self, demand_ref: &DemandRef) -> Vec<Allocation> {
        self.read_models.allocations.for_demand(demand_ref)
    }

    /// Per-key shortfalls for a multi-line demand. Nothing is reserved.
    pub fn check_availability(&self, lines: &[DemandLine]) -> ServiceResult<AvailabilityReport> {
        let mut required: BTreeMap<StockKey, i64> = BTreeMap::new();
        for line in lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!("demand line for {} must be positive", line.key)).into());
            }
            *required.entry(line.key).or_default() += line.quantity;
        }

        let lines: Vec<AvailabilityLine> = required
            .into_iter()
            .map(|(key, required)| {
                let available = self
                    .read_models
                    .stock
                    .get(&key)
                    .map_or(0, |l| l.stock.quantity_available().min(l.lot_backed_quantity).max(0));
                AvailabilityLine {
                    key,
                    required,
                    available,
                    shortfall: (required - available).max(0),
                }
            })
            .collect();
        let can_fulfill = lines.iter().all(|l| l.shortfall == 0);
        Ok(AvailabilityReport { lines, can_fulfill })
    }

    pub fn set_policy(&self, key: StockKey, policy: ConsumptionPolicy) -> ServiceResult<StockItemView> {
        let dispatched = self.execute(LedgerCommand::SetPolicy(SetPolicy {
            key,
            policy,
            occurred_at: self.clock.now(),
        }))?;
        if !dispatched.events.is_empty() {
            info!(stock = %key, %policy, "consumption policy changed");
        }
        Ok(dispatched.aggregate.view())
    }

    /// Update reorder point and/or reorder quantity; `None` keeps the current value.
    ///
    /// Stored planning params adopt the new reorder point on their next read
    /// (see `PlanningService::set_reorder_plan`).
    pub fn set_reorder_plan(
        &self,
        key: StockKey,
        reorder_point: Option<i64>,
        reorder_quantity: Option<i64>,
    ) -> ServiceResult<StockItemView> {
        let dispatched = self.execute(LedgerCommand::SetReorderPlan(SetReorderPlan {
            key,
            reorder_point,
            reorder_quantity,
            occurred_at: self.clock.now(),
        }))?;
        Ok(dispatched.aggregate.view())
    }

    // ---- Stock Aggregate --------------------------------------------------------

    /// Current state of one stock item, rehydrated from its journal.
    pub fn stock_item(&self, key: StockKey) -> ServiceResult<StockItemView> {
        Ok(self.load(key)?.view())
    }

    pub fn stock_items(&self, location: Option<LocationId>) -> Vec<StockItemView> {
        self.read_models.stock.list(location).iter().map(|l| l.view()).collect()
    }

    /// Stock items of one item across all locations.
    pub fn stock_items_for(&self, item_id: ItemId) -> Vec<StockItemView> {
        self.stock_items(None)
            .into_iter()
            .filter(|v| v.stock.item_id == item_id)
            .collect()
    }

    pub fn inventory_valuation(&self, location: Option<LocationId>) -> InventoryValuation {
        self.read_models.stock.valuation(location)
    }

    pub fn items_below_reorder_point(&self, location: Option<LocationId>) -> Vec<StockItemView> {
        self.stock_items(location)
            .into_iter()
            .filter(|v| v.stock.is_below_reorder_point())
            .collect()
    }

    /// Available quantity of an item summed over its locations.
    pub fn total_available_quantity(&self, item_id: ItemId) -> i64 {
        self.stock_items_for(item_id)
            .iter()
            .map(|v| v.quantity_available)
            .sum()
    }

    /// Stocked items without any movement in the last `days_without_movement` days,
    /// longest idle first.
    pub fn slow_moving_items(&self, days_without_movement: u32) -> ServiceResult<Vec<SlowMovingItem>> {
        let now = self.clock.now();
        let cutoff = now - chrono::Duration::days(i64::from(days_without_movement));
        let mut slow = Vec::new();
        for view in self.stock_items(None) {
            if view.stock.quantity_on_hand <= 0 {
                continue;
            }
            let Some(last_movement) = self.movements(view.stock.key())?.iter().map(|m| m.timestamp).max() else {
                continue;
            };
            if last_movement < cutoff {
                slow.push(SlowMovingItem {
                    days_since_movement: (now - last_movement).num_days(),
                    last_movement,
                    stock: view,
                });
            }
        }
        slow.sort_by(|a, b| {
            b.days_since_movement
                .cmp(&a.days_since_movement)
                .then_with(|| a.stock.stock.key().cmp(&b.stock.stock.key()))
        });
        debug!(days_without_movement, items = slow.len(), "slow moving items listed");
        Ok(slow)
    }

    /// Drop and replay every read model from the journal.
    pub fn rebuild_read_models(&self) -> ServiceResult<usize> {
        let replayed = self.read_models.rebuild_all(self.dispatcher.store())?;
        info!(events = replayed, "read models rebuilt");
        Ok(replayed)
    }

    // ---- Movement Journal -------------------------------------------------------

    /// Every movement of a stock item, oldest first. Empty for unknown keys.
    pub fn movements(&self, key: StockKey) -> ServiceResult<Vec<Movement>> {
        let mut movements = Vec::new();
        for stored in self.dispatcher.store().load_stream(key)? {
            let event = stored
                .to_typed_envelope::<LedgerEvent>()
                .map_err(|e| ServiceError::Deserialize(e.to_string()))?;
            if let Some(m) = event.payload().to_movement(MovementId::from_uuid(stored.event_id)) {
                movements.push(m);
            }
        }
        Ok(movements)
    }

    /// Movements at or after `since`.
    pub fn movements_since(&self, key: StockKey, since: DateTime<Utc>) -> ServiceResult<Vec<Movement>> {
        let mut movements = self.movements(key)?;
        movements.retain(|m| m.timestamp >= since);
        Ok(movements)
    }

    /// Movements of every stock item of `item_id`.
    pub fn item_movements(&self, item_id: ItemId) -> ServiceResult<Vec<Movement>> {
        let keys: BTreeSet<StockKey> = self
            .dispatcher
            .store()
            .streams()?
            .into_iter()
            .filter(|k| k.item_id == item_id)
            .collect();
        let mut movements = Vec::new();
        for key in keys {
            movements.extend(self.movements(key)?);
        }
        Ok(movements)
    }

    // ---- Batch import -----------------------------------------------------------

    /// Provision (or reuse) every row's stock item and record opening receipts.
    ///
    /// The batch is validated in full before the first write.
    pub fn import_items(&self, batch: ItemImportBatch) -> ServiceResult<ImportReport> {
        let batch = batch.validate().map_err(ServiceError::Import)?;
        let mut report = ImportReport::default();

        for row in batch.rows() {
            let key = row.key();
            match self.provision(key, row.policy, row.reorder_point, row.reorder_quantity) {
                Ok(_) => report.provisioned += 1,
                Err(ServiceError::Domain(DomainError::Conflict(_))) => {
                    report.reused += 1;
                    if let Some(policy) = row.policy {
                        self.set_policy(key, policy)?;
                    }
                    if row.reorder_point.is_some() || row.reorder_quantity.is_some() {
                        self.set_reorder_plan(key, row.reorder_point, row.reorder_quantity)?;
                    }
                }
                Err(err) => return Err(err),
            }
            if let Some(opening) = &row.opening {
                self.receive(Receipt::new(key, opening.quantity, opening.unit_cost).reference("opening balance"))?;
                report.opening_receipts += 1;
            }
        }

        info!(
            rows = batch.len(),
            provisioned = report.provisioned,
            reused = report.reused,
            opening_receipts = report.opening_receipts,
            "item import finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use stockledger_core::FixedClock;

    fn service() -> (InMemoryInventoryService, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()));
        (InMemoryInventoryService::in_memory_with_clock(&EngineConfig::default(), clock.clone()), clock)
    }

    fn key() -> StockKey {
        StockKey::new(ItemId::new(), LocationId::new())
    }

    fn demand(s: &str) -> DemandRef {
        DemandRef::new(s).unwrap()
    }

    #[test]
    fn receipt_creates_item_and_blends_average_cost() {
        let (svc, clock) = service();
        let k = key();

        svc.receive(Receipt::new(k, 10, Money::from_minor(100))).unwrap();
        clock.advance(chrono::Duration::hours(1));
        svc.receive(Receipt::new(k, 30, Money::from_minor(200))).unwrap();

        let view = svc.stock_item(k).unwrap();
        assert_eq!(view.stock.quantity_on_hand, 40);
        assert_eq!(view.stock.average_cost, Money::from_minor(175));
        assert_eq!(view.stock.policy, ConsumptionPolicy::Fifo);
        assert_eq!(svc.list_lots(k).unwrap().len(), 2);
        assert_eq!(svc.stock_items(None), vec![view]);
    }

    #[test]
    fn unknown_item_is_not_found() {
        let (svc, _) = service();
        let k = key();
        assert!(matches!(svc.list_lots(k), Err(ServiceError::Domain(DomainError::NotFound(_)))));
        assert!(matches!(
            svc.allocate(&demand("SO-1"), k, 1),
            Err(ServiceError::Domain(DomainError::NotFound(_)))
        ));
        assert!(svc.movements(k).unwrap().is_empty());
    }

    #[test]
    fn total_available_spans_locations() {
        let (svc, _) = service();
        let item = ItemId::new();
        let a = StockKey::new(item, LocationId::new());
        let b = StockKey::new(item, LocationId::new());
        svc.receive(Receipt::new(a, 10, Money::from_minor(10))).unwrap();
        svc.receive(Receipt::new(b, 6, Money::from_minor(10))).unwrap();
        svc.receive(Receipt::new(key(), 50, Money::from_minor(10))).unwrap();
        svc.allocate(&demand("SO-1"), b, 4).unwrap();

        assert_eq!(svc.total_available_quantity(item), 12);
        assert_eq!(svc.total_available_quantity(ItemId::new()), 0);
    }

    #[test]
    fn slow_moving_items_are_idle_stocked_items() {
        let (svc, clock) = service();
        let idle = key();
        let busy = key();
        let empty = key();
        svc.receive(Receipt::new(idle, 5, Money::from_minor(10))).unwrap();
        svc.receive(Receipt::new(busy, 5, Money::from_minor(10))).unwrap();
        svc.receive(Receipt::new(empty, 3, Money::from_minor(10))).unwrap();
        svc.issue(empty, 3, None).unwrap();

        clock.advance(chrono::Duration::days(100));
        svc.issue(busy, 1, None).unwrap();

        let slow = svc.slow_moving_items(90).unwrap();
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].stock.stock.key(), idle);
        assert_eq!(slow[0].days_since_movement, 100);
        assert!(svc.slow_moving_items(120).unwrap().is_empty());
    }

    #[test]
    fn release_sees_allocations_its_read_models_missed() {
        let store = Arc::new(InMemoryEventStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()));
        let config = EngineConfig::default();
        let writer: InMemoryInventoryService =
            InventoryService::new(store.clone(), Arc::new(InMemoryEventBus::new()), &config, clock.clone());
        let lagging: InMemoryInventoryService =
            InventoryService::new(store, Arc::new(InMemoryEventBus::new()), &config, clock);

        let k = key();
        let so = demand("SO-LAG");
        writer.receive(Receipt::new(k, 8, Money::from_minor(10))).unwrap();
        let allocated = writer.allocate(&so, k, 5).unwrap();
        assert!(lagging.allocations_for(&so).is_empty());

        let released = lagging.release(&so).unwrap();
        assert_eq!(released.len(), allocated.len());
        assert_eq!(lagging.stock_item(k).unwrap().stock.quantity_reserved, 0);
        assert!(lagging.allocations_for(&so).is_empty());

        let ids: Vec<AllocationId> = writer.allocate(&so, k, 2).unwrap().iter().map(|a| a.allocation_id).collect();
        assert_eq!(lagging.release_allocations(&ids).unwrap().len(), ids.len());
        assert_eq!(writer.stock_item(k).unwrap().stock.quantity_reserved, 0);
    }

    #[test]
    fn release_by_demand_spans_locations_and_is_idempotent() {
        let (svc, _) = service();
        let item = ItemId::new();
        let a = StockKey::new(item, LocationId::new());
        let b = StockKey::new(item, LocationId::new());
        svc.receive(Receipt::new(a, 5, Money::from_minor(10))).unwrap();
        svc.receive(Receipt::new(b, 5, Money::from_minor(10))).unwrap();

        let so = demand("SO-9");
        svc.allocate(&so, a, 3).unwrap();
        svc.allocate(&so, b, 2).unwrap();
        assert_eq!(svc.allocations_for(&so).len(), 2);

        let released = svc.release(&so).unwrap();
        assert_eq!(released.iter().map(|x| x.quantity_allocated).sum::<i64>(), 5);
        assert!(svc.release(&so).unwrap().is_empty());
        assert_eq!(svc.stock_item(a).unwrap().stock.quantity_reserved, 0);
        assert_eq!(svc.lot(svc.list_lots(b).unwrap()[0].lot_id).unwrap().quantity_remaining, 5);
    }

    #[test]
    fn release_allocations_ignores_unknown_ids() {
        let (svc, _) = service();
        let k = key();
        svc.receive(Receipt::new(k, 8, Money::from_minor(10))).unwrap();
        let allocs = svc.allocate(&demand("SO-2"), k, 6).unwrap();

        let released = svc.release_allocations(&[allocs[0].allocation_id, AllocationId::new()]).unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(svc.stock_item(k).unwrap().quantity_available, 8);
    }

    #[test]
    fn issue_against_reservation_leaves_residual() {
        let (svc, _) = service();
        let k = key();
        svc.receive(Receipt::new(k, 10, Money::from_minor(50))).unwrap();
        let so = demand("SO-3");
        svc.allocate(&so, k, 6).unwrap();

        let issued = svc.issue(k, 4, Some(&so)).unwrap();
        assert_eq!(issued.reserved_quantity(), 4);
        assert_eq!(issued.cost_at_average, Money::from_minor(200));

        let open = svc.allocations_for(&so);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].quantity_allocated, 2);

        let view = svc.stock_item(k).unwrap();
        assert_eq!((view.stock.quantity_on_hand, view.stock.quantity_reserved), (6, 2));
        assert_eq!(view.lot_drift, 0);
    }

    #[test]
    fn adjustment_flags_drift_and_journals_movement() {
        let (svc, _) = service();
        let k = key();
        svc.receive(Receipt::new(k, 10, Money::from_minor(50))).unwrap();

        let view = svc.adjust(k, 12, "cycle count").unwrap();
        assert_eq!(view.lot_drift, 2);
        assert!(matches!(svc.adjust(k, -1, "typo"), Err(ServiceError::Domain(DomainError::Validation(_)))));

        let movements = svc.movements(k).unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(stockledger_inventory::physical_balance(&movements), 12);
        assert_eq!(svc.inventory_valuation(None).total_value, Money::from_minor(600));
    }

    #[test]
    fn availability_sums_lines_per_key() {
        let (svc, _) = service();
        let k = key();
        svc.receive(Receipt::new(k, 5, Money::from_minor(10))).unwrap();

        let report = svc
            .check_availability(&[DemandLine { key: k, quantity: 3 }, DemandLine { key: k, quantity: 4 }])
            .unwrap();
        assert!(!report.can_fulfill);
        assert_eq!(report.lines[0].shortfall, 2);
        assert!(svc.check_availability(&[DemandLine { key: k, quantity: 0 }]).is_err());
    }

    #[test]
    fn rebuild_reproduces_read_models() {
        let (svc, _) = service();
        let k = key();
        svc.receive(Receipt::new(k, 10, Money::from_minor(10))).unwrap();
        svc.allocate(&demand("SO-4"), k, 4).unwrap();
        let before = svc.stock_items(None);

        assert_eq!(svc.rebuild_read_models().unwrap(), 3);
        assert_eq!(svc.stock_items(None), before);
        assert_eq!(svc.allocations_for(&demand("SO-4")).len(), 1);
    }

    #[test]
    fn committed_events_are_published() {
        let (svc, _) = service();
        let sub = svc.subscribe();
        svc.receive(Receipt::new(key(), 1, Money::ZERO)).unwrap();
        let types: Vec<String> = sub.drain().iter().map(|e| e.event_type().to_string()).collect();
        assert_eq!(types, vec!["stock.item.provisioned", "stock.lot.received"]);
    }
}
