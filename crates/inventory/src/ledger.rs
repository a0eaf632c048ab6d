use std::collections::BTreeMap;

use stockledger_core::{
    Aggregate, AggregateRoot, AllocationId, DomainError, DomainResult, LotId, Money, StockKey,
};

use crate::allocation::{Allocation, AllocationConsumption, DemandRef};
use crate::command::{
    AdjustStock, AllocateStock, IssueStock, LedgerCommand, ProvisionStockItem, ReceiveLot,
    ReleaseAllocations, ReleaseSelector, SetPolicy, SetReorderPlan,
};
use crate::event::{
    AllocationReleased, LedgerEvent, LotReceived, PolicyChanged, ReorderPlanUpdated,
    StockAdjusted, StockAllocated, StockIssued, StockItemProvisioned,
};
use crate::lot::{Lot, consumption_order, plan_draws};
use crate::stock::{ConsumptionPolicy, StockItem, StockItemView};

/// Aggregate root: one stock item at one location, with its lots and open allocations.
///
/// This is the unit of consistency for receipts, allocations, releases, issues and
/// adjustments. Its event stream is the movement journal for the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLedger {
    key: StockKey,
    created: bool,
    stock: StockItem,
    lots: BTreeMap<LotId, Lot>,
    /// Open allocations in allocation order.
    allocations: Vec<Allocation>,
    version: u64,
}

impl StockLedger {
    /// Create an empty, not-yet-provisioned aggregate instance for rehydration.
    pub fn empty(key: StockKey) -> Self {
        Self {
            key,
            created: false,
            stock: StockItem::new(key, ConsumptionPolicy::default()),
            lots: BTreeMap::new(),
            allocations: Vec::new(),
            version: 0,
        }
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn stock(&self) -> &StockItem {
        &self.stock
    }

    pub fn lot(&self, lot_id: LotId) -> Option<&Lot> {
        self.lots.get(&lot_id)
    }

    /// All lots, `received_at` ascending with `lot_id` tie-break.
    pub fn lots(&self) -> Vec<&Lot> {
        let mut lots: Vec<&Lot> = self.lots.values().collect();
        lots.sort_by(|a, b| a.received_at.cmp(&b.received_at).then_with(|| a.lot_id.cmp(&b.lot_id)));
        lots
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    pub fn allocations_for(&self, demand_ref: &DemandRef) -> Vec<&Allocation> {
        self.allocations
            .iter()
            .filter(|a| &a.demand_ref == demand_ref)
            .collect()
    }

    /// Unallocated quantity still sitting in lots.
    pub fn lot_backed_quantity(&self) -> i64 {
        self.lots.values().fold(0i64, |acc, l| acc.saturating_add(l.quantity_remaining))
    }

    pub fn lot_drift(&self) -> i64 {
        self.stock.quantity_available() - self.lot_backed_quantity()
    }

    pub fn view(&self) -> StockItemView {
        StockItemView {
            stock: self.stock.clone(),
            quantity_available: self.stock.quantity_available(),
            lot_drift: self.lot_drift(),
            version: self.version,
        }
    }

    /// Structural invariants that must hold after every applied event.
    pub fn check_invariants(&self) -> DomainResult<()> {
        let s = &self.stock;
        if s.quantity_reserved < 0 {
            return Err(DomainError::invariant(format!("{}: reserved quantity is negative", self.key)));
        }
        if s.quantity_on_hand < s.quantity_reserved {
            return Err(DomainError::invariant(format!(
                "{}: on-hand {} below reserved {}",
                self.key, s.quantity_on_hand, s.quantity_reserved
            )));
        }

        let allocated: i64 = self.allocations.iter().map(|a| a.quantity_allocated).sum();
        if allocated != s.quantity_reserved {
            return Err(DomainError::invariant(format!(
                "{}: reserved {} does not match open allocations {}",
                self.key, s.quantity_reserved, allocated
            )));
        }

        for lot in self.lots.values() {
            if lot.quantity_remaining < 0 || lot.quantity_remaining > lot.quantity_received {
                return Err(DomainError::invariant(format!(
                    "lot {}: remaining {} outside 0..={}",
                    lot.lot_id, lot.quantity_remaining, lot.quantity_received
                )));
            }
            let claimed: i64 = self
                .allocations
                .iter()
                .filter(|a| a.lot_id == lot.lot_id)
                .map(|a| a.quantity_allocated)
                .sum();
            if claimed + lot.quantity_remaining > lot.quantity_received {
                return Err(DomainError::invariant(format!(
                    "lot {}: allocations {} plus remaining {} exceed received {}",
                    lot.lot_id, claimed, lot.quantity_remaining, lot.quantity_received
                )));
            }
        }

        if let Some(orphan) = self.allocations.iter().find(|a| !self.lots.contains_key(&a.lot_id)) {
            return Err(DomainError::invariant(format!(
                "allocation {} references unknown lot {}",
                orphan.allocation_id, orphan.lot_id
            )));
        }

        Ok(())
    }
}

impl AggregateRoot for StockLedger {
    type Id = StockKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for StockLedger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::StockItemProvisioned(e) => {
                self.created = true;
                self.stock.policy = e.policy;
                self.stock.reorder_point = e.reorder_point;
                self.stock.reorder_quantity = e.reorder_quantity;
            }
            LedgerEvent::LotReceived(e) => {
                self.stock.add_value(e.lot.quantity_received, e.lot.unit_cost);
                self.lots.insert(e.lot.lot_id, e.lot.clone());
            }
            LedgerEvent::StockAllocated(e) => {
                for a in &e.allocations {
                    if let Some(lot) = self.lots.get_mut(&a.lot_id) {
                        lot.quantity_remaining -= a.quantity_allocated;
                    }
                    self.allocations.push(a.clone());
                }
                self.stock.quantity_reserved += e.quantity;
            }
            LedgerEvent::AllocationReleased(e) => {
                let a = &e.allocation;
                if let Some(lot) = self.lots.get_mut(&a.lot_id) {
                    lot.quantity_remaining += a.quantity_allocated;
                }
                self.allocations.retain(|open| open.allocation_id != a.allocation_id);
                self.stock.quantity_reserved -= a.quantity_allocated;
            }
            LedgerEvent::StockIssued(e) => {
                for c in &e.consumed {
                    let Some(idx) = self.allocations.iter().position(|a| a.allocation_id == c.allocation_id) else {
                        continue;
                    };
                    match &c.residual {
                        Some(residual) => self.allocations[idx] = residual.clone(),
                        None => {
                            self.allocations.remove(idx);
                        }
                    }
                }
                self.stock.quantity_reserved -= e.reserved_quantity();
                for d in &e.lot_draws {
                    if let Some(lot) = self.lots.get_mut(&d.lot_id) {
                        lot.quantity_remaining -= d.quantity;
                    }
                }
                self.stock.remove_at_average(e.quantity);
            }
            LedgerEvent::StockAdjusted(e) => {
                if e.quantity_delta > 0 {
                    let cost = e.unit_cost.unwrap_or(self.stock.average_cost);
                    self.stock.add_value(e.quantity_delta, cost);
                } else {
                    self.stock.remove_at_average(-e.quantity_delta);
                }
            }
            LedgerEvent::PolicyChanged(e) => {
                self.stock.policy = e.policy;
            }
            LedgerEvent::ReorderPlanUpdated(e) => {
                self.stock.reorder_point = e.reorder_point;
                self.stock.reorder_quantity = e.reorder_quantity;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.key() != self.key {
            return Err(DomainError::invariant(format!(
                "command for {} routed to ledger {}",
                command.key(),
                self.key
            )));
        }

        let events = match command {
            LedgerCommand::Provision(cmd) => self.handle_provision(cmd)?,
            LedgerCommand::Receive(cmd) => self.handle_receive(cmd)?,
            LedgerCommand::Allocate(cmd) => self.handle_allocate(cmd)?,
            LedgerCommand::Release(cmd) => self.handle_release(cmd),
            LedgerCommand::Issue(cmd) => self.handle_issue(cmd)?,
            LedgerCommand::Adjust(cmd) => self.handle_adjust(cmd)?,
            LedgerCommand::SetPolicy(cmd) => self.handle_set_policy(cmd)?,
            LedgerCommand::SetReorderPlan(cmd) => self.handle_set_reorder_plan(cmd)?,
        };

        self.verify(&events)?;
        Ok(events)
    }
}

impl StockLedger {
    fn ensure_created(&self) -> DomainResult<()> {
        if self.created {
            Ok(())
        } else {
            Err(DomainError::not_found(format!("stock item {}", self.key)))
        }
    }

    /// Apply the decided events to a scratch copy and check the result.
    fn verify(&self, events: &[LedgerEvent]) -> DomainResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut scratch = self.clone();
        for ev in events {
            scratch.apply(ev);
        }
        scratch.check_invariants()
    }

    fn handle_provision(&self, cmd: &ProvisionStockItem) -> DomainResult<Vec<LedgerEvent>> {
        if self.created {
            return Err(DomainError::conflict(format!("stock item {} already exists", self.key)));
        }
        if cmd.reorder_point < 0 || cmd.reorder_quantity < 0 {
            return Err(DomainError::validation("reorder point and quantity cannot be negative"));
        }
        Ok(vec![LedgerEvent::StockItemProvisioned(StockItemProvisioned {
            key: self.key,
            policy: cmd.policy,
            reorder_point: cmd.reorder_point,
            reorder_quantity: cmd.reorder_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveLot) -> DomainResult<Vec<LedgerEvent>> {
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("receipt quantity must be positive"));
        }
        if cmd.unit_cost.is_negative() {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }
        if cmd.expires_at.is_some_and(|exp| exp < cmd.received_at) {
            return Err(DomainError::validation("expiration precedes receipt"));
        }
        if self.lots.contains_key(&cmd.lot_id) {
            return Err(DomainError::conflict(format!("lot {} already received", cmd.lot_id)));
        }

        let mut events = Vec::with_capacity(2);
        if !self.created {
            events.push(LedgerEvent::StockItemProvisioned(StockItemProvisioned {
                key: self.key,
                policy: cmd.policy_if_new,
                reorder_point: 0,
                reorder_quantity: 0,
                occurred_at: cmd.occurred_at,
            }));
        }

        let before = self.stock.quantity_on_hand;
        let after = before
            .checked_add(cmd.quantity)
            .filter(|_| self.lot_backed_quantity().checked_add(cmd.quantity).is_some())
            .ok_or_else(|| DomainError::validation(format!("receipt of {} overflows stock at {}", cmd.quantity, self.key)))?;
        events.push(LedgerEvent::LotReceived(LotReceived {
            key: self.key,
            lot: Lot {
                lot_id: cmd.lot_id,
                item_id: self.key.item_id,
                location_id: self.key.location_id,
                quantity_received: cmd.quantity,
                quantity_remaining: cmd.quantity,
                unit_cost: cmd.unit_cost,
                received_at: cmd.received_at,
                expires_at: cmd.expires_at,
            },
            reference: cmd.reference.clone(),
            quantity_before: before,
            quantity_after: after,
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_allocate(&self, cmd: &AllocateStock) -> DomainResult<Vec<LedgerEvent>> {
        self.ensure_created()?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("allocation quantity must be positive"));
        }

        let available = self.stock.quantity_available();
        let allocatable = available.min(self.lot_backed_quantity()).max(0);
        let insufficient =
            || DomainError::insufficient(self.key.item_id, self.key.location_id, cmd.quantity, allocatable);
        if cmd.quantity > allocatable {
            return Err(insufficient());
        }

        let (draws, shortfall) = plan_draws(consumption_order(self.lots.values(), self.stock.policy), cmd.quantity);
        if shortfall > 0 {
            return Err(insufficient());
        }

        let allocations = draws
            .into_iter()
            .map(|d| Allocation {
                allocation_id: AllocationId::new(),
                demand_ref: cmd.demand_ref.clone(),
                item_id: self.key.item_id,
                location_id: self.key.location_id,
                lot_id: d.lot_id,
                quantity_allocated: d.quantity,
                allocated_at: cmd.occurred_at,
            })
            .collect();

        Ok(vec![LedgerEvent::StockAllocated(StockAllocated {
            key: self.key,
            demand_ref: cmd.demand_ref.clone(),
            quantity: cmd.quantity,
            allocations,
            available_before: available,
            available_after: available - cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Unknown ids and already-released demands produce no events.
    fn handle_release(&self, cmd: &ReleaseAllocations) -> Vec<LedgerEvent> {
        let targets: Vec<&Allocation> = match &cmd.selector {
            ReleaseSelector::Demand(demand_ref) => self.allocations_for(demand_ref),
            ReleaseSelector::Ids(ids) => self
                .allocations
                .iter()
                .filter(|a| ids.contains(&a.allocation_id))
                .collect(),
        };

        let mut available = self.stock.quantity_available();
        targets
            .into_iter()
            .map(|a| {
                let before = available;
                available += a.quantity_allocated;
                LedgerEvent::AllocationReleased(AllocationReleased {
                    key: self.key,
                    allocation: a.clone(),
                    available_before: before,
                    available_after: available,
                    occurred_at: cmd.occurred_at,
                })
            })
            .collect()
    }

    fn handle_issue(&self, cmd: &IssueStock) -> DomainResult<Vec<LedgerEvent>> {
        self.ensure_created()?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("issue quantity must be positive"));
        }

        let mut needed = cmd.quantity;
        let mut consumed = Vec::new();
        let mut cost_at_lots = Money::ZERO;
        let average = self.stock.average_cost;

        if let Some(demand_ref) = &cmd.reference {
            for a in self.allocations_for(demand_ref) {
                if needed == 0 {
                    break;
                }
                let take = a.quantity_allocated.min(needed);
                let residual = (take < a.quantity_allocated).then(|| Allocation {
                    allocation_id: AllocationId::new(),
                    quantity_allocated: a.quantity_allocated - take,
                    ..a.clone()
                });
                let lot_cost = self.lots.get(&a.lot_id).map_or(average, |l| l.unit_cost);
                cost_at_lots = cost_at_lots.plus(lot_cost.times(take));
                consumed.push(AllocationConsumption {
                    allocation_id: a.allocation_id,
                    lot_id: a.lot_id,
                    quantity: take,
                    residual,
                });
                needed -= take;
            }
        }

        let available = self.stock.quantity_available();
        if needed > available {
            let covered = cmd.quantity - needed + available.max(0);
            return Err(DomainError::insufficient(
                self.key.item_id,
                self.key.location_id,
                cmd.quantity,
                covered,
            ));
        }

        let from_lots = needed.min(self.lot_backed_quantity().max(0));
        let (lot_draws, _) = plan_draws(consumption_order(self.lots.values(), self.stock.policy), from_lots);
        for d in &lot_draws {
            cost_at_lots = cost_at_lots.plus(d.unit_cost.times(d.quantity));
        }
        let unlotted_quantity = needed - from_lots;
        cost_at_lots = cost_at_lots.plus(average.times(unlotted_quantity));

        let before = self.stock.quantity_on_hand;
        Ok(vec![LedgerEvent::StockIssued(StockIssued {
            key: self.key,
            quantity: cmd.quantity,
            reference: cmd.reference.clone(),
            consumed,
            lot_draws,
            unlotted_quantity,
            unit_cost: average,
            cost_at_average: average.times(cmd.quantity),
            cost_at_lots,
            quantity_before: before,
            quantity_after: before - cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> DomainResult<Vec<LedgerEvent>> {
        self.ensure_created()?;
        if cmd.new_quantity < 0 {
            return Err(DomainError::validation("adjusted quantity cannot be negative"));
        }
        if cmd.new_quantity < self.stock.quantity_reserved {
            return Err(DomainError::validation(format!(
                "adjusted quantity {} is below reserved {}",
                cmd.new_quantity, self.stock.quantity_reserved
            )));
        }

        let before = self.stock.quantity_on_hand;
        let delta = cmd.new_quantity - before;
        if delta == 0 {
            return Ok(vec![]);
        }

        Ok(vec![LedgerEvent::StockAdjusted(StockAdjusted {
            key: self.key,
            quantity_delta: delta,
            unit_cost: (delta > 0).then_some(self.stock.average_cost),
            reason: cmd.reason.clone(),
            quantity_before: before,
            quantity_after: cmd.new_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_policy(&self, cmd: &SetPolicy) -> DomainResult<Vec<LedgerEvent>> {
        self.ensure_created()?;
        if cmd.policy == self.stock.policy {
            return Ok(vec![]);
        }
        Ok(vec![LedgerEvent::PolicyChanged(PolicyChanged {
            key: self.key,
            policy: cmd.policy,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_reorder_plan(&self, cmd: &SetReorderPlan) -> DomainResult<Vec<LedgerEvent>> {
        self.ensure_created()?;
        let reorder_point = cmd.reorder_point.unwrap_or(self.stock.reorder_point);
        let reorder_quantity = cmd.reorder_quantity.unwrap_or(self.stock.reorder_quantity);
        if reorder_point < 0 || reorder_quantity < 0 {
            return Err(DomainError::validation("reorder point and quantity cannot be negative"));
        }
        if reorder_point == self.stock.reorder_point && reorder_quantity == self.stock.reorder_quantity {
            return Ok(vec![]);
        }
        Ok(vec![LedgerEvent::ReorderPlanUpdated(ReorderPlanUpdated {
            key: self.key,
            reorder_point,
            reorder_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use stockledger_core::{ItemId, LocationId, MovementId, execute};

    use crate::movement::{Movement, physical_balance};

    fn test_key() -> StockKey {
        StockKey::new(ItemId::new(), LocationId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn day(n: i64) -> DateTime<Utc> {
        test_time() + Duration::days(n)
    }

    fn demand(s: &str) -> DemandRef {
        DemandRef::new(s).unwrap()
    }

    fn receive(ledger: &mut StockLedger, quantity: i64, cost: i64, at: DateTime<Utc>) -> LotId {
        let lot_id = LotId::new();
        let key = ledger.key();
        execute(
            ledger,
            &LedgerCommand::Receive(ReceiveLot {
                key,
                lot_id,
                quantity,
                unit_cost: Money::from_minor(cost),
                received_at: at,
                expires_at: None,
                reference: None,
                policy_if_new: ConsumptionPolicy::Fifo,
                occurred_at: at,
            }),
        )
        .unwrap();
        lot_id
    }

    fn allocate(ledger: &mut StockLedger, r: &str, quantity: i64) -> DomainResult<Vec<LedgerEvent>> {
        let key = ledger.key();
        execute(
            ledger,
            &LedgerCommand::Allocate(AllocateStock {
                key,
                demand_ref: demand(r),
                quantity,
                occurred_at: test_time(),
            }),
        )
    }

    fn release(ledger: &mut StockLedger, r: &str) -> Vec<LedgerEvent> {
        let key = ledger.key();
        execute(
            ledger,
            &LedgerCommand::Release(ReleaseAllocations {
                key,
                selector: ReleaseSelector::Demand(demand(r)),
                occurred_at: test_time(),
            }),
        )
        .unwrap()
    }

    fn issue(ledger: &mut StockLedger, quantity: i64, r: Option<&str>) -> DomainResult<Vec<LedgerEvent>> {
        let key = ledger.key();
        execute(
            ledger,
            &LedgerCommand::Issue(IssueStock {
                key,
                quantity,
                reference: r.map(demand),
                occurred_at: test_time(),
            }),
        )
    }

    fn adjust(ledger: &mut StockLedger, new_quantity: i64) -> DomainResult<Vec<LedgerEvent>> {
        let key = ledger.key();
        execute(
            ledger,
            &LedgerCommand::Adjust(AdjustStock {
                key,
                new_quantity,
                reason: "cycle count".to_string(),
                occurred_at: test_time(),
            }),
        )
    }

    fn three_lots(policy: ConsumptionPolicy) -> (StockLedger, [LotId; 3]) {
        let mut ledger = StockLedger::empty(test_key());
        let ids = [
            receive(&mut ledger, 5, 100, day(1)),
            receive(&mut ledger, 5, 200, day(2)),
            receive(&mut ledger, 5, 300, day(3)),
        ];
        let key = ledger.key();
        execute(
            &mut ledger,
            &LedgerCommand::SetPolicy(SetPolicy {
                key,
                policy,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        (ledger, ids)
    }

    fn remaining(ledger: &StockLedger, lot: LotId) -> i64 {
        ledger.lot(lot).unwrap().quantity_remaining
    }

    #[test]
    fn first_receipt_provisions_with_fifo_and_blends_cost() {
        let mut ledger = StockLedger::empty(test_key());
        receive(&mut ledger, 10, 1000, day(0));
        receive(&mut ledger, 30, 2000, day(1));

        assert!(ledger.is_created());
        assert_eq!(ledger.version(), 3);
        let stock = ledger.stock();
        assert_eq!(stock.policy, ConsumptionPolicy::Fifo);
        assert_eq!(stock.quantity_on_hand, 40);
        assert_eq!(stock.average_cost, Money::from_minor(1750));
    }

    #[test]
    fn receive_rejects_bad_arguments() {
        let ledger = StockLedger::empty(test_key());
        let base = ReceiveLot {
            key: ledger.key(),
            lot_id: LotId::new(),
            quantity: 0,
            unit_cost: Money::from_minor(10),
            received_at: day(2),
            expires_at: None,
            reference: None,
            policy_if_new: ConsumptionPolicy::Fifo,
            occurred_at: day(2),
        };
        let zero = ledger.handle(&LedgerCommand::Receive(base.clone()));
        assert!(matches!(zero, Err(DomainError::Validation(_))));

        let expired = ReceiveLot {
            quantity: 5,
            expires_at: Some(day(1)),
            ..base.clone()
        };
        assert!(matches!(
            ledger.handle(&LedgerCommand::Receive(expired)),
            Err(DomainError::Validation(_))
        ));

        let negative_cost = ReceiveLot {
            quantity: 5,
            unit_cost: Money::from_minor(-1),
            ..base
        };
        assert!(matches!(
            ledger.handle(&LedgerCommand::Receive(negative_cost)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn receipt_past_i64_range_is_rejected() {
        let mut ledger = StockLedger::empty(test_key());
        receive(&mut ledger, i64::MAX, 0, day(0));
        let before = ledger.clone();

        let cmd = LedgerCommand::Receive(ReceiveLot {
            key: before.key(),
            lot_id: LotId::new(),
            quantity: 1,
            unit_cost: Money::from_minor(10),
            received_at: day(1),
            expires_at: None,
            reference: None,
            policy_if_new: ConsumptionPolicy::Fifo,
            occurred_at: day(1),
        });
        assert!(matches!(execute(&mut ledger, &cmd), Err(DomainError::Validation(_))));
        assert_eq!(ledger, before);
    }

    #[test]
    fn provisioning_twice_is_a_conflict() {
        let mut ledger = StockLedger::empty(test_key());
        let cmd = LedgerCommand::Provision(ProvisionStockItem {
            key: ledger.key(),
            policy: ConsumptionPolicy::Lifo,
            reorder_point: 4,
            reorder_quantity: 20,
            occurred_at: test_time(),
        });
        execute(&mut ledger, &cmd).unwrap();
        assert_eq!(ledger.stock().policy, ConsumptionPolicy::Lifo);
        assert!(matches!(ledger.handle(&cmd), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn fifo_allocation_takes_oldest_lots_first() {
        let (mut ledger, [t1, t2, t3]) = three_lots(ConsumptionPolicy::Fifo);
        let events = allocate(&mut ledger, "SO-1", 8).unwrap();

        let LedgerEvent::StockAllocated(e) = &events[0] else {
            panic!("expected StockAllocated");
        };
        let taken: Vec<(LotId, i64)> = e.allocations.iter().map(|a| (a.lot_id, a.quantity_allocated)).collect();
        assert_eq!(taken, vec![(t1, 5), (t2, 3)]);
        assert_eq!((remaining(&ledger, t1), remaining(&ledger, t2), remaining(&ledger, t3)), (0, 2, 5));
        assert_eq!(ledger.stock().quantity_reserved, 8);
        assert_eq!(ledger.stock().quantity_on_hand, 15);
    }

    #[test]
    fn lifo_allocation_takes_newest_lots_first() {
        let (mut ledger, [t1, t2, t3]) = three_lots(ConsumptionPolicy::Lifo);
        allocate(&mut ledger, "SO-1", 8).unwrap();
        assert_eq!((remaining(&ledger, t1), remaining(&ledger, t2), remaining(&ledger, t3)), (5, 2, 0));
    }

    #[test]
    fn insufficient_allocation_leaves_lots_untouched() {
        let mut ledger = StockLedger::empty(test_key());
        let a = receive(&mut ledger, 5, 100, day(1));
        let b = receive(&mut ledger, 5, 100, day(2));
        let before = ledger.clone();

        match allocate(&mut ledger, "SO-1", 11) {
            Err(DomainError::InsufficientInventory { required, available, .. }) => {
                assert_eq!(required, 11);
                assert_eq!(available, 10);
            }
            other => panic!("expected insufficient inventory, got {other:?}"),
        }
        assert_eq!(ledger, before);
        assert_eq!((remaining(&ledger, a), remaining(&ledger, b)), (5, 5));
    }

    #[test]
    fn allocate_then_release_restores_state() {
        let (mut ledger, _) = three_lots(ConsumptionPolicy::Fifo);
        let stock_before = ledger.stock().clone();
        let lots_before: Vec<Lot> = ledger.lots().into_iter().cloned().collect();

        allocate(&mut ledger, "SO-1", 12).unwrap();
        let released = release(&mut ledger, "SO-1");
        assert_eq!(released.len(), 3);

        assert_eq!(ledger.stock(), &stock_before);
        let lots_after: Vec<Lot> = ledger.lots().into_iter().cloned().collect();
        assert_eq!(lots_after, lots_before);
        assert!(ledger.allocations().is_empty());
    }

    #[test]
    fn second_release_is_a_no_op() {
        let (mut ledger, _) = three_lots(ConsumptionPolicy::Fifo);
        allocate(&mut ledger, "SO-1", 6).unwrap();
        assert!(!release(&mut ledger, "SO-1").is_empty());
        let after_first = ledger.clone();
        assert!(release(&mut ledger, "SO-1").is_empty());
        assert_eq!(ledger, after_first);
    }

    #[test]
    fn release_by_ids_ignores_unknown_ids() {
        let (mut ledger, _) = three_lots(ConsumptionPolicy::Fifo);
        allocate(&mut ledger, "SO-1", 7).unwrap();
        let first = ledger.allocations()[0].allocation_id;

        let key = ledger.key();
        let events = execute(
            &mut ledger,
            &LedgerCommand::Release(ReleaseAllocations {
                key,
                selector: ReleaseSelector::Ids(vec![first, AllocationId::new()]),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(ledger.stock().quantity_reserved, 2);
    }

    #[test]
    fn issue_consumes_reservation_and_leaves_residual() {
        let (mut ledger, [t1, t2, _]) = three_lots(ConsumptionPolicy::Fifo);
        allocate(&mut ledger, "SO-1", 8).unwrap();

        let events = issue(&mut ledger, 6, Some("SO-1")).unwrap();
        let LedgerEvent::StockIssued(e) = &events[0] else {
            panic!("expected StockIssued");
        };
        assert_eq!(e.reserved_quantity(), 6);
        assert!(e.lot_draws.is_empty());
        assert_eq!(e.cost_at_lots, Money::from_minor(5 * 100 + 200));

        let open = ledger.allocations_for(&demand("SO-1"));
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].lot_id, t2);
        assert_eq!(open[0].quantity_allocated, 2);
        assert_eq!(ledger.stock().quantity_reserved, 2);
        assert_eq!(ledger.stock().quantity_on_hand, 9);
        assert_eq!(remaining(&ledger, t1), 0);
        assert_eq!(ledger.lot_drift(), 0);
    }

    #[test]
    fn issue_beyond_reservation_draws_from_free_lots() {
        let (mut ledger, [t1, t2, t3]) = three_lots(ConsumptionPolicy::Fifo);
        allocate(&mut ledger, "SO-1", 3).unwrap();
        issue(&mut ledger, 5, Some("SO-1")).unwrap();

        assert!(ledger.allocations().is_empty());
        assert_eq!(ledger.stock().quantity_reserved, 0);
        assert_eq!(ledger.stock().quantity_on_hand, 10);
        assert_eq!((remaining(&ledger, t1), remaining(&ledger, t2), remaining(&ledger, t3)), (0, 5, 5));
    }

    #[test]
    fn issue_cannot_eat_other_reservations() {
        let (mut ledger, _) = three_lots(ConsumptionPolicy::Fifo);
        allocate(&mut ledger, "SO-1", 12).unwrap();
        match issue(&mut ledger, 4, None) {
            Err(DomainError::InsufficientInventory { available, .. }) => assert_eq!(available, 3),
            other => panic!("expected insufficient inventory, got {other:?}"),
        }
    }

    #[test]
    fn adjust_validates_and_flags_drift() {
        let (mut ledger, _) = three_lots(ConsumptionPolicy::Fifo);
        allocate(&mut ledger, "SO-1", 4).unwrap();

        assert!(matches!(adjust(&mut ledger, -1), Err(DomainError::Validation(_))));
        assert!(matches!(adjust(&mut ledger, 3), Err(DomainError::Validation(_))));
        assert!(adjust(&mut ledger, 15).unwrap().is_empty());

        adjust(&mut ledger, 18).unwrap();
        assert_eq!(ledger.stock().quantity_on_hand, 18);
        assert_eq!(ledger.lot_drift(), 3);
        assert_eq!(ledger.lot_backed_quantity(), 11);

        // Free lot stock is 11, available is 14: the last 3 go out unlotted.
        let events = issue(&mut ledger, 14, None).unwrap();
        let LedgerEvent::StockIssued(e) = &events[0] else {
            panic!("expected StockIssued");
        };
        assert_eq!(e.unlotted_quantity, 3);
        assert_eq!(ledger.lot_drift(), 0);
    }

    #[test]
    fn negative_adjustment_limits_allocation_to_available() {
        let (mut ledger, _) = three_lots(ConsumptionPolicy::Fifo);
        adjust(&mut ledger, 10).unwrap();
        assert_eq!(ledger.lot_drift(), -5);
        match allocate(&mut ledger, "SO-1", 11) {
            Err(DomainError::InsufficientInventory { available, .. }) => assert_eq!(available, 10),
            other => panic!("expected insufficient inventory, got {other:?}"),
        }
        allocate(&mut ledger, "SO-1", 10).unwrap();
    }

    #[test]
    fn reorder_plan_updates_only_on_change() {
        let (mut ledger, _) = three_lots(ConsumptionPolicy::Fifo);
        let cmd = LedgerCommand::SetReorderPlan(SetReorderPlan {
            key: ledger.key(),
            reorder_point: Some(20),
            reorder_quantity: None,
            occurred_at: test_time(),
        });
        assert_eq!(execute(&mut ledger, &cmd).unwrap().len(), 1);
        assert!(execute(&mut ledger, &cmd).unwrap().is_empty());
        assert!(ledger.stock().is_below_reorder_point());
    }

    #[test]
    fn commands_on_unknown_item_are_not_found() {
        let mut ledger = StockLedger::empty(test_key());
        assert!(matches!(allocate(&mut ledger, "SO-1", 1), Err(DomainError::NotFound(_))));
        assert!(matches!(issue(&mut ledger, 1, None), Err(DomainError::NotFound(_))));
        assert!(release(&mut ledger, "SO-1").is_empty());
    }

    #[test]
    fn misrouted_command_is_rejected() {
        let mut ledger = StockLedger::empty(test_key());
        receive(&mut ledger, 5, 100, day(1));
        let cmd = LedgerCommand::Allocate(AllocateStock {
            key: test_key(),
            demand_ref: demand("SO-1"),
            quantity: 1,
            occurred_at: test_time(),
        });
        assert!(matches!(ledger.handle(&cmd), Err(DomainError::InvariantViolation(_))));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Receive { quantity: i64, cost: i64, day: i64 },
        Allocate { demand: u8, quantity: i64 },
        Release { demand: u8 },
        Issue { demand: Option<u8>, quantity: i64 },
        Adjust { new_quantity: i64 },
        Lifo(bool),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (1i64..40, 0i64..5_000, 0i64..30).prop_map(|(quantity, cost, day)| Op::Receive { quantity, cost, day }),
            3 => (0u8..3, 1i64..50).prop_map(|(demand, quantity)| Op::Allocate { demand, quantity }),
            2 => (0u8..3).prop_map(|demand| Op::Release { demand }),
            2 => (prop::option::of(0u8..3), 1i64..30).prop_map(|(demand, quantity)| Op::Issue { demand, quantity }),
            1 => (0i64..120).prop_map(|new_quantity| Op::Adjust { new_quantity }),
            1 => any::<bool>().prop_map(Op::Lifo),
        ]
    }

    fn run(ledger: &mut StockLedger, op: &Op) -> DomainResult<Vec<LedgerEvent>> {
        let key = ledger.key();
        let demand_name = |d: u8| format!("SO-{d}");
        match op {
            Op::Receive { quantity, cost, day: d } => {
                let at = day(*d);
                execute(
                    ledger,
                    &LedgerCommand::Receive(ReceiveLot {
                        key,
                        lot_id: LotId::new(),
                        quantity: *quantity,
                        unit_cost: Money::from_minor(*cost),
                        received_at: at,
                        expires_at: None,
                        reference: None,
                        policy_if_new: ConsumptionPolicy::Fifo,
                        occurred_at: at,
                    }),
                )
            }
            Op::Allocate { demand: d, quantity } => allocate(ledger, &demand_name(*d), *quantity),
            Op::Release { demand: d } => Ok(release(ledger, &demand_name(*d))),
            Op::Issue { demand: d, quantity } => {
                let name = d.map(demand_name);
                issue(ledger, *quantity, name.as_deref())
            }
            Op::Adjust { new_quantity } => adjust(ledger, *new_quantity),
            Op::Lifo(lifo) => execute(
                ledger,
                &LedgerCommand::SetPolicy(SetPolicy {
                    key,
                    policy: if *lifo { ConsumptionPolicy::Lifo } else { ConsumptionPolicy::Fifo },
                    occurred_at: test_time(),
                }),
            ),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the journal's physical deltas always sum to on-hand, and reserved
        /// always equals the open allocations.
        #[test]
        fn journal_and_allocations_reconcile(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let mut ledger = StockLedger::empty(test_key());
            let mut journal: Vec<Movement> = Vec::new();

            for op in &ops {
                let before = ledger.clone();
                match run(&mut ledger, op) {
                    Ok(events) => {
                        journal.extend(events.iter().filter_map(|e| e.to_movement(MovementId::new())));
                    }
                    Err(_) => prop_assert_eq!(&ledger, &before),
                }

                prop_assert!(ledger.check_invariants().is_ok());
                prop_assert_eq!(physical_balance(&journal), ledger.stock().quantity_on_hand);
                let open: i64 = ledger.allocations().iter().map(|a| a.quantity_allocated).sum();
                prop_assert_eq!(open, ledger.stock().quantity_reserved);
                prop_assert!(ledger.stock().quantity_available() >= 0);
                prop_assert!(ledger.lots().iter().all(|l| l.quantity_remaining >= 0));
            }
        }

        /// Property: an allocation released right away restores the stock item and every lot.
        #[test]
        fn allocate_release_round_trip(
            ops in prop::collection::vec(op_strategy(), 0..25),
            quantity in 1i64..40,
        ) {
            let mut ledger = StockLedger::empty(test_key());
            receive(&mut ledger, 40, 250, day(0));
            for op in &ops {
                let _ = run(&mut ledger, op);
            }

            let stock_before = ledger.stock().clone();
            let lots_before: Vec<Lot> = ledger.lots().into_iter().cloned().collect();

            if allocate(&mut ledger, "ROUND-TRIP", quantity).is_ok() {
                release(&mut ledger, "ROUND-TRIP");
            }

            prop_assert_eq!(ledger.stock(), &stock_before);
            let lots_after: Vec<Lot> = ledger.lots().into_iter().cloned().collect();
            prop_assert_eq!(lots_after, lots_before);
        }
    }
}
