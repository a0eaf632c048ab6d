//! Inventory ledger domain (event-sourced).
//!
//! Lots, allocations, the movement journal and the per-(item, location)
//! `StockLedger` aggregate. Pure, deterministic domain logic: no IO, no storage.

pub mod allocation;
pub mod command;
pub mod event;
pub mod ledger;
pub mod lot;
pub mod movement;
pub mod stock;

pub use allocation::{Allocation, AllocationConsumption, DemandRef};
pub use command::{
    AdjustStock, AllocateStock, IssueStock, LedgerCommand, ProvisionStockItem, ReceiveLot,
    ReleaseAllocations, ReleaseSelector, SetPolicy, SetReorderPlan,
};
pub use event::{
    AllocationReleased, LedgerEvent, LotReceived, PolicyChanged, ReorderPlanUpdated,
    StockAdjusted, StockAllocated, StockIssued, StockItemProvisioned,
};
pub use ledger::StockLedger;
pub use lot::{Lot, LotDraw, consumption_order, plan_draws};
pub use movement::{Movement, MovementType, physical_balance};
pub use stock::{ConsumptionPolicy, StockItem, StockItemView};
