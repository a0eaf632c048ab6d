//! Application services: the engine's public operations.
//!
//! `InventoryService` owns the journal (through the command dispatcher) and the
//! read models. `PlanningService` keeps planning records and writes reorder
//! settings back through `InventoryService`, so every stock change is journaled.

pub mod error;
pub mod inventory;
pub mod planning;

pub use error::{ServiceError, ServiceResult};
pub use inventory::{
    AvailabilityLine, AvailabilityReport, DemandLine, InMemoryInventoryService, InventoryService, Receipt, SlowMovingItem,
};
pub use planning::PlanningService;
