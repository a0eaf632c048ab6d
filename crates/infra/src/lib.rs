//! Infrastructure layer: journal storage, command dispatch, read models and the
//! engine's application services.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod import;
pub mod projections;
pub mod read_model;
pub mod services;


pub use config::{ConfigError, EngineConfig};
pub use services::{InMemoryInventoryService, InventoryService, PlanningService, ServiceError, ServiceResult};
