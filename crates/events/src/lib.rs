//! Event mechanics shared by the ledger and its read models.
//!
//! - `Event`: typed, versioned, append-only facts
//! - `EventEnvelope`: stream metadata around a payload
//! - `EventBus`: post-commit fan-out to subscribers
//! - `Projection`: read-model builders fed from envelopes

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
