//! Append-only event store boundary: the movement journal.
//!
//! An infrastructure-facing abstraction for storing and loading per-`StockKey`
//! event streams without making any storage assumptions.

pub mod in_memory;
pub mod store;

pub use in_memory::InMemoryEventStore;
pub use store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
