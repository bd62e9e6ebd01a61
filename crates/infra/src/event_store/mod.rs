//! Append-only event store boundary.
//!
//! The procurement aggregates persist nothing but their event streams. The
//! trait stays storage-agnostic; the in-memory implementation backs tests and
//! single-process deployments.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
