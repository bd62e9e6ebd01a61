//! Domain events and their transport primitives.
//!
//! Aggregates emit typed events (`Event`); infrastructure wraps them in
//! tenant-scoped envelopes and fans them out over an `EventBus` after they are
//! appended to the store.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
