//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (tenant-scoped)
//!   ↓
//! 2. Rehydrate aggregate
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Append to store with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed events to the bus
//! ```
//!
//! Step 4 is the compare-and-swap every RFQ, client-quote and purchase-order
//! mutation goes through: a writer that loaded a stale stream gets
//! `DispatchError::Concurrency` and nothing is written. Publication happens
//! only after the append succeeded.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use quoteflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion, TenantId};
use quoteflow_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Deterministic domain failure (validation, transition, currency, payment...).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The stream moved on between load and append.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Cross-tenant or cross-aggregate data in a loaded stream.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// A historical payload no longer deserialises into the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append. The events are stored.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl DispatchError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            DispatchError::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// Message suitable for the person who issued the command.
    pub fn user_message(&self) -> String {
        match self {
            DispatchError::Domain(e) => e.user_message(),
            DispatchError::Concurrency(_) => {
                DomainError::conflict("stale version").user_message()
            }
            _ => "The request could not be completed. Try again shortly.".to_string(),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate from its stream.
    ///
    /// Returns the aggregate together with the stream version it reflects. A
    /// missing stream yields the `make_aggregate` result at version 0.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<(A, u64), DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok((aggregate, stream_version(&history)))
    }

    /// Load, decide, append and publish.
    ///
    /// An empty decision (idempotent command) appends nothing and returns an
    /// empty list.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: quoteflow_events::Event + Serialize + DeserializeOwned,
    {
        self.execute(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)
            .map(|(_, committed)| committed)
    }

    /// Like [`dispatch`](Self::dispatch), but the caller presents the version
    /// it read. Rejected with `Concurrency` before handling when the stream
    /// has already moved past it.
    pub fn dispatch_expecting<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        expected_version: u64,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: quoteflow_events::Event + Serialize + DeserializeOwned,
    {
        let (aggregate, version) = self.load(tenant_id, aggregate_id, make_aggregate)?;
        if version != expected_version {
            return Err(DispatchError::Concurrency(format!(
                "expected version {expected_version}, found {version}"
            )));
        }
        self.decide_and_commit(tenant_id, aggregate_id, aggregate_type.into(), aggregate, version, &command)
            .map(|(_, committed)| committed)
    }

    /// Dispatch and return the aggregate state after the new events.
    pub fn execute<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<(A, Vec<StoredEvent>), DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: quoteflow_events::Event + Serialize + DeserializeOwned,
    {
        let (aggregate, version) = self.load(tenant_id, aggregate_id, make_aggregate)?;
        self.decide_and_commit(tenant_id, aggregate_id, aggregate_type.into(), aggregate, version, &command)
    }

    fn decide_and_commit<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: String,
        mut aggregate: A,
        version: u64,
        command: &A::Command,
    ) -> Result<(A, Vec<StoredEvent>), DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: quoteflow_events::Event + Serialize + DeserializeOwned,
    {
        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok((aggregate, vec![]));
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, ExpectedVersion::Exact(version))?;

        for ev in &decided {
            aggregate.apply(ev);
        }
        debug_assert_eq!(aggregate.version(), version + decided.len() as u64);

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok((aggregate, committed))
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "gap or reordering in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(format!("{}: {e}", stored.event_type)))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
