//! Workflow orchestration.
//!
//! `ProcurementService` is the application boundary of the procurement core.
//! It resolves supplier credentials, allocates document numbers, calls the
//! extraction collaborator, and routes every mutation through the
//! [`CommandDispatcher`]. It also enforces the cross-aggregate references
//! (a client quote needs an accepted RFQ, a purchase order needs a paid
//! client quote). Domain rules stay in the aggregates.

mod orders;
mod quotes;
mod rfqs;
mod sweep;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::warn;

use quoteflow_core::{DomainError, TenantId};
use quoteflow_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use quoteflow_ordering::{PurchaseOrder, PurchaseOrderCommand, PurchaseOrderId};
use quoteflow_quoting::{ClientQuote, ClientQuoteCommand, ClientQuoteId};
use quoteflow_rfq::{Rfq, RfqCommand, RfqId};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::ProcurementConfig;
use crate::credentials::{CredentialIndex, InMemoryCredentialIndex};
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::extraction::{DocumentExtractor, NullExtractor};
use crate::projections::{RfqDirectoryProjection, RfqSummary};
use crate::read_model::InMemoryTenantStore;
use crate::sequence::{InMemorySequenceAllocator, SequenceAllocator};
use crate::streams;

pub use orders::OrderPlacement;
pub use quotes::{ClientQuoteRequest, PaymentStatus};
pub use rfqs::{NewRfq, SubmissionReceipt, SupplierInvitation, SupplierSubmission, SupplierView};
pub use sweep::SweepReport;

pub type ServiceResult<T> = Result<T, DispatchError>;

pub type JsonBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

/// Source of "now" for every command the service issues.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

type DirectoryStore = Arc<InMemoryTenantStore<RfqId, RfqSummary>>;

pub struct ProcurementService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    sequences: Arc<dyn SequenceAllocator>,
    credentials: Arc<dyn CredentialIndex>,
    extractor: Arc<dyn DocumentExtractor>,
    clock: Arc<dyn Clock>,
    directory: RfqDirectoryProjection<DirectoryStore>,
    feed: Mutex<Subscription<EventEnvelope<JsonValue>>>,
    config: ProcurementConfig,
}

impl ProcurementService<Arc<InMemoryEventStore>, Arc<JsonBus>> {
    /// Fully in-memory wiring: store, bus, sequences, credentials.
    pub fn in_memory(config: ProcurementConfig) -> Self {
        Self::new(Arc::new(InMemoryEventStore::new()), Arc::new(JsonBus::new()), config)
    }
}

impl<S, B> ProcurementService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, config: ProcurementConfig) -> Self {
        // Subscribe before the first dispatch so the directory sees every event.
        let feed = bus.subscribe();
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            sequences: Arc::new(InMemorySequenceAllocator::new()),
            credentials: Arc::new(InMemoryCredentialIndex::new()),
            extractor: Arc::new(NullExtractor),
            clock: Arc::new(SystemClock),
            directory: RfqDirectoryProjection::new(Arc::new(InMemoryTenantStore::new())),
            feed: Mutex::new(feed),
            config,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sequences(mut self, sequences: Arc<dyn SequenceAllocator>) -> Self {
        self.sequences = sequences;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialIndex>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn config(&self) -> &ProcurementConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Apply everything published so far to the read models.
    pub fn sync_read_models(&self) {
        // The feed holds no invariant a panicking reader could break.
        let feed = self.feed.lock().unwrap_or_else(|poisoned| {
            warn!("read model feed lock poisoned; recovering");
            poisoned.into_inner()
        });
        for envelope in feed.drain() {
            if let Err(err) = self.directory.apply_envelope(&envelope) {
                warn!(
                    tenant_id = %envelope.tenant_id(),
                    aggregate_id = %envelope.aggregate_id(),
                    event_type = envelope.event_type(),
                    error = %err,
                    "rfq directory apply failed"
                );
            }
        }
    }

    pub fn rfq_directory(&self, tenant_id: TenantId) -> Vec<RfqSummary> {
        self.sync_read_models();
        self.directory.list(tenant_id)
    }

    pub fn rfq(&self, tenant_id: TenantId, rfq_id: RfqId) -> ServiceResult<Rfq> {
        self.load_rfq(tenant_id, rfq_id).map(|(rfq, _)| rfq)
    }

    pub fn client_quote(&self, tenant_id: TenantId, quote_id: ClientQuoteId) -> ServiceResult<ClientQuote> {
        self.load_quote(tenant_id, quote_id).map(|(quote, _)| quote)
    }

    pub fn purchase_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> ServiceResult<PurchaseOrder> {
        let (order, _) = self.dispatcher.load(tenant_id, order_id.0, |_, id| {
            PurchaseOrder::empty(PurchaseOrderId::new(id))
        })?;
        if !order.is_created() {
            return Err(DomainError::NotFound.into());
        }
        Ok(order)
    }

    pub(crate) fn load_rfq(&self, tenant_id: TenantId, rfq_id: RfqId) -> ServiceResult<(Rfq, u64)> {
        let (rfq, version) = self
            .dispatcher
            .load(tenant_id, rfq_id.0, |_, id| Rfq::empty(RfqId::new(id)))?;
        if !rfq.is_created() {
            return Err(DomainError::NotFound.into());
        }
        Ok((rfq, version))
    }

    pub(crate) fn load_quote(
        &self,
        tenant_id: TenantId,
        quote_id: ClientQuoteId,
    ) -> ServiceResult<(ClientQuote, u64)> {
        let (quote, version) = self.dispatcher.load(tenant_id, quote_id.0, |_, id| {
            ClientQuote::empty(ClientQuoteId::new(id))
        })?;
        if !quote.is_created() {
            return Err(DomainError::NotFound.into());
        }
        Ok((quote, version))
    }

    pub(crate) fn run_rfq(
        &self,
        tenant_id: TenantId,
        rfq_id: RfqId,
        command: RfqCommand,
    ) -> ServiceResult<Rfq> {
        let (rfq, _) = self.dispatcher.execute(tenant_id, rfq_id.0, streams::RFQ, command, |_, id| {
            Rfq::empty(RfqId::new(id))
        })?;
        self.sync_read_models();
        Ok(rfq)
    }

    pub(crate) fn run_quote(
        &self,
        tenant_id: TenantId,
        quote_id: ClientQuoteId,
        command: ClientQuoteCommand,
    ) -> ServiceResult<ClientQuote> {
        let (quote, _) = self.dispatcher.execute(
            tenant_id,
            quote_id.0,
            streams::CLIENT_QUOTE,
            command,
            |_, id| ClientQuote::empty(ClientQuoteId::new(id)),
        )?;
        Ok(quote)
    }

    pub(crate) fn run_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        command: PurchaseOrderCommand,
    ) -> ServiceResult<PurchaseOrder> {
        let (order, _) = self.dispatcher.execute(
            tenant_id,
            order_id.0,
            streams::PURCHASE_ORDER,
            command,
            |_, id| PurchaseOrder::empty(PurchaseOrderId::new(id)),
        )?;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use chrono::Duration;
    use rust_decimal_macros::dec;

    use quoteflow_core::TenantId;
    use quoteflow_rfq::NewRfqLine;

    use super::*;

    #[test]
    fn directory_keeps_updating_after_a_reader_panicked() {
        let service = ProcurementService::in_memory(ProcurementConfig::default());
        let tenant_id = TenantId::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _feed = service.feed.lock().unwrap();
            panic!("reader failed while holding the feed");
        }));
        assert!(service.feed.is_poisoned());

        let rfq_id = service
            .create_rfq(
                tenant_id,
                NewRfq {
                    title: "Reading nook".to_string(),
                    description: None,
                    response_deadline: service.now() + Duration::days(7),
                    lines: vec![NewRfqLine {
                        name: "Armchair".to_string(),
                        description: None,
                        quantity: dec!(1),
                        unit: "ea".to_string(),
                        sku: None,
                        notes: None,
                    }],
                },
            )
            .unwrap();

        let rows = service.rfq_directory(tenant_id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rfq_id, rfq_id);
    }
}
