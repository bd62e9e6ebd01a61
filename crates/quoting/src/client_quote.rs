use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quoteflow_core::{
    Aggregate, AggregateId, AggregateRoot, CurrencyCode, DocumentNumber, DomainError, Money,
    TenantId,
};
use quoteflow_events::Event;
use quoteflow_pricing::Markup;
use quoteflow_rfq::{RfqId, SupplierId};

use crate::builder::{
    AcceptedItem, ClientQuoteLine, CostBasisLine, MarkupPlan, PricedQuote, price_items,
};
use crate::status::ClientQuoteStatus;

/// Client quote identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientQuoteId(pub AggregateId);

impl ClientQuoteId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ClientQuoteId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPayment {
    pub amount: Money,
    pub reference: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// A purchase order placed against this quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedOrder {
    pub order_id: AggregateId,
    pub number: DocumentNumber,
    pub supplier_id: SupplierId,
}

/// Aggregate root: ClientQuote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientQuote {
    id: ClientQuoteId,
    tenant_id: Option<TenantId>,
    rfq_id: Option<RfqId>,
    revision: u32,
    supersedes: Option<ClientQuoteId>,
    superseded_by: Option<ClientQuoteId>,
    default_markup: Markup,
    priced: Option<PricedQuote>,
    payments: Vec<ClientPayment>,
    paid: Decimal,
    reserved_orders: Vec<IssuedOrder>,
    purchase_orders: Vec<IssuedOrder>,
    status: ClientQuoteStatus,
    status_note: Option<String>,
    version: u64,
    created: bool,
}

impl ClientQuote {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ClientQuoteId) -> Self {
        Self {
            id,
            tenant_id: None,
            rfq_id: None,
            revision: 0,
            supersedes: None,
            superseded_by: None,
            default_markup: Markup::ZERO,
            priced: None,
            payments: Vec::new(),
            paid: Decimal::ZERO,
            reserved_orders: Vec::new(),
            purchase_orders: Vec::new(),
            status: ClientQuoteStatus::Draft,
            status_note: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ClientQuoteId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn rfq_id(&self) -> Option<RfqId> {
        self.rfq_id
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn supersedes(&self) -> Option<ClientQuoteId> {
        self.supersedes
    }

    pub fn superseded_by(&self) -> Option<ClientQuoteId> {
        self.superseded_by
    }

    pub fn status(&self) -> ClientQuoteStatus {
        self.status
    }

    /// Client's revision note or rejection reason, when one was given.
    pub fn status_note(&self) -> Option<&str> {
        self.status_note.as_deref()
    }

    pub fn default_markup(&self) -> Markup {
        self.default_markup
    }

    pub fn currency(&self) -> Option<&CurrencyCode> {
        self.priced.as_ref().map(|p| &p.currency)
    }

    pub fn lines(&self) -> &[ClientQuoteLine] {
        self.priced.as_ref().map(|p| p.lines.as_slice()).unwrap_or(&[])
    }

    pub fn cost_basis(&self) -> &[CostBasisLine] {
        self.priced
            .as_ref()
            .map(|p| p.cost_basis.as_slice())
            .unwrap_or(&[])
    }

    pub fn total(&self) -> Option<&Money> {
        self.priced.as_ref().map(|p| &p.total)
    }

    pub fn cost_total(&self) -> Option<&Money> {
        self.priced.as_ref().map(|p| &p.cost_total)
    }

    /// Client total minus supplier cost, in the quote currency.
    pub fn profit(&self) -> Option<Money> {
        self.priced.as_ref().and_then(|p| p.profit().ok())
    }

    pub fn payments(&self) -> &[ClientPayment] {
        &self.payments
    }

    /// Cumulative recorded payment.
    pub fn paid(&self) -> Option<Money> {
        self.currency().map(|c| Money::new(self.paid, c.clone()))
    }

    pub fn balance_due(&self) -> Option<Money> {
        let total = self.total()?;
        Some(Money::new(
            (total.amount() - self.paid).max(Decimal::ZERO),
            total.currency().clone(),
        ))
    }

    /// Orders claimed for this quote but possibly not all created yet.
    pub fn reserved_orders(&self) -> &[IssuedOrder] {
        &self.reserved_orders
    }

    /// Orders created and recorded against this quote.
    pub fn purchase_orders(&self) -> &[IssuedOrder] {
        &self.purchase_orders
    }

    /// Distinct suppliers in the cost basis, in line order.
    pub fn suppliers(&self) -> Vec<SupplierId> {
        let mut out: Vec<SupplierId> = Vec::new();
        for line in self.cost_basis() {
            if !out.contains(&line.supplier_id) {
                out.push(line.supplier_id);
            }
        }
        out
    }
}

impl AggregateRoot for ClientQuote {
    type Id = ClientQuoteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: BuildClientQuote.
///
/// `items` is the accepted-terms snapshot; it is priced once here and never
/// re-read from the RFQ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildClientQuote {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub rfq_id: RfqId,
    pub revision: u32,
    pub supersedes: Option<ClientQuoteId>,
    pub currency: CurrencyCode,
    pub markups: MarkupPlan,
    pub items: Vec<AcceptedItem>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendToClient {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkClientReviewing {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveQuote {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRevision {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectQuote {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment. Payments accumulate; the quote becomes PAID once
/// the running total covers the quote total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub amount: Money,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSuperseded {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub superseded_by: ClientQuoteId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReservePurchaseOrders. Claims order ids and numbers before any
/// order is created; accepted once per quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservePurchaseOrders {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub orders: Vec<IssuedOrder>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPurchaseOrders. Accepted once per quote, and only for the
/// reserved orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPurchaseOrders {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub orders: Vec<IssuedOrder>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientQuoteCommand {
    BuildClientQuote(BuildClientQuote),
    SendToClient(SendToClient),
    MarkClientReviewing(MarkClientReviewing),
    ApproveQuote(ApproveQuote),
    RequestRevision(RequestRevision),
    RejectQuote(RejectQuote),
    RecordPayment(RecordPayment),
    MarkSuperseded(MarkSuperseded),
    ReservePurchaseOrders(ReservePurchaseOrders),
    RecordPurchaseOrders(RecordPurchaseOrders),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientQuoteBuilt {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub rfq_id: RfqId,
    pub revision: u32,
    pub supersedes: Option<ClientQuoteId>,
    pub default_markup: Markup,
    pub priced: PricedQuote,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientQuoteSent {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientReviewStarted {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientQuoteApproved {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRequested {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientQuoteRejected {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded. `paid_total` is the running total after this payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub payment: ClientPayment,
    pub paid_total: Money,
    pub fully_paid: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientQuoteSuperseded {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub superseded_by: ClientQuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrdersReserved {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub orders: Vec<IssuedOrder>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrdersRecorded {
    pub tenant_id: TenantId,
    pub quote_id: ClientQuoteId,
    pub orders: Vec<IssuedOrder>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientQuoteEvent {
    ClientQuoteBuilt(ClientQuoteBuilt),
    ClientQuoteSent(ClientQuoteSent),
    ClientReviewStarted(ClientReviewStarted),
    ClientQuoteApproved(ClientQuoteApproved),
    RevisionRequested(RevisionRequested),
    ClientQuoteRejected(ClientQuoteRejected),
    PaymentRecorded(PaymentRecorded),
    ClientQuoteSuperseded(ClientQuoteSuperseded),
    PurchaseOrdersReserved(PurchaseOrdersReserved),
    PurchaseOrdersRecorded(PurchaseOrdersRecorded),
}

impl Event for ClientQuoteEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientQuoteEvent::ClientQuoteBuilt(_) => "quoting.client_quote.built",
            ClientQuoteEvent::ClientQuoteSent(_) => "quoting.client_quote.sent",
            ClientQuoteEvent::ClientReviewStarted(_) => "quoting.client_quote.review_started",
            ClientQuoteEvent::ClientQuoteApproved(_) => "quoting.client_quote.approved",
            ClientQuoteEvent::RevisionRequested(_) => "quoting.client_quote.revision_requested",
            ClientQuoteEvent::ClientQuoteRejected(_) => "quoting.client_quote.rejected",
            ClientQuoteEvent::PaymentRecorded(_) => "quoting.client_quote.payment_recorded",
            ClientQuoteEvent::ClientQuoteSuperseded(_) => "quoting.client_quote.superseded",
            ClientQuoteEvent::PurchaseOrdersReserved(_) => "quoting.client_quote.orders_reserved",
            ClientQuoteEvent::PurchaseOrdersRecorded(_) => "quoting.client_quote.orders_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ClientQuoteEvent::ClientQuoteBuilt(e) => e.occurred_at,
            ClientQuoteEvent::ClientQuoteSent(e) => e.occurred_at,
            ClientQuoteEvent::ClientReviewStarted(e) => e.occurred_at,
            ClientQuoteEvent::ClientQuoteApproved(e) => e.occurred_at,
            ClientQuoteEvent::RevisionRequested(e) => e.occurred_at,
            ClientQuoteEvent::ClientQuoteRejected(e) => e.occurred_at,
            ClientQuoteEvent::PaymentRecorded(e) => e.occurred_at,
            ClientQuoteEvent::ClientQuoteSuperseded(e) => e.occurred_at,
            ClientQuoteEvent::PurchaseOrdersReserved(e) => e.occurred_at,
            ClientQuoteEvent::PurchaseOrdersRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ClientQuote {
    type Command = ClientQuoteCommand;
    type Event = ClientQuoteEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ClientQuoteEvent::ClientQuoteBuilt(e) => {
                self.id = e.quote_id;
                self.tenant_id = Some(e.tenant_id);
                self.rfq_id = Some(e.rfq_id);
                self.revision = e.revision;
                self.supersedes = e.supersedes;
                self.default_markup = e.default_markup;
                self.priced = Some(e.priced.clone());
                self.status = ClientQuoteStatus::Draft;
                self.created = true;
            }
            ClientQuoteEvent::ClientQuoteSent(_) => {
                self.status = ClientQuoteStatus::SentToClient;
            }
            ClientQuoteEvent::ClientReviewStarted(_) => {
                self.status = ClientQuoteStatus::ClientReviewing;
            }
            ClientQuoteEvent::ClientQuoteApproved(_) => {
                self.status = ClientQuoteStatus::Approved;
            }
            ClientQuoteEvent::RevisionRequested(e) => {
                self.status = ClientQuoteStatus::RevisionRequested;
                self.status_note = e.note.clone();
            }
            ClientQuoteEvent::ClientQuoteRejected(e) => {
                self.status = ClientQuoteStatus::Rejected;
                self.status_note = e.reason.clone();
            }
            ClientQuoteEvent::PaymentRecorded(e) => {
                self.payments.push(e.payment.clone());
                self.paid = e.paid_total.amount();
                if e.fully_paid {
                    self.status = ClientQuoteStatus::Paid;
                }
            }
            ClientQuoteEvent::ClientQuoteSuperseded(e) => {
                self.status = ClientQuoteStatus::Superseded;
                self.superseded_by = Some(e.superseded_by);
            }
            ClientQuoteEvent::PurchaseOrdersReserved(e) => {
                self.reserved_orders = e.orders.clone();
            }
            ClientQuoteEvent::PurchaseOrdersRecorded(e) => {
                self.purchase_orders = e.orders.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ClientQuoteCommand::BuildClientQuote(cmd) => self.handle_build(cmd),
            ClientQuoteCommand::SendToClient(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.quote_id)?;
                self.ensure_transition(ClientQuoteStatus::SentToClient)?;
                Ok(vec![ClientQuoteEvent::ClientQuoteSent(ClientQuoteSent {
                    tenant_id: cmd.tenant_id,
                    quote_id: cmd.quote_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ClientQuoteCommand::MarkClientReviewing(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.quote_id)?;
                self.ensure_transition(ClientQuoteStatus::ClientReviewing)?;
                Ok(vec![ClientQuoteEvent::ClientReviewStarted(
                    ClientReviewStarted {
                        tenant_id: cmd.tenant_id,
                        quote_id: cmd.quote_id,
                        occurred_at: cmd.occurred_at,
                    },
                )])
            }
            ClientQuoteCommand::ApproveQuote(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.quote_id)?;
                self.ensure_transition(ClientQuoteStatus::Approved)?;
                Ok(vec![ClientQuoteEvent::ClientQuoteApproved(
                    ClientQuoteApproved {
                        tenant_id: cmd.tenant_id,
                        quote_id: cmd.quote_id,
                        occurred_at: cmd.occurred_at,
                    },
                )])
            }
            ClientQuoteCommand::RequestRevision(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.quote_id)?;
                self.ensure_transition(ClientQuoteStatus::RevisionRequested)?;
                Ok(vec![ClientQuoteEvent::RevisionRequested(RevisionRequested {
                    tenant_id: cmd.tenant_id,
                    quote_id: cmd.quote_id,
                    note: trimmed(&cmd.note),
                    occurred_at: cmd.occurred_at,
                })])
            }
            ClientQuoteCommand::RejectQuote(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.quote_id)?;
                self.ensure_transition(ClientQuoteStatus::Rejected)?;
                Ok(vec![ClientQuoteEvent::ClientQuoteRejected(
                    ClientQuoteRejected {
                        tenant_id: cmd.tenant_id,
                        quote_id: cmd.quote_id,
                        reason: trimmed(&cmd.reason),
                        occurred_at: cmd.occurred_at,
                    },
                )])
            }
            ClientQuoteCommand::RecordPayment(cmd) => self.handle_payment(cmd),
            ClientQuoteCommand::MarkSuperseded(cmd) => self.handle_superseded(cmd),
            ClientQuoteCommand::ReservePurchaseOrders(cmd) => self.handle_reserve_orders(cmd),
            ClientQuoteCommand::RecordPurchaseOrders(cmd) => self.handle_record_orders(cmd),
        }
    }
}

fn trimmed(text: &Option<String>) -> Option<String> {
    text.as_ref()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl ClientQuote {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_quote_id(&self, quote_id: ClientQuoteId) -> Result<(), DomainError> {
        if self.id != quote_id {
            return Err(DomainError::invariant("quote_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, quote_id: ClientQuoteId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_quote_id(quote_id)
    }

    fn ensure_transition(&self, next: ClientQuoteStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::transition("client quote", self.status, next));
        }
        Ok(())
    }

    fn handle_build(&self, cmd: &BuildClientQuote) -> Result<Vec<ClientQuoteEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("client quote already exists"));
        }
        if cmd.revision == 0 {
            return Err(DomainError::validation("revision", "revisions start at 1"));
        }
        if cmd.revision > 1 && cmd.supersedes.is_none() {
            return Err(DomainError::validation(
                "supersedes",
                "a later revision must name the quote it replaces",
            ));
        }

        let priced = price_items(&cmd.items, &cmd.currency, &cmd.markups)?;

        Ok(vec![ClientQuoteEvent::ClientQuoteBuilt(ClientQuoteBuilt {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            rfq_id: cmd.rfq_id,
            revision: cmd.revision,
            supersedes: cmd.supersedes,
            default_markup: cmd.markups.default,
            priced,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> Result<Vec<ClientQuoteEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.quote_id)?;

        if self.status != ClientQuoteStatus::Approved {
            return Err(DomainError::transition("client quote", self.status, "payment"));
        }
        let Some(total) = self.total() else {
            return Err(DomainError::invariant("client quote has no total"));
        };
        if cmd.amount.currency() != total.currency() {
            return Err(DomainError::currency_mismatch(
                total.currency(),
                cmd.amount.currency(),
            ));
        }
        if cmd.amount.amount() <= Decimal::ZERO {
            return Err(DomainError::validation("amount", "must be greater than zero"));
        }

        let paid_total = Money::new(self.paid + cmd.amount.amount(), total.currency().clone());
        let fully_paid = paid_total.amount() >= total.amount();

        Ok(vec![ClientQuoteEvent::PaymentRecorded(PaymentRecorded {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            payment: ClientPayment {
                amount: cmd.amount.clone(),
                reference: trimmed(&cmd.reference),
                received_at: cmd.occurred_at,
            },
            paid_total,
            fully_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_superseded(&self, cmd: &MarkSuperseded) -> Result<Vec<ClientQuoteEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.quote_id)?;

        if cmd.superseded_by == self.id {
            return Err(DomainError::validation(
                "superseded_by",
                "a quote cannot supersede itself",
            ));
        }
        self.ensure_transition(ClientQuoteStatus::Superseded)?;

        Ok(vec![ClientQuoteEvent::ClientQuoteSuperseded(
            ClientQuoteSuperseded {
                tenant_id: cmd.tenant_id,
                quote_id: cmd.quote_id,
                superseded_by: cmd.superseded_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_reserve_orders(
        &self,
        cmd: &ReservePurchaseOrders,
    ) -> Result<Vec<ClientQuoteEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.quote_id)?;

        if self.status != ClientQuoteStatus::Paid {
            return Err(DomainError::transition(
                "client quote",
                self.status,
                "purchase ordering",
            ));
        }
        if !self.reserved_orders.is_empty() {
            return Err(DomainError::conflict(
                "purchase orders already reserved for this quote",
            ));
        }
        if cmd.orders.is_empty() {
            return Err(DomainError::validation("orders", "at least one order is required"));
        }
        let suppliers = self.suppliers();
        for (idx, order) in cmd.orders.iter().enumerate() {
            if !suppliers.contains(&order.supplier_id) {
                return Err(DomainError::validation(
                    format!("orders[{idx}].supplier_id"),
                    "supplier has no accepted line on this quote",
                ));
            }
            if cmd.orders[..idx].iter().any(|o| o.supplier_id == order.supplier_id) {
                return Err(DomainError::validation(
                    format!("orders[{idx}].supplier_id"),
                    "one order per supplier",
                ));
            }
        }

        Ok(vec![ClientQuoteEvent::PurchaseOrdersReserved(
            PurchaseOrdersReserved {
                tenant_id: cmd.tenant_id,
                quote_id: cmd.quote_id,
                orders: cmd.orders.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_record_orders(
        &self,
        cmd: &RecordPurchaseOrders,
    ) -> Result<Vec<ClientQuoteEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.quote_id)?;

        if !self.purchase_orders.is_empty() {
            return Err(DomainError::conflict(
                "purchase orders already issued for this quote",
            ));
        }
        if self.reserved_orders.is_empty() {
            return Err(DomainError::transition(
                "client quote",
                self.status,
                "recording unreserved purchase orders",
            ));
        }
        if cmd.orders != self.reserved_orders {
            return Err(DomainError::conflict(
                "recorded orders differ from the reservation",
            ));
        }

        Ok(vec![ClientQuoteEvent::PurchaseOrdersRecorded(
            PurchaseOrdersRecorded {
                tenant_id: cmd.tenant_id,
                quote_id: cmd.quote_id,
                orders: cmd.orders.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::tests::{cad, item};
    use quoteflow_core::DocumentKind;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn run(quote: &mut ClientQuote, cmd: ClientQuoteCommand) -> Result<Vec<ClientQuoteEvent>, DomainError> {
        quoteflow_events::execute(quote, &cmd)
    }

    /// A 5000.00 CAD quote, built and walked to `status`.
    fn quote_in(status: ClientQuoteStatus) -> (ClientQuote, TenantId, ClientQuoteId) {
        let tenant_id = TenantId::new();
        let quote_id = ClientQuoteId::new(AggregateId::new());
        let mut quote = ClientQuote::empty(quote_id);

        run(
            &mut quote,
            ClientQuoteCommand::BuildClientQuote(BuildClientQuote {
                tenant_id,
                quote_id,
                rfq_id: RfqId::new(AggregateId::new()),
                revision: 1,
                supersedes: None,
                currency: cad(),
                markups: MarkupPlan::uniform(Markup::new(dec!(25)).unwrap()),
                items: vec![item(1, Money::new(dec!(2000.00), cad()), dec!(2))],
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let steps = [
            ClientQuoteStatus::SentToClient,
            ClientQuoteStatus::ClientReviewing,
            ClientQuoteStatus::Approved,
        ];
        for step in steps {
            if quote.status() == status {
                break;
            }
            let cmd = match step {
                ClientQuoteStatus::SentToClient => ClientQuoteCommand::SendToClient(SendToClient {
                    tenant_id,
                    quote_id,
                    occurred_at: test_time(),
                }),
                ClientQuoteStatus::ClientReviewing => {
                    ClientQuoteCommand::MarkClientReviewing(MarkClientReviewing {
                        tenant_id,
                        quote_id,
                        occurred_at: test_time(),
                    })
                }
                _ => ClientQuoteCommand::ApproveQuote(ApproveQuote {
                    tenant_id,
                    quote_id,
                    occurred_at: test_time(),
                }),
            };
            run(&mut quote, cmd).unwrap();
        }
        assert_eq!(quote.status(), status);
        (quote, tenant_id, quote_id)
    }

    fn pay(tenant_id: TenantId, quote_id: ClientQuoteId, amount: Money) -> ClientQuoteCommand {
        ClientQuoteCommand::RecordPayment(RecordPayment {
            tenant_id,
            quote_id,
            amount,
            reference: Some("e-transfer".into()),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn build_keeps_cost_out_of_client_lines() {
        let (quote, _, _) = quote_in(ClientQuoteStatus::Draft);
        assert_eq!(quote.lines()[0].unit_price.amount(), dec!(2500.00));
        assert_eq!(quote.total().unwrap().amount(), dec!(5000.00));
        assert_eq!(quote.cost_basis()[0].unit_cost.amount(), dec!(2000.00));
        assert_eq!(quote.profit().unwrap().amount(), dec!(1000.00));
        assert_eq!(quote.suppliers().len(), 1);
    }

    #[test]
    fn approval_cannot_skip_client_review() {
        let (quote, tenant_id, quote_id) = quote_in(ClientQuoteStatus::SentToClient);
        let err = quote
            .handle(&ClientQuoteCommand::ApproveQuote(ApproveQuote {
                tenant_id,
                quote_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::transition(
                "client quote",
                ClientQuoteStatus::SentToClient,
                ClientQuoteStatus::Approved
            )
        );
    }

    #[test]
    fn payments_accumulate_until_the_total_is_covered() {
        let (mut quote, tenant_id, quote_id) = quote_in(ClientQuoteStatus::Approved);

        run(&mut quote, pay(tenant_id, quote_id, Money::new(dec!(4999.99), cad()))).unwrap();
        assert_eq!(quote.status(), ClientQuoteStatus::Approved);
        assert_eq!(quote.balance_due().unwrap().amount(), dec!(0.01));

        run(&mut quote, pay(tenant_id, quote_id, Money::new(dec!(0.01), cad()))).unwrap();
        assert_eq!(quote.status(), ClientQuoteStatus::Paid);
        assert_eq!(quote.paid().unwrap().amount(), dec!(5000.00));
        assert_eq!(quote.payments().len(), 2);
    }

    #[test]
    fn payment_in_another_currency_is_refused() {
        let (quote, tenant_id, quote_id) = quote_in(ClientQuoteStatus::Approved);
        let usd = CurrencyCode::new("USD").unwrap();
        let err = quote
            .handle(&pay(tenant_id, quote_id, Money::new(dec!(5000), usd)))
            .unwrap_err();
        assert!(matches!(err, DomainError::CurrencyMismatch { .. }));
    }

    #[test]
    fn payment_before_approval_is_a_transition_error() {
        let (quote, tenant_id, quote_id) = quote_in(ClientQuoteStatus::ClientReviewing);
        let err = quote
            .handle(&pay(tenant_id, quote_id, Money::new(dec!(5000), cad())))
            .unwrap_err();
        assert!(matches!(err, DomainError::StateTransition { .. }));
    }

    #[test]
    fn revision_requested_quote_is_retained_as_superseded() {
        let (mut quote, tenant_id, quote_id) = quote_in(ClientQuoteStatus::ClientReviewing);
        run(
            &mut quote,
            ClientQuoteCommand::RequestRevision(RequestRevision {
                tenant_id,
                quote_id,
                note: Some(" lower the lamp price ".into()),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(quote.status_note(), Some("lower the lamp price"));

        let next = ClientQuoteId::new(AggregateId::new());
        run(
            &mut quote,
            ClientQuoteCommand::MarkSuperseded(MarkSuperseded {
                tenant_id,
                quote_id,
                superseded_by: next,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(quote.status(), ClientQuoteStatus::Superseded);
        assert_eq!(quote.superseded_by(), Some(next));
        // The snapshot is untouched.
        assert_eq!(quote.total().unwrap().amount(), dec!(5000.00));
    }

    #[test]
    fn later_revision_must_name_its_predecessor() {
        let quote_id = ClientQuoteId::new(AggregateId::new());
        let err = ClientQuote::empty(quote_id)
            .handle(&ClientQuoteCommand::BuildClientQuote(BuildClientQuote {
                tenant_id: TenantId::new(),
                quote_id,
                rfq_id: RfqId::new(AggregateId::new()),
                revision: 2,
                supersedes: None,
                currency: cad(),
                markups: MarkupPlan::default(),
                items: vec![item(1, Money::new(dec!(10), cad()), dec!(1))],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "supersedes"));
    }

    fn issued(quote: &ClientQuote, counter: u32) -> Vec<IssuedOrder> {
        vec![IssuedOrder {
            order_id: AggregateId::new(),
            number: DocumentNumber::new(DocumentKind::PurchaseOrder, 2031, counter).unwrap(),
            supplier_id: quote.suppliers()[0],
        }]
    }

    #[test]
    fn purchase_orders_are_reserved_then_recorded_once() {
        let (mut quote, tenant_id, quote_id) = quote_in(ClientQuoteStatus::Approved);
        run(&mut quote, pay(tenant_id, quote_id, Money::new(dec!(5000.00), cad()))).unwrap();
        let orders = issued(&quote, 1);

        let record = ClientQuoteCommand::RecordPurchaseOrders(RecordPurchaseOrders {
            tenant_id,
            quote_id,
            orders: orders.clone(),
            occurred_at: test_time(),
        });
        assert!(matches!(
            quote.handle(&record).unwrap_err(),
            DomainError::StateTransition { .. }
        ));

        run(
            &mut quote,
            ClientQuoteCommand::ReservePurchaseOrders(ReservePurchaseOrders {
                tenant_id,
                quote_id,
                orders: orders.clone(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(quote.reserved_orders(), orders.as_slice());
        assert!(quote.purchase_orders().is_empty());

        run(&mut quote, record.clone()).unwrap();
        assert_eq!(quote.purchase_orders(), orders.as_slice());

        let err = quote.handle(&record).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn a_second_reservation_loses() {
        let (mut quote, tenant_id, quote_id) = quote_in(ClientQuoteStatus::Approved);
        run(&mut quote, pay(tenant_id, quote_id, Money::new(dec!(5000.00), cad()))).unwrap();
        let reserve = |orders| {
            ClientQuoteCommand::ReservePurchaseOrders(ReservePurchaseOrders {
                tenant_id,
                quote_id,
                orders,
                occurred_at: test_time(),
            })
        };

        let first = issued(&quote, 1);
        let second = issued(&quote, 2);
        run(&mut quote, reserve(first.clone())).unwrap();
        assert!(matches!(
            quote.handle(&reserve(second.clone())).unwrap_err(),
            DomainError::Conflict(_)
        ));

        // Only the reserved set can be recorded.
        let record_other = ClientQuoteCommand::RecordPurchaseOrders(RecordPurchaseOrders {
            tenant_id,
            quote_id,
            orders: second,
            occurred_at: test_time(),
        });
        assert!(matches!(quote.handle(&record_other).unwrap_err(), DomainError::Conflict(_)));
        assert_eq!(quote.reserved_orders(), first.as_slice());
    }

    #[test]
    fn reservation_requires_a_paid_quote_and_known_suppliers() {
        let (mut quote, tenant_id, quote_id) = quote_in(ClientQuoteStatus::Approved);
        let mut orders = issued(&quote, 1);
        let reserve = |orders: Vec<IssuedOrder>| {
            ClientQuoteCommand::ReservePurchaseOrders(ReservePurchaseOrders {
                tenant_id,
                quote_id,
                orders,
                occurred_at: test_time(),
            })
        };
        assert!(matches!(
            quote.handle(&reserve(orders.clone())).unwrap_err(),
            DomainError::StateTransition { .. }
        ));

        run(&mut quote, pay(tenant_id, quote_id, Money::new(dec!(5000.00), cad()))).unwrap();
        orders[0].supplier_id = SupplierId::new(AggregateId::new());
        assert!(matches!(
            quote.handle(&reserve(orders)).unwrap_err(),
            DomainError::Validation { .. }
        ));
    }
}
