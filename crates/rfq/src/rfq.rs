use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quoteflow_core::{
    Aggregate, AggregateId, AggregateRoot, CurrencyCode, DocumentKind, DocumentNumber, DomainError,
    TenantId, UserId,
};
use quoteflow_events::Event;
use quoteflow_pricing::CurrencyTotals;
use quoteflow_reconciliation::{Classification, MatchResult, Reconciler};

use crate::acceptance::{Acceptance, Offer, QuoteLineRef};
use crate::quote::{QuoteSubmission, SupplierQuote, build_supplier_quote};
use crate::status::{ResponseStatus, RfqStatus, recompute};
use crate::supplier::{AccessToken, SupplierId, SupplierRfq, SupplierRfqId};

/// RFQ identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RfqId(pub AggregateId);

impl RfqId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RfqId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A requested line. Fixed once the RFQ is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqLineItem {
    pub line_no: u32,
    pub name: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit: String,
    pub sku: Option<String>,
    pub notes: Option<String>,
}

/// Line as typed by the studio; numbered on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRfqLine {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Aggregate root: Rfq.
#[derive(Debug, Clone, PartialEq)]
pub struct Rfq {
    id: RfqId,
    tenant_id: Option<TenantId>,
    number: Option<DocumentNumber>,
    title: String,
    description: Option<String>,
    response_deadline: Option<DateTime<Utc>>,
    status: RfqStatus,
    lines: Vec<RfqLineItem>,
    suppliers: Vec<SupplierRfq>,
    acceptances: BTreeMap<u32, Acceptance>,
    reopen_count: u32,
    version: u64,
    created: bool,
}

impl Rfq {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RfqId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: None,
            title: String::new(),
            description: None,
            response_deadline: None,
            status: RfqStatus::Draft,
            lines: Vec::new(),
            suppliers: Vec::new(),
            acceptances: BTreeMap::new(),
            reopen_count: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RfqId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn number(&self) -> Option<&DocumentNumber> {
        self.number.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn response_deadline(&self) -> Option<DateTime<Utc>> {
        self.response_deadline
    }

    /// Stored status. See [`Rfq::status_at`] for the status a reader should see.
    pub fn status(&self) -> RfqStatus {
        self.status
    }

    /// Status with lazy expiry applied: an RFQ still collecting responses
    /// whose deadline has passed reads as `EXPIRED` even before the sweep
    /// records it.
    pub fn status_at(&self, now: DateTime<Utc>) -> RfqStatus {
        if self.status.can_expire() && self.deadline_passed(now) {
            RfqStatus::Expired
        } else {
            self.status
        }
    }

    pub fn lines(&self) -> &[RfqLineItem] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&RfqLineItem> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn suppliers(&self) -> &[SupplierRfq] {
        &self.suppliers
    }

    pub fn supplier(&self, id: SupplierRfqId) -> Option<&SupplierRfq> {
        self.suppliers.iter().find(|s| s.id == id)
    }

    pub fn acceptance(&self, line_no: u32) -> Option<&Acceptance> {
        self.acceptances.get(&line_no)
    }

    /// Current acceptances in requested-line order.
    pub fn acceptances(&self) -> impl Iterator<Item = &Acceptance> {
        self.acceptances.values()
    }

    pub fn reopen_count(&self) -> u32 {
        self.reopen_count
    }

    fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.response_deadline.is_some_and(|d| now >= d)
    }

    /// Every priced supplier line currently paired with `line_no`, in
    /// invitation order.
    pub fn offers_for_line(&self, line_no: u32) -> Vec<Offer> {
        let Some(requested) = self.line(line_no) else {
            return Vec::new();
        };
        let mut offers = Vec::new();
        for supplier in &self.suppliers {
            if supplier.status != ResponseStatus::Submitted {
                continue;
            }
            let Some(quote) = &supplier.quote else {
                continue;
            };
            for line in quote.lines_for(line_no) {
                let Some(unit_cost) = &line.unit_price else {
                    continue;
                };
                offers.push(Offer {
                    source: QuoteLineRef {
                        supplier_rfq_id: supplier.id,
                        revision: quote.revision,
                        line_index: line.index,
                    },
                    rfq_line_no: line_no,
                    supplier_id: supplier.supplier_id,
                    supplier_name: supplier.supplier_name.clone(),
                    unit_cost: unit_cost.clone(),
                    quantity: line.quantity.unwrap_or(requested.quantity),
                    components: line.components.clone(),
                    lead_time: line.lead_time.clone(),
                    classification: line.classification,
                });
            }
        }
        offers
    }

    /// Cheapest offer by unit cost. Matched offers are preferred over partial
    /// ones; ties go to the earlier invitation.
    ///
    /// Fails with `CurrencyMismatch` when the competing offers are quoted in
    /// different currencies.
    pub fn lowest_cost_offer(&self, line_no: u32) -> Result<Option<Offer>, DomainError> {
        let offers = self.offers_for_line(line_no);
        let matched: Vec<&Offer> = offers
            .iter()
            .filter(|o| o.classification == Classification::Matched)
            .collect();
        let pool: Vec<&Offer> = if matched.is_empty() {
            offers.iter().collect()
        } else {
            matched
        };

        let mut best: Option<&Offer> = None;
        for offer in pool {
            best = match best {
                None => Some(offer),
                Some(current) => {
                    offer.unit_cost.ensure_same_currency(current.unit_cost.currency())?;
                    if offer.unit_cost.amount() < current.unit_cost.amount() {
                        Some(offer)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        Ok(best.cloned())
    }

    /// Supplier quote totals bucketed by currency.
    pub fn response_totals(&self) -> CurrencyTotals {
        self.suppliers
            .iter()
            .filter_map(|s| s.quote.as_ref())
            .map(|q| &q.total)
            .collect()
    }
}

impl AggregateRoot for Rfq {
    type Id = RfqId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateRfq.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRfq {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub number: DocumentNumber,
    pub title: String,
    pub description: Option<String>,
    pub response_deadline: DateTime<Utc>,
    pub lines: Vec<NewRfqLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: InviteSupplier (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteSupplier {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub supplier_rfq_id: SupplierRfqId,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub token: AccessToken,
    pub allow_revisions: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRfq {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordSupplierView. Idempotent; allowed after expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSupplierView {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub supplier_rfq_id: SupplierRfqId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitSupplierQuote. First submission or a permitted revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitSupplierQuote {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub supplier_rfq_id: SupplierRfqId,
    pub currency: CurrencyCode,
    pub submission: QuoteSubmission,
    pub match_threshold: f64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclineRfq {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub supplier_rfq_id: SupplierRfqId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitRevision {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub supplier_rfq_id: SupplierRfqId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AcceptLineItem.
///
/// `expected_current` is the acceptance the caller last read for the line
/// (`None` if there was none). A mismatch means someone else changed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptLineItem {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub line_no: u32,
    pub source: QuoteLineRef,
    pub expected_current: Option<QuoteLineRef>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeAcceptance {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExpireRfq. Emits nothing when the RFQ is not due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireRfq {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenRfq {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub response_deadline: DateTime<Utc>,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRfq {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RfqCommand {
    CreateRfq(CreateRfq),
    InviteSupplier(InviteSupplier),
    SendRfq(SendRfq),
    RecordSupplierView(RecordSupplierView),
    SubmitSupplierQuote(SubmitSupplierQuote),
    DeclineRfq(DeclineRfq),
    PermitRevision(PermitRevision),
    AcceptLineItem(AcceptLineItem),
    FinalizeAcceptance(FinalizeAcceptance),
    ExpireRfq(ExpireRfq),
    ReopenRfq(ReopenRfq),
    CancelRfq(CancelRfq),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqCreated {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub number: DocumentNumber,
    pub title: String,
    pub description: Option<String>,
    pub response_deadline: DateTime<Utc>,
    pub lines: Vec<RfqLineItem>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierInvited {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub supplier_rfq_id: SupplierRfqId,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub token: AccessToken,
    pub allow_revisions: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqSent {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierViewed {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub supplier_rfq_id: SupplierRfqId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SupplierQuoteSubmitted.
///
/// Carries the whole normalised quote, so a revision replaces the previous
/// quote in a single event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierQuoteSubmitted {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub supplier_rfq_id: SupplierRfqId,
    pub quote: SupplierQuote,
    pub reconciliation: MatchResult,
    pub is_revision: bool,
    pub status_after: RfqStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierDeclined {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub supplier_rfq_id: SupplierRfqId,
    pub reason: Option<String>,
    pub status_after: RfqStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPermitted {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub supplier_rfq_id: SupplierRfqId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemAccepted. `superseded` is the acceptance it replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemAccepted {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub acceptance: Acceptance,
    pub superseded: Option<QuoteLineRef>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceFinalized {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqExpired {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub response_deadline: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RfqReopened. Audited override of expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqReopened {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub previous_status: RfqStatus,
    pub previous_deadline: Option<DateTime<Utc>>,
    pub response_deadline: DateTime<Utc>,
    pub status_after: RfqStatus,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqCancelled {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub previous_status: RfqStatus,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RfqEvent {
    RfqCreated(RfqCreated),
    SupplierInvited(SupplierInvited),
    RfqSent(RfqSent),
    SupplierViewed(SupplierViewed),
    SupplierQuoteSubmitted(SupplierQuoteSubmitted),
    SupplierDeclined(SupplierDeclined),
    RevisionPermitted(RevisionPermitted),
    LineItemAccepted(LineItemAccepted),
    AcceptanceFinalized(AcceptanceFinalized),
    RfqExpired(RfqExpired),
    RfqReopened(RfqReopened),
    RfqCancelled(RfqCancelled),
}

impl Event for RfqEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RfqEvent::RfqCreated(_) => "rfq.created",
            RfqEvent::SupplierInvited(_) => "rfq.supplier_invited",
            RfqEvent::RfqSent(_) => "rfq.sent",
            RfqEvent::SupplierViewed(_) => "rfq.supplier_viewed",
            RfqEvent::SupplierQuoteSubmitted(_) => "rfq.quote_submitted",
            RfqEvent::SupplierDeclined(_) => "rfq.supplier_declined",
            RfqEvent::RevisionPermitted(_) => "rfq.revision_permitted",
            RfqEvent::LineItemAccepted(_) => "rfq.line_accepted",
            RfqEvent::AcceptanceFinalized(_) => "rfq.acceptance_finalized",
            RfqEvent::RfqExpired(_) => "rfq.expired",
            RfqEvent::RfqReopened(_) => "rfq.reopened",
            RfqEvent::RfqCancelled(_) => "rfq.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RfqEvent::RfqCreated(e) => e.occurred_at,
            RfqEvent::SupplierInvited(e) => e.occurred_at,
            RfqEvent::RfqSent(e) => e.occurred_at,
            RfqEvent::SupplierViewed(e) => e.occurred_at,
            RfqEvent::SupplierQuoteSubmitted(e) => e.occurred_at,
            RfqEvent::SupplierDeclined(e) => e.occurred_at,
            RfqEvent::RevisionPermitted(e) => e.occurred_at,
            RfqEvent::LineItemAccepted(e) => e.occurred_at,
            RfqEvent::AcceptanceFinalized(e) => e.occurred_at,
            RfqEvent::RfqExpired(e) => e.occurred_at,
            RfqEvent::RfqReopened(e) => e.occurred_at,
            RfqEvent::RfqCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Rfq {
    type Command = RfqCommand;
    type Event = RfqEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RfqEvent::RfqCreated(e) => {
                self.id = e.rfq_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = Some(e.number.clone());
                self.title = e.title.clone();
                self.description = e.description.clone();
                self.response_deadline = Some(e.response_deadline);
                self.status = RfqStatus::Draft;
                self.lines = e.lines.clone();
                self.suppliers.clear();
                self.acceptances.clear();
                self.created = true;
            }
            RfqEvent::SupplierInvited(e) => {
                self.suppliers.push(SupplierRfq {
                    id: e.supplier_rfq_id,
                    supplier_id: e.supplier_id,
                    supplier_name: e.supplier_name.clone(),
                    token: e.token.clone(),
                    status: ResponseStatus::Pending,
                    invited_at: e.occurred_at,
                    viewed_at: None,
                    submitted_at: None,
                    declined_at: None,
                    decline_reason: None,
                    allow_revisions: e.allow_revisions,
                    revision_count: 0,
                    quote: None,
                    reconciliation: None,
                });
            }
            RfqEvent::RfqSent(_) => {
                self.status = RfqStatus::Sent;
            }
            RfqEvent::SupplierViewed(e) => {
                if let Some(s) = self.supplier_mut(e.supplier_rfq_id) {
                    s.status = ResponseStatus::Viewed;
                    s.viewed_at = Some(e.occurred_at);
                }
            }
            RfqEvent::SupplierQuoteSubmitted(e) => {
                if let Some(s) = self.supplier_mut(e.supplier_rfq_id) {
                    s.status = ResponseStatus::Submitted;
                    s.submitted_at = Some(e.occurred_at);
                    if e.is_revision {
                        s.revision_count += 1;
                    }
                    s.quote = Some(e.quote.clone());
                    s.reconciliation = Some(e.reconciliation.clone());
                }
                self.status = e.status_after;
            }
            RfqEvent::SupplierDeclined(e) => {
                if let Some(s) = self.supplier_mut(e.supplier_rfq_id) {
                    s.status = ResponseStatus::Declined;
                    s.declined_at = Some(e.occurred_at);
                    s.decline_reason = e.reason.clone();
                }
                self.status = e.status_after;
            }
            RfqEvent::RevisionPermitted(e) => {
                if let Some(s) = self.supplier_mut(e.supplier_rfq_id) {
                    s.allow_revisions = true;
                }
            }
            RfqEvent::LineItemAccepted(e) => {
                self.acceptances
                    .insert(e.acceptance.rfq_line_no, e.acceptance.clone());
            }
            RfqEvent::AcceptanceFinalized(_) => {
                self.status = RfqStatus::QuoteAccepted;
            }
            RfqEvent::RfqExpired(_) => {
                self.status = RfqStatus::Expired;
            }
            RfqEvent::RfqReopened(e) => {
                self.response_deadline = Some(e.response_deadline);
                self.status = e.status_after;
                self.reopen_count += 1;
            }
            RfqEvent::RfqCancelled(_) => {
                self.status = RfqStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RfqCommand::CreateRfq(cmd) => self.handle_create(cmd),
            RfqCommand::InviteSupplier(cmd) => self.handle_invite(cmd),
            RfqCommand::SendRfq(cmd) => self.handle_send(cmd),
            RfqCommand::RecordSupplierView(cmd) => self.handle_view(cmd),
            RfqCommand::SubmitSupplierQuote(cmd) => self.handle_submit(cmd),
            RfqCommand::DeclineRfq(cmd) => self.handle_decline(cmd),
            RfqCommand::PermitRevision(cmd) => self.handle_permit_revision(cmd),
            RfqCommand::AcceptLineItem(cmd) => self.handle_accept(cmd),
            RfqCommand::FinalizeAcceptance(cmd) => self.handle_finalize(cmd),
            RfqCommand::ExpireRfq(cmd) => self.handle_expire(cmd),
            RfqCommand::ReopenRfq(cmd) => self.handle_reopen(cmd),
            RfqCommand::CancelRfq(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Rfq {
    fn supplier_mut(&mut self, id: SupplierRfqId) -> Option<&mut SupplierRfq> {
        self.suppliers.iter_mut().find(|s| s.id == id)
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_rfq_id(&self, rfq_id: RfqId) -> Result<(), DomainError> {
        if self.id != rfq_id {
            return Err(DomainError::invariant("rfq_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, rfq_id: RfqId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_rfq_id(rfq_id)
    }

    fn existing_supplier(&self, id: SupplierRfqId) -> Result<&SupplierRfq, DomainError> {
        self.supplier(id).ok_or_else(DomainError::not_found)
    }

    /// Status of every response, with one supplier's replaced by `next`.
    fn response_statuses_with(
        &self,
        id: SupplierRfqId,
        next: ResponseStatus,
    ) -> impl Iterator<Item = ResponseStatus> + '_ {
        self.suppliers
            .iter()
            .map(move |s| if s.id == id { next } else { s.status })
    }

    /// Responses may still be recorded at `now`.
    fn ensure_accepting_responses(&self, now: DateTime<Utc>, action: &str) -> Result<(), DomainError> {
        let effective = self.status_at(now);
        if effective == RfqStatus::Expired {
            return Err(DomainError::ExpiredToken);
        }
        if !effective.is_open() {
            return Err(DomainError::transition("RFQ", effective, action));
        }
        if self.deadline_passed(now) {
            return Err(DomainError::ExpiredToken);
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateRfq) -> Result<Vec<RfqEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("rfq already exists"));
        }
        if cmd.number.kind() != DocumentKind::Rfq {
            return Err(DomainError::validation("number", "must be an RFQ number"));
        }
        if cmd.title.trim().is_empty() {
            return Err(DomainError::validation("title", "must not be empty"));
        }
        if cmd.response_deadline <= cmd.occurred_at {
            return Err(DomainError::validation(
                "response_deadline",
                "must be in the future",
            ));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("lines", "at least one line is required"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, line) in cmd.lines.iter().enumerate() {
            if line.name.trim().is_empty() {
                return Err(DomainError::validation(
                    format!("lines[{idx}].name"),
                    "must not be empty",
                ));
            }
            if line.quantity <= Decimal::ZERO {
                return Err(DomainError::validation(
                    format!("lines[{idx}].quantity"),
                    "must be greater than zero",
                ));
            }
            if line.unit.trim().is_empty() {
                return Err(DomainError::validation(
                    format!("lines[{idx}].unit"),
                    "must not be empty",
                ));
            }
            lines.push(RfqLineItem {
                line_no: idx as u32 + 1,
                name: line.name.trim().to_string(),
                description: line.description.clone(),
                quantity: line.quantity,
                unit: line.unit.trim().to_string(),
                sku: line.sku.clone(),
                notes: line.notes.clone(),
            });
        }

        Ok(vec![RfqEvent::RfqCreated(RfqCreated {
            tenant_id: cmd.tenant_id,
            rfq_id: cmd.rfq_id,
            number: cmd.number.clone(),
            title: cmd.title.trim().to_string(),
            description: cmd.description.clone(),
            response_deadline: cmd.response_deadline,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_invite(&self, cmd: &InviteSupplier) -> Result<Vec<RfqEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.rfq_id)?;

        if self.status != RfqStatus::Draft {
            return Err(DomainError::transition("RFQ", self.status, "supplier invitation"));
        }
        if cmd.supplier_name.trim().is_empty() {
            return Err(DomainError::validation("supplier_name", "must not be empty"));
        }
        if self.suppliers.iter().any(|s| s.id == cmd.supplier_rfq_id) {
            return Err(DomainError::conflict("supplier invitation already exists"));
        }
        if self.suppliers.iter().any(|s| s.supplier_id == cmd.supplier_id) {
            return Err(DomainError::conflict("supplier already invited"));
        }
        if self.suppliers.iter().any(|s| s.token == cmd.token) {
            return Err(DomainError::conflict("access token already issued"));
        }

        Ok(vec![RfqEvent::SupplierInvited(SupplierInvited {
            tenant_id: cmd.tenant_id,
            rfq_id: cmd.rfq_id,
            supplier_rfq_id: cmd.supplier_rfq_id,
            supplier_id: cmd.supplier_id,
            supplier_name: cmd.supplier_name.trim().to_string(),
            token: cmd.token.clone(),
            allow_revisions: cmd.allow_revisions,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_send(&self, cmd: &SendRfq) -> Result<Vec<RfqEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.rfq_id)?;

        if !self.status.can_transition_to(RfqStatus::Sent) {
            return Err(DomainError::transition("RFQ", self.status, RfqStatus::Sent));
        }
        if self.suppliers.is_empty() {
            return Err(DomainError::validation(
                "suppliers",
                "invite at least one supplier before sending",
            ));
        }
        if self.deadline_passed(cmd.occurred_at) {
            return Err(DomainError::validation(
                "response_deadline",
                "has already passed",
            ));
        }

        Ok(vec![RfqEvent::RfqSent(RfqSent {
            tenant_id: cmd.tenant_id,
            rfq_id: cmd.rfq_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_view(&self, cmd: &RecordSupplierView) -> Result<Vec<RfqEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.rfq_id)?;
        let supplier = self.existing_supplier(cmd.supplier_rfq_id)?;

        // Credentials are only live once the RFQ has gone out.
        if self.status == RfqStatus::Draft {
            return Err(DomainError::Unauthorized);
        }
        if supplier.status != ResponseStatus::Pending {
            return Ok(vec![]);
        }

        Ok(vec![RfqEvent::SupplierViewed(SupplierViewed {
            tenant_id: cmd.tenant_id,
            rfq_id: cmd.rfq_id,
            supplier_rfq_id: cmd.supplier_rfq_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitSupplierQuote) -> Result<Vec<RfqEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.rfq_id)?;
        let supplier = self.existing_supplier(cmd.supplier_rfq_id)?;
        self.ensure_accepting_responses(cmd.occurred_at, "quote submission")?;

        match supplier.status {
            ResponseStatus::Declined => {
                return Err(DomainError::transition(
                    "supplier response",
                    supplier.status,
                    ResponseStatus::Submitted,
                ));
            }
            ResponseStatus::Submitted if !supplier.allow_revisions => {
                return Err(DomainError::transition(
                    "supplier response",
                    supplier.status,
                    "revision",
                ));
            }
            _ => {}
        }

        let revision = supplier.current_revision() + 1;
        let (quote, reconciliation) = build_supplier_quote(
            &self.lines,
            &cmd.currency,
            &cmd.submission,
            &Reconciler::new(cmd.match_threshold),
            revision,
            cmd.occurred_at,
        )?;
        let status_after = recompute(
            self.status,
            self.response_statuses_with(cmd.supplier_rfq_id, ResponseStatus::Submitted),
        );

        Ok(vec![RfqEvent::SupplierQuoteSubmitted(SupplierQuoteSubmitted {
            tenant_id: cmd.tenant_id,
            rfq_id: cmd.rfq_id,
            supplier_rfq_id: cmd.supplier_rfq_id,
            quote,
            reconciliation,
            is_revision: revision > 1,
            status_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decline(&self, cmd: &DeclineRfq) -> Result<Vec<RfqEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.rfq_id)?;
        let supplier = self.existing_supplier(cmd.supplier_rfq_id)?;
        self.ensure_accepting_responses(cmd.occurred_at, "declining")?;

        if !supplier.status.is_outstanding() {
            return Err(DomainError::transition(
                "supplier response",
                supplier.status,
                ResponseStatus::Declined,
            ));
        }

        let status_after = recompute(
            self.status,
            self.response_statuses_with(cmd.supplier_rfq_id, ResponseStatus::Declined),
        );

        Ok(vec![RfqEvent::SupplierDeclined(SupplierDeclined {
            tenant_id: cmd.tenant_id,
            rfq_id: cmd.rfq_id,
            supplier_rfq_id: cmd.supplier_rfq_id,
            reason: cmd
                .reason
                .as_ref()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            status_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_permit_revision(&self, cmd: &PermitRevision) -> Result<Vec<RfqEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.rfq_id)?;
        let supplier = self.existing_supplier(cmd.supplier_rfq_id)?;

        if self.status.is_terminal() {
            return Err(DomainError::transition("RFQ", self.status, "revision permission"));
        }
        if supplier.allow_revisions {
            return Ok(vec![]);
        }

        Ok(vec![RfqEvent::RevisionPermitted(RevisionPermitted {
            tenant_id: cmd.tenant_id,
            rfq_id: cmd.rfq_id,
            supplier_rfq_id: cmd.supplier_rfq_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accept(&self, cmd: &AcceptLineItem) -> Result<Vec<RfqEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.rfq_id)?;

        let effective = self.status_at(cmd.occurred_at);
        if !matches!(effective, RfqStatus::PartiallyQuoted | RfqStatus::FullyQuoted) {
            return Err(DomainError::transition("RFQ", effective, "line acceptance"));
        }
        if self.line(cmd.line_no).is_none() {
            return Err(DomainError::validation("line_no", "no such requested line"));
        }

        let current = self.acceptances.get(&cmd.line_no).map(|a| a.source);
        if current != cmd.expected_current {
            return Err(DomainError::conflict(format!(
                "acceptance for line {} changed since it was read",
                cmd.line_no
            )));
        }
        if current == Some(cmd.source) {
            return Ok(vec![]);
        }

        let supplier = self.existing_supplier(cmd.source.supplier_rfq_id)?;
        if supplier.current_revision() != cmd.source.revision {
            return Err(DomainError::conflict(
                "supplier quote was revised since it was read",
            ));
        }
        let offer = self
            .offers_for_line(cmd.line_no)
            .into_iter()
            .find(|o| o.source == cmd.source)
            .ok_or_else(|| {
                DomainError::validation(
                    "source",
                    "quote line is not a priced offer for this requested line",
                )
            })?;

        Ok(vec![RfqEvent::LineItemAccepted(LineItemAccepted {
            tenant_id: cmd.tenant_id,
            rfq_id: cmd.rfq_id,
            acceptance: offer.accept(cmd.actor, cmd.occurred_at),
            superseded: current,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finalize(&self, cmd: &FinalizeAcceptance) -> Result<Vec<RfqEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.rfq_id)?;

        let effective = self.status_at(cmd.occurred_at);
        if !effective.can_transition_to(RfqStatus::QuoteAccepted) {
            return Err(DomainError::transition("RFQ", effective, RfqStatus::QuoteAccepted));
        }
        if self.acceptances.is_empty() {
            return Err(DomainError::validation(
                "acceptances",
                "accept at least one line before finalizing",
            ));
        }
        let unaccepted: Vec<String> = self
            .lines
            .iter()
            .map(|line| line.line_no)
            .filter(|line_no| !self.acceptances.contains_key(line_no))
            .filter(|line_no| !self.offers_for_line(*line_no).is_empty())
            .map(|line_no| line_no.to_string())
            .collect();
        if !unaccepted.is_empty() {
            return Err(DomainError::validation(
                "acceptances",
                format!("quoted lines without an accepted quote: {}", unaccepted.join(", ")),
            ));
        }

        Ok(vec![RfqEvent::AcceptanceFinalized(AcceptanceFinalized {
            tenant_id: cmd.tenant_id,
            rfq_id: cmd.rfq_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_expire(&self, cmd: &ExpireRfq) -> Result<Vec<RfqEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.rfq_id)?;

        let Some(deadline) = self.response_deadline else {
            return Ok(vec![]);
        };
        if !self.status.can_expire() || cmd.occurred_at < deadline {
            return Ok(vec![]);
        }

        Ok(vec![RfqEvent::RfqExpired(RfqExpired {
            tenant_id: cmd.tenant_id,
            rfq_id: cmd.rfq_id,
            response_deadline: deadline,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reopen(&self, cmd: &ReopenRfq) -> Result<Vec<RfqEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.rfq_id)?;

        let reopenable = self.status == RfqStatus::Expired
            || (self.status.is_open() && self.deadline_passed(cmd.occurred_at));
        if !reopenable {
            return Err(DomainError::transition("RFQ", self.status, "reopening"));
        }
        if cmd.response_deadline <= cmd.occurred_at {
            return Err(DomainError::validation(
                "response_deadline",
                "must be in the future",
            ));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reason", "must not be empty"));
        }

        // Back to SENT, then re-derived from the responses already on file.
        let status_after = recompute(RfqStatus::Sent, self.suppliers.iter().map(|s| s.status));

        Ok(vec![RfqEvent::RfqReopened(RfqReopened {
            tenant_id: cmd.tenant_id,
            rfq_id: cmd.rfq_id,
            previous_status: self.status,
            previous_deadline: self.response_deadline,
            response_deadline: cmd.response_deadline,
            status_after,
            reason: cmd.reason.trim().to_string(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelRfq) -> Result<Vec<RfqEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.rfq_id)?;

        let effective = self.status_at(cmd.occurred_at);
        if !effective.can_transition_to(RfqStatus::Cancelled) {
            return Err(DomainError::transition("RFQ", effective, RfqStatus::Cancelled));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reason", "must not be empty"));
        }

        Ok(vec![RfqEvent::RfqCancelled(RfqCancelled {
            tenant_id: cmd.tenant_id,
            rfq_id: cmd.rfq_id,
            previous_status: effective,
            reason: cmd.reason.trim().to_string(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::{DocumentRef, ManualEntry};
    use chrono::Duration;
    use quoteflow_reconciliation::{CandidateItem, MatchMethod};
    use rust_decimal_macros::dec;

    struct Fixture {
        rfq: Rfq,
        tenant_id: TenantId,
        rfq_id: RfqId,
        suppliers: Vec<SupplierRfqId>,
        now: DateTime<Utc>,
        deadline: DateTime<Utc>,
    }

    fn cad() -> CurrencyCode {
        CurrencyCode::new("CAD").unwrap()
    }

    fn run(rfq: &mut Rfq, cmd: RfqCommand) -> Result<Vec<RfqEvent>, DomainError> {
        quoteflow_events::execute(rfq, &cmd)
    }

    fn new_line(name: &str, quantity: Decimal, sku: Option<&str>) -> NewRfqLine {
        NewRfqLine {
            name: name.into(),
            description: None,
            quantity,
            unit: "each".into(),
            sku: sku.map(Into::into),
            notes: None,
        }
    }

    /// Created, two suppliers invited, sent.
    fn sent_rfq(allow_revisions: bool) -> Fixture {
        let tenant_id = TenantId::new();
        let rfq_id = RfqId::new(AggregateId::new());
        let now = Utc::now();
        let deadline = now + Duration::days(7);
        let mut rfq = Rfq::empty(rfq_id);

        run(
            &mut rfq,
            RfqCommand::CreateRfq(CreateRfq {
                tenant_id,
                rfq_id,
                number: DocumentNumber::new(DocumentKind::Rfq, 2031, 7).unwrap(),
                title: "Lobby refresh".into(),
                description: None,
                response_deadline: deadline,
                lines: vec![
                    new_line("Sofa", dec!(2), None),
                    new_line("Brass Floor Lamp", dec!(1), Some("LMP-22")),
                ],
                occurred_at: now,
            }),
        )
        .unwrap();

        let mut suppliers = Vec::new();
        for name in ["Acme Upholstery", "Northern Lighting"] {
            let supplier_rfq_id = SupplierRfqId::new(AggregateId::new());
            run(
                &mut rfq,
                RfqCommand::InviteSupplier(InviteSupplier {
                    tenant_id,
                    rfq_id,
                    supplier_rfq_id,
                    supplier_id: SupplierId::new(AggregateId::new()),
                    supplier_name: name.into(),
                    token: AccessToken::generate(),
                    allow_revisions,
                    occurred_at: now,
                }),
            )
            .unwrap();
            suppliers.push(supplier_rfq_id);
        }

        run(
            &mut rfq,
            RfqCommand::SendRfq(SendRfq {
                tenant_id,
                rfq_id,
                occurred_at: now,
            }),
        )
        .unwrap();

        Fixture {
            rfq,
            tenant_id,
            rfq_id,
            suppliers,
            now,
            deadline,
        }
    }

    fn manual(entries: &[(u32, Decimal)]) -> QuoteSubmission {
        QuoteSubmission::Manual {
            entries: entries
                .iter()
                .map(|(line, price)| ManualEntry {
                    rfq_line_no: *line,
                    unit_price: *price,
                    quantity: None,
                    lead_time: None,
                    notes: None,
                    components: vec![],
                })
                .collect(),
            delivery_fee: None,
            tax: None,
        }
    }

    fn submit_cmd(
        f: &Fixture,
        supplier: SupplierRfqId,
        submission: QuoteSubmission,
        at: DateTime<Utc>,
    ) -> RfqCommand {
        RfqCommand::SubmitSupplierQuote(SubmitSupplierQuote {
            tenant_id: f.tenant_id,
            rfq_id: f.rfq_id,
            supplier_rfq_id: supplier,
            currency: cad(),
            submission,
            match_threshold: 0.40,
            occurred_at: at,
        })
    }

    fn line_ref(f: &Fixture, supplier: SupplierRfqId, line_index: u32) -> QuoteLineRef {
        QuoteLineRef {
            supplier_rfq_id: supplier,
            revision: f.rfq.supplier(supplier).unwrap().current_revision(),
            line_index,
        }
    }

    fn accept_cmd(
        f: &Fixture,
        line_no: u32,
        source: QuoteLineRef,
        expected_current: Option<QuoteLineRef>,
    ) -> RfqCommand {
        RfqCommand::AcceptLineItem(AcceptLineItem {
            tenant_id: f.tenant_id,
            rfq_id: f.rfq_id,
            line_no,
            source,
            expected_current,
            actor: UserId::new(),
            occurred_at: f.now,
        })
    }

    fn submit(
        f: &mut Fixture,
        supplier: SupplierRfqId,
        submission: QuoteSubmission,
        at: DateTime<Utc>,
    ) -> Result<Vec<RfqEvent>, DomainError> {
        let cmd = submit_cmd(f, supplier, submission, at);
        run(&mut f.rfq, cmd)
    }

    fn accept(
        f: &mut Fixture,
        line_no: u32,
        source: QuoteLineRef,
        expected_current: Option<QuoteLineRef>,
    ) -> Result<Vec<RfqEvent>, DomainError> {
        let cmd = accept_cmd(f, line_no, source, expected_current);
        run(&mut f.rfq, cmd)
    }

    #[test]
    fn create_rejects_non_positive_quantity() {
        let rfq_id = RfqId::new(AggregateId::new());
        let now = Utc::now();
        let err = Rfq::empty(rfq_id)
            .handle(&RfqCommand::CreateRfq(CreateRfq {
                tenant_id: TenantId::new(),
                rfq_id,
                number: DocumentNumber::new(DocumentKind::Rfq, 2031, 1).unwrap(),
                title: "Lobby".into(),
                description: None,
                response_deadline: now + Duration::days(1),
                lines: vec![new_line("Sofa", dec!(1), None), new_line("Rug", dec!(0), None)],
                occurred_at: now,
            }))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("lines[1].quantity", "must be greater than zero")
        );
    }

    #[test]
    fn create_numbers_lines_and_starts_in_draft() {
        let f = sent_rfq(false);
        assert_eq!(f.rfq.lines()[0].line_no, 1);
        assert_eq!(f.rfq.lines()[1].line_no, 2);
        assert_eq!(f.rfq.number().unwrap().to_string(), "RFQ-2031-0007");
        assert_eq!(f.rfq.status(), RfqStatus::Sent);
        assert_eq!(f.rfq.version(), 4);
    }

    #[test]
    fn invitations_are_closed_once_sent() {
        let f = sent_rfq(false);
        let err = f
            .rfq
            .handle(&RfqCommand::InviteSupplier(InviteSupplier {
                tenant_id: f.tenant_id,
                rfq_id: f.rfq_id,
                supplier_rfq_id: SupplierRfqId::new(AggregateId::new()),
                supplier_id: SupplierId::new(AggregateId::new()),
                supplier_name: "Late Co".into(),
                token: AccessToken::generate(),
                allow_revisions: false,
                occurred_at: f.now,
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::StateTransition { .. }));
    }

    #[test]
    fn first_view_is_recorded_once() {
        let mut f = sent_rfq(false);
        let view = RfqCommand::RecordSupplierView(RecordSupplierView {
            tenant_id: f.tenant_id,
            rfq_id: f.rfq_id,
            supplier_rfq_id: f.suppliers[0],
            occurred_at: f.now,
        });
        assert_eq!(run(&mut f.rfq, view.clone()).unwrap().len(), 1);
        assert!(run(&mut f.rfq, view).unwrap().is_empty());
        assert_eq!(
            f.rfq.supplier(f.suppliers[0]).unwrap().status,
            ResponseStatus::Viewed
        );
    }

    #[test]
    fn submissions_move_rfq_through_partial_to_fully_quoted() {
        let mut f = sent_rfq(false);
        let (a, b) = (f.suppliers[0], f.suppliers[1]);

        { let now = f.now; submit(&mut f, a, manual(&[(1, dec!(1000))]), now).unwrap(); }
        assert_eq!(f.rfq.status(), RfqStatus::PartiallyQuoted);

        run(
            &mut f.rfq,
            RfqCommand::DeclineRfq(DeclineRfq {
                tenant_id: f.tenant_id,
                rfq_id: f.rfq_id,
                supplier_rfq_id: b,
                reason: Some("  out of stock ".into()),
                occurred_at: f.now,
            }),
        )
        .unwrap();
        assert_eq!(f.rfq.status(), RfqStatus::FullyQuoted);
        let declined = f.rfq.supplier(b).unwrap();
        assert_eq!(declined.status, ResponseStatus::Declined);
        assert_eq!(declined.decline_reason.as_deref(), Some("out of stock"));
    }

    #[test]
    fn declined_supplier_cannot_submit() {
        let mut f = sent_rfq(true);
        let b = f.suppliers[1];
        run(
            &mut f.rfq,
            RfqCommand::DeclineRfq(DeclineRfq {
                tenant_id: f.tenant_id,
                rfq_id: f.rfq_id,
                supplier_rfq_id: b,
                reason: None,
                occurred_at: f.now,
            }),
        )
        .unwrap();

        let err = f
            .rfq
            .handle(&submit_cmd(&f, b, manual(&[(1, dec!(5))]), f.now))
            .unwrap_err();
        assert!(matches!(err, DomainError::StateTransition { .. }));
    }

    #[test]
    fn submission_after_deadline_is_expired_but_viewing_still_works() {
        let mut f = sent_rfq(false);
        let late = f.deadline + Duration::minutes(1);

        assert_eq!(f.rfq.status_at(late), RfqStatus::Expired);
        let err = f
            .rfq
            .handle(&submit_cmd(&f, f.suppliers[0], manual(&[(1, dec!(1))]), late))
            .unwrap_err();
        assert_eq!(err, DomainError::ExpiredToken);

        let view = RfqCommand::RecordSupplierView(RecordSupplierView {
            tenant_id: f.tenant_id,
            rfq_id: f.rfq_id,
            supplier_rfq_id: f.suppliers[0],
            occurred_at: late,
        });
        assert_eq!(run(&mut f.rfq, view).unwrap().len(), 1);
    }

    #[test]
    fn resubmission_needs_permission_and_replaces_the_quote() {
        let mut f = sent_rfq(false);
        let a = f.suppliers[0];
        { let now = f.now; submit(&mut f, a, manual(&[(1, dec!(1000))]), now).unwrap(); }

        let err = f
            .rfq
            .handle(&submit_cmd(&f, a, manual(&[(1, dec!(900))]), f.now))
            .unwrap_err();
        assert!(matches!(err, DomainError::StateTransition { .. }));

        run(
            &mut f.rfq,
            RfqCommand::PermitRevision(PermitRevision {
                tenant_id: f.tenant_id,
                rfq_id: f.rfq_id,
                supplier_rfq_id: a,
                actor: UserId::new(),
                occurred_at: f.now,
            }),
        )
        .unwrap();
        { let now = f.now; submit(&mut f, a, manual(&[(1, dec!(900))]), now).unwrap(); }

        let supplier = f.rfq.supplier(a).unwrap();
        assert_eq!(supplier.status, ResponseStatus::Submitted);
        assert_eq!(supplier.revision_count, 1);
        let quote = supplier.quote.as_ref().unwrap();
        assert_eq!(quote.revision, 2);
        assert_eq!(quote.lines.len(), 1);
        assert_eq!(quote.lines[0].unit_price.as_ref().unwrap().amount(), dec!(900));
        assert_eq!(supplier.revision_template()[0].unit_price, dec!(900));
    }

    #[test]
    fn exact_sku_match_from_a_document() {
        let mut f = sent_rfq(false);
        let submission = QuoteSubmission::Document {
            document: DocumentRef("quotes/northern.pdf".into()),
            extracted: vec![
                CandidateItem::named("Floor lamp, aged brass")
                    .with_sku(" lmp-22 ")
                    .with_unit_price(dec!(310.50))
                    .with_quantity(dec!(1)),
            ],
            declared_total: None,
            delivery_fee: None,
            tax: None,
        };
        let b = f.suppliers[1];
        { let now = f.now; submit(&mut f, b, submission, now).unwrap(); }

        let result = f.rfq.supplier(b).unwrap().reconciliation.clone().unwrap();
        let lamp = result.line(2).unwrap();
        assert_eq!(lamp.classification, Classification::Matched);
        assert_eq!(lamp.method, Some(MatchMethod::Sku));
        assert_eq!(lamp.confidence, 1.0);
        assert_eq!(result.line(1).unwrap().classification, Classification::Missing);
    }

    #[test]
    fn acceptance_is_conditional_on_the_current_selection() {
        let mut f = sent_rfq(false);
        let (a, b) = (f.suppliers[0], f.suppliers[1]);
        { let now = f.now; submit(&mut f, a, manual(&[(1, dec!(1000))]), now).unwrap(); }
        { let now = f.now; submit(&mut f, b, manual(&[(1, dec!(950))]), now).unwrap(); }

        let from_a = line_ref(&f, a, 0);
        let from_b = line_ref(&f, b, 0);
        accept(&mut f, 1, from_a, None).unwrap();

        // A writer that still believes nothing is accepted loses.
        let err = f.rfq.handle(&accept_cmd(&f, 1, from_b, None)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let events = accept(&mut f, 1, from_b, Some(from_a)).unwrap();
        match &events[0] {
            RfqEvent::LineItemAccepted(e) => {
                assert_eq!(e.superseded, Some(from_a));
                assert_eq!(e.acceptance.unit_cost.amount(), dec!(950));
                assert_eq!(e.acceptance.quantity, dec!(2));
            }
            _ => panic!("Expected LineItemAccepted event"),
        }
        assert_eq!(f.rfq.acceptances().count(), 1);
        assert_eq!(f.rfq.acceptance(1).unwrap().source, from_b);
    }

    #[test]
    fn lowest_cost_offer_prefers_cheapest_and_refuses_mixed_currencies() {
        let mut f = sent_rfq(false);
        let (a, b) = (f.suppliers[0], f.suppliers[1]);
        { let now = f.now; submit(&mut f, a, manual(&[(1, dec!(1000))]), now).unwrap(); }
        { let now = f.now; submit(&mut f, b, manual(&[(1, dec!(950))]), now).unwrap(); }

        let best = f.rfq.lowest_cost_offer(1).unwrap().unwrap();
        assert_eq!(best.source.supplier_rfq_id, b);
        assert_eq!(f.rfq.lowest_cost_offer(2).unwrap(), None);

        let mut mixed = sent_rfq(false);
        let (a, b) = (mixed.suppliers[0], mixed.suppliers[1]);
        { let now = mixed.now; submit(&mut mixed, a, manual(&[(1, dec!(1000))]), now).unwrap(); }
        let mut usd = submit_cmd(&mixed, b, manual(&[(1, dec!(700))]), mixed.now);
        if let RfqCommand::SubmitSupplierQuote(cmd) = &mut usd {
            cmd.currency = CurrencyCode::new("USD").unwrap();
        }
        run(&mut mixed.rfq, usd).unwrap();

        let err = mixed.rfq.lowest_cost_offer(1).unwrap_err();
        assert!(matches!(err, DomainError::CurrencyMismatch { .. }));
        assert_eq!(mixed.rfq.response_totals().currencies().count(), 2);
    }

    #[test]
    fn finalize_requires_an_acceptance() {
        let mut f = sent_rfq(false);
        let a = f.suppliers[0];
        { let now = f.now; submit(&mut f, a, manual(&[(1, dec!(1000))]), now).unwrap(); }

        let finalize = RfqCommand::FinalizeAcceptance(FinalizeAcceptance {
            tenant_id: f.tenant_id,
            rfq_id: f.rfq_id,
            actor: UserId::new(),
            occurred_at: f.now,
        });
        assert!(matches!(
            f.rfq.handle(&finalize).unwrap_err(),
            DomainError::Validation { .. }
        ));

        let source = line_ref(&f, a, 0);
        accept(&mut f, 1, source, None).unwrap();
        run(&mut f.rfq, finalize).unwrap();
        assert_eq!(f.rfq.status(), RfqStatus::QuoteAccepted);
    }

    #[test]
    fn finalize_requires_every_quoted_line_to_be_accepted() {
        let mut f = sent_rfq(false);
        let a = f.suppliers[0];
        { let now = f.now; submit(&mut f, a, manual(&[(1, dec!(1000)), (2, dec!(180))]), now).unwrap(); }
        let sofa = line_ref(&f, a, 0);
        accept(&mut f, 1, sofa, None).unwrap();

        let finalize = RfqCommand::FinalizeAcceptance(FinalizeAcceptance {
            tenant_id: f.tenant_id,
            rfq_id: f.rfq_id,
            actor: UserId::new(),
            occurred_at: f.now,
        });
        let version = f.rfq.version();
        match f.rfq.handle(&finalize).unwrap_err() {
            DomainError::Validation { field, message } => {
                assert_eq!(field, "acceptances");
                assert!(message.contains('2'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.rfq.version(), version);

        let lamp = f.rfq.lowest_cost_offer(2).unwrap().unwrap().source;
        accept(&mut f, 2, lamp, None).unwrap();
        run(&mut f.rfq, finalize).unwrap();
        assert_eq!(f.rfq.status(), RfqStatus::QuoteAccepted);
    }

    #[test]
    fn expiry_is_idempotent_and_reopen_is_audited() {
        let mut f = sent_rfq(false);
        let late = f.deadline + Duration::hours(1);
        let expire = RfqCommand::ExpireRfq(ExpireRfq {
            tenant_id: f.tenant_id,
            rfq_id: f.rfq_id,
            occurred_at: late,
        });

        // Not due yet.
        let early = RfqCommand::ExpireRfq(ExpireRfq {
            tenant_id: f.tenant_id,
            rfq_id: f.rfq_id,
            occurred_at: f.now,
        });
        assert!(run(&mut f.rfq, early).unwrap().is_empty());

        assert_eq!(run(&mut f.rfq, expire.clone()).unwrap().len(), 1);
        assert!(run(&mut f.rfq, expire).unwrap().is_empty());
        assert_eq!(f.rfq.status(), RfqStatus::Expired);

        let actor = UserId::new();
        let new_deadline = late + Duration::days(3);
        let events = run(
            &mut f.rfq,
            RfqCommand::ReopenRfq(ReopenRfq {
                tenant_id: f.tenant_id,
                rfq_id: f.rfq_id,
                response_deadline: new_deadline,
                reason: "supplier asked for more time".into(),
                actor,
                occurred_at: late,
            }),
        )
        .unwrap();
        match &events[0] {
            RfqEvent::RfqReopened(e) => {
                assert_eq!(e.actor, actor);
                assert_eq!(e.previous_status, RfqStatus::Expired);
                assert_eq!(e.previous_deadline, Some(f.deadline));
            }
            _ => panic!("Expected RfqReopened event"),
        }
        assert_eq!(f.rfq.status(), RfqStatus::Sent);
        assert_eq!(f.rfq.response_deadline(), Some(new_deadline));

        let a = f.suppliers[0];
        submit(&mut f, a, manual(&[(1, dec!(1))]), late).unwrap();
        assert_eq!(f.rfq.status(), RfqStatus::PartiallyQuoted);
    }

    #[test]
    fn cancel_is_refused_from_terminal_states() {
        let mut f = sent_rfq(false);
        let cancel = RfqCommand::CancelRfq(CancelRfq {
            tenant_id: f.tenant_id,
            rfq_id: f.rfq_id,
            reason: "client paused the project".into(),
            actor: UserId::new(),
            occurred_at: f.now,
        });
        run(&mut f.rfq, cancel.clone()).unwrap();
        assert_eq!(f.rfq.status(), RfqStatus::Cancelled);

        let version = f.rfq.version();
        let err = f.rfq.handle(&cancel).unwrap_err();
        assert!(matches!(err, DomainError::StateTransition { .. }));
        assert_eq!(f.rfq.version(), version);
    }

    #[test]
    fn wrong_tenant_is_rejected() {
        let f = sent_rfq(false);
        let err = f
            .rfq
            .handle(&RfqCommand::SendRfq(SendRfq {
                tenant_id: TenantId::new(),
                rfq_id: f.rfq_id,
                occurred_at: f.now,
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::invariant("tenant mismatch"));
    }
}
