use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use quoteflow_core::{
    AggregateId, CurrencyCode, DocumentKind, DocumentNumber, DomainError, Money, TenantId, UserId,
};
use quoteflow_events::{EventBus, EventEnvelope};
use quoteflow_reconciliation::Classification;
use quoteflow_rfq::{
    AcceptLineItem, Acceptance, AccessToken, CancelRfq, CreateRfq, DeclineRfq, DocumentRef,
    FinalizeAcceptance, InviteSupplier, ManualEntry, NewRfqLine, PermitRevision, QuoteLineRef,
    QuoteSubmission, RecordSupplierView, ReopenRfq, ResponseStatus, Rfq, RfqCommand, RfqId,
    RfqLineItem, RfqStatus, SendRfq, SubmitSupplierQuote, SupplierId, SupplierQuote, SupplierRfqId,
};

use super::{ProcurementService, ServiceResult};
use crate::command_dispatcher::DispatchError;
use crate::credentials::SupplierGrant;
use crate::event_store::EventStore;
use crate::extraction::extract_or_empty;
use crate::streams;

/// Resubmissions racing unrelated writes to the same RFQ stream are retried
/// this many times before the conflict is surfaced.
const SUBMIT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRfq {
    pub title: String,
    pub description: Option<String>,
    pub response_deadline: DateTime<Utc>,
    pub lines: Vec<NewRfqLine>,
}

/// Returned once per invitation; the token goes into the supplier's link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierInvitation {
    pub supplier_rfq_id: SupplierRfqId,
    pub token: AccessToken,
}

/// What a supplier sees behind their link.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplierView {
    pub number: DocumentNumber,
    pub title: String,
    pub description: Option<String>,
    pub response_deadline: Option<DateTime<Utc>>,
    pub lines: Vec<RfqLineItem>,
    pub response_status: ResponseStatus,
    /// Submitting (or resubmitting) would currently be accepted.
    pub can_submit: bool,
    pub current_quote: Option<SupplierQuote>,
    /// The current quote as editable entries, for pre-filling a revision form.
    pub revision_template: Vec<ManualEntry>,
}

/// A supplier submission before extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplierSubmission {
    Document {
        document: DocumentRef,
        declared_total: Option<Decimal>,
        delivery_fee: Option<Decimal>,
        tax: Option<Decimal>,
    },
    Manual {
        entries: Vec<ManualEntry>,
        delivery_fee: Option<Decimal>,
        tax: Option<Decimal>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    pub supplier_rfq_id: SupplierRfqId,
    pub revision: u32,
    pub rfq_status: RfqStatus,
    pub total: Money,
    pub manual_entry_required: bool,
    /// Requested lines the quote did not cover.
    pub missing_lines: Vec<u32>,
}

impl<S, B> ProcurementService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn create_rfq(&self, tenant_id: TenantId, new: NewRfq) -> ServiceResult<RfqId> {
        let now = self.now();
        let rfq_id = RfqId::new(AggregateId::new());
        let number = self.sequences.allocate(tenant_id, DocumentKind::Rfq, now)?;

        self.run_rfq(
            tenant_id,
            rfq_id,
            RfqCommand::CreateRfq(CreateRfq {
                tenant_id,
                rfq_id,
                number,
                title: new.title,
                description: new.description,
                response_deadline: new.response_deadline,
                lines: new.lines,
                occurred_at: now,
            }),
        )?;

        info!(tenant_id = %tenant_id, rfq_id = %rfq_id, number = %number, "rfq created");
        Ok(rfq_id)
    }

    pub fn invite_supplier(
        &self,
        tenant_id: TenantId,
        rfq_id: RfqId,
        supplier_id: SupplierId,
        supplier_name: impl Into<String>,
    ) -> ServiceResult<SupplierInvitation> {
        let supplier_rfq_id = SupplierRfqId::new(AggregateId::new());
        let token = AccessToken::generate();

        self.run_rfq(
            tenant_id,
            rfq_id,
            RfqCommand::InviteSupplier(InviteSupplier {
                tenant_id,
                rfq_id,
                supplier_rfq_id,
                supplier_id,
                supplier_name: supplier_name.into(),
                token: token.clone(),
                allow_revisions: self.config.allow_supplier_revisions,
                occurred_at: self.now(),
            }),
        )?;

        self.credentials.register(
            &token,
            SupplierGrant {
                tenant_id,
                rfq_id,
                supplier_rfq_id,
            },
        )?;

        info!(
            tenant_id = %tenant_id,
            rfq_id = %rfq_id,
            supplier_rfq_id = %supplier_rfq_id,
            supplier_id = %supplier_id,
            "supplier invited"
        );
        Ok(SupplierInvitation {
            supplier_rfq_id,
            token,
        })
    }

    pub fn send_rfq(&self, tenant_id: TenantId, rfq_id: RfqId) -> ServiceResult<RfqStatus> {
        let rfq = self.run_rfq(
            tenant_id,
            rfq_id,
            RfqCommand::SendRfq(SendRfq {
                tenant_id,
                rfq_id,
                occurred_at: self.now(),
            }),
        )?;
        info!(tenant_id = %tenant_id, rfq_id = %rfq_id, suppliers = rfq.suppliers().len(), "rfq sent");
        Ok(rfq.status())
    }

    /// Open the supplier's link. The first view moves the response from
    /// PENDING to VIEWED; viewing stays possible after the deadline.
    pub fn view_as_supplier(&self, token: &AccessToken) -> ServiceResult<SupplierView> {
        let grant = self.credentials.resolve(token)?;
        let now = self.now();
        let rfq = self.run_rfq(
            grant.tenant_id,
            grant.rfq_id,
            RfqCommand::RecordSupplierView(RecordSupplierView {
                tenant_id: grant.tenant_id,
                rfq_id: grant.rfq_id,
                supplier_rfq_id: grant.supplier_rfq_id,
                occurred_at: now,
            }),
        )?;

        let supplier = rfq
            .supplier(grant.supplier_rfq_id)
            .ok_or(DomainError::Unauthorized)?;
        let status = rfq.status_at(now);
        let deadline_open = rfq.response_deadline().is_some_and(|d| now < d);
        let can_submit = status.is_open()
            && deadline_open
            && match supplier.status {
                ResponseStatus::Pending | ResponseStatus::Viewed => true,
                ResponseStatus::Submitted => supplier.allow_revisions,
                ResponseStatus::Declined => false,
            };

        Ok(SupplierView {
            number: *rfq.number().ok_or(DomainError::NotFound)?,
            title: rfq.title().to_string(),
            description: rfq.description().map(str::to_string),
            response_deadline: rfq.response_deadline(),
            lines: rfq.lines().to_vec(),
            response_status: supplier.status,
            can_submit,
            current_quote: supplier.quote.clone(),
            revision_template: supplier.revision_template(),
        })
    }

    /// Submit or resubmit a supplier quote.
    ///
    /// Document submissions go through the extraction collaborator first; a
    /// failed extraction still records the submission, flagged for manual
    /// entry. A resubmission that loses a race against another resubmission of
    /// the same response fails with `DuplicateSubmission`.
    pub fn submit_quote(
        &self,
        token: &AccessToken,
        currency: CurrencyCode,
        submission: SupplierSubmission,
    ) -> ServiceResult<SubmissionReceipt> {
        let grant = self.credentials.resolve(token)?;
        let submission = self.prepare_submission(&grant, submission);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let (rfq, version) = self.load_rfq(grant.tenant_id, grant.rfq_id)?;
            let seen_revision = rfq
                .supplier(grant.supplier_rfq_id)
                .map(|s| s.current_revision())
                .ok_or(DomainError::Unauthorized)?;

            let command = RfqCommand::SubmitSupplierQuote(SubmitSupplierQuote {
                tenant_id: grant.tenant_id,
                rfq_id: grant.rfq_id,
                supplier_rfq_id: grant.supplier_rfq_id,
                currency: currency.clone(),
                submission: submission.clone(),
                match_threshold: self.config.fuzzy_match_threshold,
                occurred_at: self.now(),
            });

            match self.dispatcher.dispatch_expecting(
                grant.tenant_id,
                grant.rfq_id.0,
                streams::RFQ,
                version,
                command,
                |_, id| Rfq::empty(RfqId::new(id)),
            ) {
                Ok(_) => break,
                Err(DispatchError::Concurrency(msg)) => {
                    let (latest, _) = self.load_rfq(grant.tenant_id, grant.rfq_id)?;
                    let now_revision = latest
                        .supplier(grant.supplier_rfq_id)
                        .map(|s| s.current_revision())
                        .unwrap_or(seen_revision);
                    if now_revision != seen_revision {
                        warn!(
                            tenant_id = %grant.tenant_id,
                            rfq_id = %grant.rfq_id,
                            supplier_rfq_id = %grant.supplier_rfq_id,
                            "concurrent resubmission rejected"
                        );
                        return Err(DomainError::DuplicateSubmission(
                            "another submission for this response was recorded first".to_string(),
                        )
                        .into());
                    }
                    if attempt >= SUBMIT_ATTEMPTS {
                        return Err(DispatchError::Concurrency(msg));
                    }
                    debug!(attempt, rfq_id = %grant.rfq_id, "retrying submission after unrelated rfq write");
                }
                Err(other) => return Err(other),
            }
        }
        self.sync_read_models();

        let rfq = self.rfq(grant.tenant_id, grant.rfq_id)?;
        let supplier = rfq
            .supplier(grant.supplier_rfq_id)
            .ok_or(DomainError::Unauthorized)?;
        let quote = supplier.quote.as_ref().ok_or(DomainError::NotFound)?;
        let missing_lines = supplier
            .reconciliation
            .as_ref()
            .map(|r| {
                r.lines
                    .iter()
                    .filter(|l| l.classification == Classification::Missing)
                    .map(|l| l.line_no)
                    .collect()
            })
            .unwrap_or_default();

        info!(
            tenant_id = %grant.tenant_id,
            rfq_id = %grant.rfq_id,
            supplier_rfq_id = %grant.supplier_rfq_id,
            revision = quote.revision,
            total = %quote.total,
            manual_entry_required = quote.manual_entry_required,
            rfq_status = %rfq.status(),
            "supplier quote recorded"
        );

        Ok(SubmissionReceipt {
            supplier_rfq_id: grant.supplier_rfq_id,
            revision: quote.revision,
            rfq_status: rfq.status(),
            total: quote.total.clone(),
            manual_entry_required: quote.manual_entry_required,
            missing_lines,
        })
    }

    fn prepare_submission(&self, grant: &SupplierGrant, submission: SupplierSubmission) -> QuoteSubmission {
        match submission {
            SupplierSubmission::Document {
                document,
                declared_total,
                delivery_fee,
                tax,
            } => {
                let extracted = extract_or_empty(self.extractor.as_ref(), &document);
                debug!(
                    supplier_rfq_id = %grant.supplier_rfq_id,
                    candidates = extracted.len(),
                    "document extracted"
                );
                QuoteSubmission::Document {
                    document,
                    extracted,
                    declared_total,
                    delivery_fee,
                    tax,
                }
            }
            SupplierSubmission::Manual {
                entries,
                delivery_fee,
                tax,
            } => QuoteSubmission::Manual {
                entries,
                delivery_fee,
                tax,
            },
        }
    }

    pub fn decline_rfq(&self, token: &AccessToken, reason: Option<String>) -> ServiceResult<RfqStatus> {
        let grant = self.credentials.resolve(token)?;
        let rfq = self.run_rfq(
            grant.tenant_id,
            grant.rfq_id,
            RfqCommand::DeclineRfq(DeclineRfq {
                tenant_id: grant.tenant_id,
                rfq_id: grant.rfq_id,
                supplier_rfq_id: grant.supplier_rfq_id,
                reason,
                occurred_at: self.now(),
            }),
        )?;
        info!(
            tenant_id = %grant.tenant_id,
            rfq_id = %grant.rfq_id,
            supplier_rfq_id = %grant.supplier_rfq_id,
            "supplier declined"
        );
        Ok(rfq.status())
    }

    pub fn permit_revision(
        &self,
        tenant_id: TenantId,
        rfq_id: RfqId,
        supplier_rfq_id: SupplierRfqId,
        actor: UserId,
    ) -> ServiceResult<()> {
        self.run_rfq(
            tenant_id,
            rfq_id,
            RfqCommand::PermitRevision(PermitRevision {
                tenant_id,
                rfq_id,
                supplier_rfq_id,
                actor,
                occurred_at: self.now(),
            }),
        )?;
        info!(tenant_id = %tenant_id, rfq_id = %rfq_id, supplier_rfq_id = %supplier_rfq_id, actor = %actor, "revision permitted");
        Ok(())
    }

    /// Accept one supplier quote line for a requested line.
    ///
    /// `expected_current` is the acceptance the caller saw (if any); when it
    /// no longer matches, the call fails with a conflict instead of silently
    /// replacing someone else's choice.
    pub fn accept_line(
        &self,
        tenant_id: TenantId,
        rfq_id: RfqId,
        line_no: u32,
        source: QuoteLineRef,
        expected_current: Option<QuoteLineRef>,
        actor: UserId,
    ) -> ServiceResult<Acceptance> {
        let rfq = self.run_rfq(
            tenant_id,
            rfq_id,
            RfqCommand::AcceptLineItem(AcceptLineItem {
                tenant_id,
                rfq_id,
                line_no,
                source,
                expected_current,
                actor,
                occurred_at: self.now(),
            }),
        )?;
        let acceptance = rfq.acceptance(line_no).cloned().ok_or(DomainError::NotFound)?;
        info!(
            tenant_id = %tenant_id,
            rfq_id = %rfq_id,
            line_no,
            supplier_rfq_id = %acceptance.source.supplier_rfq_id,
            unit_cost = %acceptance.unit_cost,
            "line accepted"
        );
        Ok(acceptance)
    }

    /// Accept the cheapest priced offer on every requested line that has one.
    pub fn accept_lowest_cost(
        &self,
        tenant_id: TenantId,
        rfq_id: RfqId,
        actor: UserId,
    ) -> ServiceResult<Vec<Acceptance>> {
        let rfq = self.rfq(tenant_id, rfq_id)?;
        let mut accepted = Vec::new();
        for line in rfq.lines() {
            let Some(offer) = rfq.lowest_cost_offer(line.line_no)? else {
                debug!(rfq_id = %rfq_id, line_no = line.line_no, "no priced offer for line");
                continue;
            };
            let current = rfq.acceptance(line.line_no).map(|a| a.source);
            accepted.push(self.accept_line(tenant_id, rfq_id, line.line_no, offer.source, current, actor)?);
        }
        Ok(accepted)
    }

    pub fn finalize_acceptance(&self, tenant_id: TenantId, rfq_id: RfqId, actor: UserId) -> ServiceResult<RfqStatus> {
        let rfq = self.run_rfq(
            tenant_id,
            rfq_id,
            RfqCommand::FinalizeAcceptance(FinalizeAcceptance {
                tenant_id,
                rfq_id,
                actor,
                occurred_at: self.now(),
            }),
        )?;
        info!(tenant_id = %tenant_id, rfq_id = %rfq_id, lines = rfq.acceptances().count(), "acceptance finalized");
        Ok(rfq.status())
    }

    /// Audited override: give an expired (or overdue) RFQ a new deadline.
    pub fn reopen_rfq(
        &self,
        tenant_id: TenantId,
        rfq_id: RfqId,
        response_deadline: DateTime<Utc>,
        reason: impl Into<String>,
        actor: UserId,
    ) -> ServiceResult<RfqStatus> {
        let rfq = self.run_rfq(
            tenant_id,
            rfq_id,
            RfqCommand::ReopenRfq(ReopenRfq {
                tenant_id,
                rfq_id,
                response_deadline,
                reason: reason.into(),
                actor,
                occurred_at: self.now(),
            }),
        )?;
        info!(tenant_id = %tenant_id, rfq_id = %rfq_id, actor = %actor, deadline = %response_deadline, status = %rfq.status(), "rfq reopened");
        Ok(rfq.status())
    }

    pub fn cancel_rfq(
        &self,
        tenant_id: TenantId,
        rfq_id: RfqId,
        reason: impl Into<String>,
        actor: UserId,
    ) -> ServiceResult<()> {
        let rfq = self.run_rfq(
            tenant_id,
            rfq_id,
            RfqCommand::CancelRfq(CancelRfq {
                tenant_id,
                rfq_id,
                reason: reason.into(),
                actor,
                occurred_at: self.now(),
            }),
        )?;
        for supplier in rfq.suppliers() {
            self.credentials.revoke(&supplier.token);
        }
        info!(tenant_id = %tenant_id, rfq_id = %rfq_id, actor = %actor, "rfq cancelled");
        Ok(())
    }
}
