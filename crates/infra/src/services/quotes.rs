use serde_json::Value as JsonValue;
use tracing::{error, info};

use quoteflow_core::{AggregateId, CurrencyCode, DomainError, Money, TenantId};
use quoteflow_events::{EventBus, EventEnvelope};
use quoteflow_quoting::{
    ApproveQuote, BuildClientQuote, ClientQuote, ClientQuoteCommand, ClientQuoteId,
    ClientQuoteStatus, MarkClientReviewing, MarkSuperseded, MarkupPlan, RecordPayment,
    RejectQuote, RequestRevision, SendToClient, accepted_items,
};
use quoteflow_rfq::{RfqId, RfqStatus};

use super::{ProcurementService, ServiceResult};
use crate::event_store::EventStore;
use crate::streams;

/// Pricing inputs for a client quote. Without a markup plan the configured
/// default markup applies to every line.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientQuoteRequest {
    pub currency: CurrencyCode,
    pub markups: Option<MarkupPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentStatus {
    pub status: ClientQuoteStatus,
    pub paid: Money,
    pub balance_due: Money,
}

impl<S, B> ProcurementService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Price the accepted lines of an RFQ into a first client quote revision.
    pub fn build_client_quote(
        &self,
        tenant_id: TenantId,
        rfq_id: RfqId,
        request: ClientQuoteRequest,
    ) -> ServiceResult<ClientQuoteId> {
        self.build_revision(tenant_id, rfq_id, 1, None, request)
    }

    /// Rebuild a client quote (usually after the client asked for changes).
    ///
    /// The new revision is built from the RFQ's current acceptances, then the
    /// previous revision is marked superseded. Both quotes stay on record.
    pub fn revise_client_quote(
        &self,
        tenant_id: TenantId,
        previous: ClientQuoteId,
        request: ClientQuoteRequest,
    ) -> ServiceResult<ClientQuoteId> {
        let (prior, prior_version) = self.load_quote(tenant_id, previous)?;
        if !prior.status().can_transition_to(ClientQuoteStatus::Superseded) {
            return Err(DomainError::transition("client quote", prior.status(), ClientQuoteStatus::Superseded).into());
        }
        let rfq_id = prior.rfq_id().ok_or(DomainError::NotFound)?;

        let quote_id = self.build_revision(tenant_id, rfq_id, prior.revision() + 1, Some(previous), request)?;

        let marked = self.dispatcher.dispatch_expecting(
            tenant_id,
            previous.0,
            streams::CLIENT_QUOTE,
            prior_version,
            ClientQuoteCommand::MarkSuperseded(MarkSuperseded {
                tenant_id,
                quote_id: previous,
                superseded_by: quote_id,
                occurred_at: self.now(),
            }),
            |_, id| ClientQuote::empty(ClientQuoteId::new(id)),
        );
        if let Err(err) = marked {
            error!(
                tenant_id = %tenant_id,
                quote_id = %previous,
                superseded_by = %quote_id,
                error = %err,
                "new revision built but previous revision could not be superseded"
            );
            return Err(err);
        }

        info!(tenant_id = %tenant_id, quote_id = %quote_id, supersedes = %previous, "client quote revised");
        Ok(quote_id)
    }

    fn build_revision(
        &self,
        tenant_id: TenantId,
        rfq_id: RfqId,
        revision: u32,
        supersedes: Option<ClientQuoteId>,
        request: ClientQuoteRequest,
    ) -> ServiceResult<ClientQuoteId> {
        let rfq = self.rfq(tenant_id, rfq_id)?;
        if rfq.status() != RfqStatus::QuoteAccepted {
            return Err(DomainError::transition("RFQ", rfq.status(), "client quote").into());
        }

        let markups = match request.markups {
            Some(plan) => plan,
            None => MarkupPlan::uniform(self.config.default_markup()?),
        };
        let quote_id = ClientQuoteId::new(AggregateId::new());
        let quote = self.run_quote(
            tenant_id,
            quote_id,
            ClientQuoteCommand::BuildClientQuote(BuildClientQuote {
                tenant_id,
                quote_id,
                rfq_id,
                revision,
                supersedes,
                currency: request.currency,
                markups,
                items: accepted_items(&rfq),
                occurred_at: self.now(),
            }),
        )?;

        info!(
            tenant_id = %tenant_id,
            rfq_id = %rfq_id,
            quote_id = %quote_id,
            revision,
            total = ?quote.total().map(ToString::to_string),
            cost = ?quote.cost_total().map(ToString::to_string),
            "client quote built"
        );
        Ok(quote_id)
    }

    pub fn send_quote_to_client(&self, tenant_id: TenantId, quote_id: ClientQuoteId) -> ServiceResult<ClientQuoteStatus> {
        let command = ClientQuoteCommand::SendToClient(SendToClient {
            tenant_id,
            quote_id,
            occurred_at: self.now(),
        });
        self.transition_quote(tenant_id, quote_id, command)
    }

    pub fn mark_client_reviewing(&self, tenant_id: TenantId, quote_id: ClientQuoteId) -> ServiceResult<ClientQuoteStatus> {
        let command = ClientQuoteCommand::MarkClientReviewing(MarkClientReviewing {
            tenant_id,
            quote_id,
            occurred_at: self.now(),
        });
        self.transition_quote(tenant_id, quote_id, command)
    }

    pub fn approve_quote(&self, tenant_id: TenantId, quote_id: ClientQuoteId) -> ServiceResult<ClientQuoteStatus> {
        let command = ClientQuoteCommand::ApproveQuote(ApproveQuote {
            tenant_id,
            quote_id,
            occurred_at: self.now(),
        });
        self.transition_quote(tenant_id, quote_id, command)
    }

    pub fn request_quote_revision(
        &self,
        tenant_id: TenantId,
        quote_id: ClientQuoteId,
        note: Option<String>,
    ) -> ServiceResult<ClientQuoteStatus> {
        let command = ClientQuoteCommand::RequestRevision(RequestRevision {
            tenant_id,
            quote_id,
            note,
            occurred_at: self.now(),
        });
        self.transition_quote(tenant_id, quote_id, command)
    }

    pub fn reject_quote(
        &self,
        tenant_id: TenantId,
        quote_id: ClientQuoteId,
        reason: Option<String>,
    ) -> ServiceResult<ClientQuoteStatus> {
        let command = ClientQuoteCommand::RejectQuote(RejectQuote {
            tenant_id,
            quote_id,
            reason,
            occurred_at: self.now(),
        });
        self.transition_quote(tenant_id, quote_id, command)
    }

    /// Record a client payment. Payments accumulate; the quote becomes PAID
    /// once they cover the total.
    pub fn record_client_payment(
        &self,
        tenant_id: TenantId,
        quote_id: ClientQuoteId,
        amount: Money,
        reference: Option<String>,
    ) -> ServiceResult<PaymentStatus> {
        let quote = self.run_quote(
            tenant_id,
            quote_id,
            ClientQuoteCommand::RecordPayment(RecordPayment {
                tenant_id,
                quote_id,
                amount: amount.clone(),
                reference,
                occurred_at: self.now(),
            }),
        )?;

        let paid = quote.paid().ok_or(DomainError::NotFound)?;
        let balance_due = quote.balance_due().ok_or(DomainError::NotFound)?;
        info!(
            tenant_id = %tenant_id,
            quote_id = %quote_id,
            amount = %amount,
            paid = %paid,
            balance_due = %balance_due,
            status = %quote.status(),
            "client payment recorded"
        );
        Ok(PaymentStatus {
            status: quote.status(),
            paid,
            balance_due,
        })
    }

    fn transition_quote(
        &self,
        tenant_id: TenantId,
        quote_id: ClientQuoteId,
        command: ClientQuoteCommand,
    ) -> ServiceResult<ClientQuoteStatus> {
        let quote = self.run_quote(tenant_id, quote_id, command)?;
        info!(tenant_id = %tenant_id, quote_id = %quote_id, status = %quote.status(), "client quote status changed");
        Ok(quote.status())
    }
}
