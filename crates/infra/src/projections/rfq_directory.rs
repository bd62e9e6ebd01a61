use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use quoteflow_core::{AggregateId, DocumentNumber, TenantId};
use quoteflow_events::EventEnvelope;
use quoteflow_rfq::{RfqEvent, RfqId, RfqStatus};

use crate::read_model::TenantStore;
use crate::streams;

/// One row of the tenant's RFQ list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfqSummary {
    pub rfq_id: RfqId,
    pub number: DocumentNumber,
    pub title: String,
    pub status: RfqStatus,
    pub response_deadline: DateTime<Utc>,
    pub suppliers_invited: u32,
    pub responses_submitted: u32,
    pub responses_declined: u32,
    pub lines_accepted: u32,
    pub reopen_count: u32,
}

impl RfqSummary {
    /// Open for responses with a deadline at or before `now`.
    pub fn is_due_for_expiry(&self, now: DateTime<Utc>) -> bool {
        self.status.can_expire() && self.response_deadline <= now
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum RfqDirectoryError {
    #[error("failed to deserialize rfq event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
    #[error("event for unknown rfq {0}")]
    UnknownRfq(RfqId),
}

/// Tenant-scoped directory of RFQs, fed from the bus.
///
/// Idempotent under at-least-once delivery: envelopes at or below the last
/// applied sequence number of their stream are skipped.
#[derive(Debug)]
pub struct RfqDirectoryProjection<S>
where
    S: TenantStore<RfqId, RfqSummary>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> RfqDirectoryProjection<S>
where
    S: TenantStore<RfqId, RfqSummary>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.cursors
            .read()
            .ok()
            .and_then(|c| c.get(&CursorKey { tenant_id, aggregate_id }).copied())
            .unwrap_or(0)
    }

    fn set_cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(CursorKey { tenant_id, aggregate_id }, seq);
        }
    }

    pub fn get(&self, tenant_id: TenantId, rfq_id: &RfqId) -> Option<RfqSummary> {
        self.store.get(tenant_id, rfq_id)
    }

    /// Every RFQ of the tenant, newest number first.
    pub fn list(&self, tenant_id: TenantId) -> Vec<RfqSummary> {
        let mut rows = self.store.list(tenant_id);
        rows.sort_by(|a, b| b.number.cmp(&a.number));
        rows
    }

    /// RFQs the expiry sweep should look at, across all tenants.
    pub fn due_for_expiry(&self, now: DateTime<Utc>) -> Vec<(TenantId, RfqId)> {
        let mut due = Vec::new();
        for tenant_id in self.store.tenants() {
            let mut rows: Vec<RfqSummary> = self
                .store
                .list(tenant_id)
                .into_iter()
                .filter(|r| r.is_due_for_expiry(now))
                .collect();
            rows.sort_by_key(|r| r.response_deadline);
            due.extend(rows.into_iter().map(|r| (tenant_id, r.rfq_id)));
        }
        due
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), RfqDirectoryError> {
        if envelope.aggregate_type() != streams::RFQ {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursor(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(RfqDirectoryError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(RfqDirectoryError::NonMonotonicSequence { last, found: seq });
        }

        let ev: RfqEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| RfqDirectoryError::Deserialize(e.to_string()))?;

        let (event_tenant, rfq_id) = identity(&ev);
        if event_tenant != tenant_id {
            return Err(RfqDirectoryError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if rfq_id.0 != aggregate_id {
            return Err(RfqDirectoryError::TenantIsolation(
                "event rfq_id does not match envelope aggregate_id".to_string(),
            ));
        }

        if let RfqEvent::RfqCreated(e) = &ev {
            self.store.upsert(
                tenant_id,
                e.rfq_id,
                RfqSummary {
                    rfq_id: e.rfq_id,
                    number: e.number,
                    title: e.title.clone(),
                    status: RfqStatus::Draft,
                    response_deadline: e.response_deadline,
                    suppliers_invited: 0,
                    responses_submitted: 0,
                    responses_declined: 0,
                    lines_accepted: 0,
                    reopen_count: 0,
                },
            );
        } else {
            let mut row = self
                .store
                .get(tenant_id, &rfq_id)
                .ok_or(RfqDirectoryError::UnknownRfq(rfq_id))?;
            evolve(&mut row, &ev);
            self.store.upsert(tenant_id, rfq_id, row);
        }

        self.set_cursor(tenant_id, aggregate_id, seq);
        Ok(())
    }

    /// Drop the tenant's rows and replay the given envelopes.
    pub fn rebuild<'a>(
        &self,
        tenant_id: TenantId,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<JsonValue>>,
    ) -> Result<(), RfqDirectoryError> {
        self.store.clear_tenant(tenant_id);
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| k.tenant_id != tenant_id);
        }
        for envelope in envelopes {
            if envelope.tenant_id() == tenant_id {
                self.apply_envelope(envelope)?;
            }
        }
        Ok(())
    }
}

fn identity(ev: &RfqEvent) -> (TenantId, RfqId) {
    match ev {
        RfqEvent::RfqCreated(e) => (e.tenant_id, e.rfq_id),
        RfqEvent::SupplierInvited(e) => (e.tenant_id, e.rfq_id),
        RfqEvent::RfqSent(e) => (e.tenant_id, e.rfq_id),
        RfqEvent::SupplierViewed(e) => (e.tenant_id, e.rfq_id),
        RfqEvent::SupplierQuoteSubmitted(e) => (e.tenant_id, e.rfq_id),
        RfqEvent::SupplierDeclined(e) => (e.tenant_id, e.rfq_id),
        RfqEvent::RevisionPermitted(e) => (e.tenant_id, e.rfq_id),
        RfqEvent::LineItemAccepted(e) => (e.tenant_id, e.rfq_id),
        RfqEvent::AcceptanceFinalized(e) => (e.tenant_id, e.rfq_id),
        RfqEvent::RfqExpired(e) => (e.tenant_id, e.rfq_id),
        RfqEvent::RfqReopened(e) => (e.tenant_id, e.rfq_id),
        RfqEvent::RfqCancelled(e) => (e.tenant_id, e.rfq_id),
    }
}

fn evolve(row: &mut RfqSummary, ev: &RfqEvent) {
    match ev {
        RfqEvent::RfqCreated(_) | RfqEvent::SupplierViewed(_) | RfqEvent::RevisionPermitted(_) => {}
        RfqEvent::SupplierInvited(_) => row.suppliers_invited += 1,
        RfqEvent::RfqSent(_) => row.status = RfqStatus::Sent,
        RfqEvent::SupplierQuoteSubmitted(e) => {
            if !e.is_revision {
                row.responses_submitted += 1;
            }
            row.status = e.status_after;
        }
        RfqEvent::SupplierDeclined(e) => {
            row.responses_declined += 1;
            row.status = e.status_after;
        }
        RfqEvent::LineItemAccepted(e) => {
            if e.superseded.is_none() {
                row.lines_accepted += 1;
            }
        }
        RfqEvent::AcceptanceFinalized(_) => row.status = RfqStatus::QuoteAccepted,
        RfqEvent::RfqExpired(_) => row.status = RfqStatus::Expired,
        RfqEvent::RfqReopened(e) => {
            row.status = e.status_after;
            row.response_deadline = e.response_deadline;
            row.reopen_count += 1;
        }
        RfqEvent::RfqCancelled(_) => row.status = RfqStatus::Cancelled,
    }
}
