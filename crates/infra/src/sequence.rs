//! Document number allocation (`RFQ-2026-0001`, `PO-2026-0001`).
//!
//! Counters are kept per tenant, per document kind, per calendar year, so
//! every studio starts again at 0001 on January 1st.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Utc};

use quoteflow_core::{DocumentKind, DocumentNumber, DomainError, TenantId};

pub trait SequenceAllocator: Send + Sync {
    /// Reserve the next number. Numbers are never handed out twice, even when
    /// the command that asked for one later fails.
    fn allocate(
        &self,
        tenant_id: TenantId,
        kind: DocumentKind,
        at: DateTime<Utc>,
    ) -> Result<DocumentNumber, DomainError>;
}

impl<S> SequenceAllocator for Arc<S>
where
    S: SequenceAllocator + ?Sized,
{
    fn allocate(
        &self,
        tenant_id: TenantId,
        kind: DocumentKind,
        at: DateTime<Utc>,
    ) -> Result<DocumentNumber, DomainError> {
        (**self).allocate(tenant_id, kind, at)
    }
}

#[derive(Debug, Default)]
pub struct InMemorySequenceAllocator {
    counters: Mutex<HashMap<(TenantId, DocumentKind, i32), u32>>,
}

impl InMemorySequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceAllocator for InMemorySequenceAllocator {
    fn allocate(
        &self,
        tenant_id: TenantId,
        kind: DocumentKind,
        at: DateTime<Utc>,
    ) -> Result<DocumentNumber, DomainError> {
        let year = at.year();
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| DomainError::invariant("sequence allocator lock poisoned"))?;
        let counter = counters.entry((tenant_id, kind, year)).or_insert(0);
        let next = counter
            .checked_add(1)
            .ok_or_else(|| DomainError::invariant(format!("{} counter exhausted for {year}", kind.prefix())))?;
        let number = DocumentNumber::new(kind, year, next)?;
        *counter = next;
        Ok(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn counters_are_per_kind_and_per_tenant() {
        let alloc = InMemorySequenceAllocator::new();
        let (a, b) = (TenantId::new(), TenantId::new());

        assert_eq!(alloc.allocate(a, DocumentKind::Rfq, at(2026)).unwrap().to_string(), "RFQ-2026-0001");
        assert_eq!(alloc.allocate(a, DocumentKind::Rfq, at(2026)).unwrap().to_string(), "RFQ-2026-0002");
        assert_eq!(
            alloc.allocate(a, DocumentKind::PurchaseOrder, at(2026)).unwrap().to_string(),
            "PO-2026-0001"
        );
        assert_eq!(alloc.allocate(b, DocumentKind::Rfq, at(2026)).unwrap().to_string(), "RFQ-2026-0001");
    }

    #[test]
    fn counters_reset_each_year() {
        let alloc = InMemorySequenceAllocator::new();
        let t = TenantId::new();
        alloc.allocate(t, DocumentKind::PurchaseOrder, at(2025)).unwrap();
        alloc.allocate(t, DocumentKind::PurchaseOrder, at(2025)).unwrap();

        let first_of_year = alloc.allocate(t, DocumentKind::PurchaseOrder, at(2026)).unwrap();
        assert_eq!(first_of_year.to_string(), "PO-2026-0001");
    }
}
