use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quoteflow_core::AggregateId;
use quoteflow_reconciliation::MatchResult;

use crate::quote::{ComponentEntry, ManualEntry, SupplierQuote};
use crate::status::ResponseStatus;

/// Supplier party identifier (a studio's supplier directory entry).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(pub AggregateId);

impl SupplierId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SupplierId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One supplier's invitation to one RFQ.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierRfqId(pub AggregateId);

impl SupplierRfqId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SupplierRfqId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Opaque supplier access credential, bound to exactly one `SupplierRfqId`.
///
/// `Debug` is redacted so tokens do not end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Fresh random token (UUIDv4, hex without hyphens).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_string(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Response state of one invited supplier. Owned by the RFQ aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierRfq {
    pub id: SupplierRfqId,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub token: AccessToken,
    pub status: ResponseStatus,
    pub invited_at: DateTime<Utc>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
    pub allow_revisions: bool,
    /// Number of times a submitted quote was replaced.
    pub revision_count: u32,
    pub quote: Option<SupplierQuote>,
    pub reconciliation: Option<MatchResult>,
}

impl SupplierRfq {
    /// Current quote revision number; 0 before the first submission.
    pub fn current_revision(&self) -> u32 {
        self.quote.as_ref().map(|q| q.revision).unwrap_or(0)
    }

    /// The current quote rendered as manual entries, for pre-filling a revision.
    ///
    /// Only lines that were paired with a requested line and carry a price
    /// can be expressed as entries; extras are left for the supplier to re-add.
    pub fn revision_template(&self) -> Vec<ManualEntry> {
        let Some(quote) = &self.quote else {
            return Vec::new();
        };
        quote
            .lines
            .iter()
            .filter_map(|line| {
                let rfq_line_no = line.rfq_line_no?;
                let unit_price = line.unit_price.as_ref()?.amount();
                Some(ManualEntry {
                    rfq_line_no,
                    unit_price,
                    quantity: line.quantity,
                    lead_time: line.lead_time.clone(),
                    notes: line.notes.clone(),
                    components: line
                        .components
                        .iter()
                        .map(|c| ComponentEntry {
                            name: c.name.clone(),
                            unit_price: c.unit_cost.amount(),
                            quantity: c.quantity,
                        })
                        .collect(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_redacted_in_debug() {
        let a = AccessToken::generate();
        let b = AccessToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(!format!("{a:?}").contains(a.as_str()));
    }
}
