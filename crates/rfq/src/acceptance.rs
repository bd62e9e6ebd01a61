use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quoteflow_core::{Money, UserId};
use quoteflow_pricing::{ComponentCost, CostLine};
use quoteflow_reconciliation::Classification;

use crate::supplier::{SupplierId, SupplierRfqId};

/// Identifies one line of one revision of one supplier's quote.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteLineRef {
    pub supplier_rfq_id: SupplierRfqId,
    pub revision: u32,
    pub line_index: u32,
}

/// A priced supplier line that can be accepted for a requested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub source: QuoteLineRef,
    pub rfq_line_no: u32,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub unit_cost: Money,
    /// Quoted quantity, or the requested quantity when the supplier gave none.
    pub quantity: Decimal,
    pub components: Vec<ComponentCost>,
    pub lead_time: Option<String>,
    pub classification: Classification,
}

impl Offer {
    pub(crate) fn accept(self, accepted_by: UserId, accepted_at: DateTime<Utc>) -> Acceptance {
        Acceptance {
            rfq_line_no: self.rfq_line_no,
            source: self.source,
            supplier_id: self.supplier_id,
            supplier_name: self.supplier_name,
            unit_cost: self.unit_cost,
            quantity: self.quantity,
            components: self.components,
            lead_time: self.lead_time,
            accepted_by,
            accepted_at,
        }
    }
}

/// Accepted supplier terms for one requested line: an immutable cost snapshot.
///
/// Later revisions of the supplier quote do not alter it; the studio must
/// accept again to pick up new terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acceptance {
    pub rfq_line_no: u32,
    pub source: QuoteLineRef,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub unit_cost: Money,
    pub quantity: Decimal,
    pub components: Vec<ComponentCost>,
    pub lead_time: Option<String>,
    pub accepted_by: UserId,
    pub accepted_at: DateTime<Utc>,
}

impl Acceptance {
    pub fn cost_line(&self) -> CostLine {
        CostLine {
            unit_cost: self.unit_cost.clone(),
            quantity: self.quantity,
            components: self.components.clone(),
        }
    }
}
