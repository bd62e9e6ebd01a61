use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A requested line, reduced to the fields matching looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedItem {
    pub line_no: u32,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: Decimal,
}

/// A supplier line as extracted from a document or typed into the manual form.
///
/// Every field is best-effort. `linked_line` is set when the supplier picked
/// the requested line explicitly (manual entry).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub lead_time: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub linked_line: Option<u32>,
}

impl CandidateItem {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn with_unit_price(mut self, price: Decimal) -> Self {
        self.unit_price = Some(price);
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn linked_to(mut self, line_no: u32) -> Self {
        self.linked_line = Some(line_no);
        self
    }
}
