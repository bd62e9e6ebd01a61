//! Supplier quote submissions and their normalised form.
//!
//! Document uploads and manual-entry forms arrive in different shapes; both
//! are reduced to a candidate list, reconciled against the requested lines,
//! and stored as one `SupplierQuote`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quoteflow_core::{CurrencyCode, DomainError, DomainResult, Money};
use quoteflow_pricing::{ComponentCost, CostLine, aggregate_total};
use quoteflow_reconciliation::{
    CandidateItem, Classification, MatchResult, Reconciler, RequestedItem,
};

use crate::rfq::RfqLineItem;

/// Pointer into external document storage. Never dereferenced here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEntry {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: Decimal,
}

/// One row of the manual-entry form, tied to a requested line by the supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEntry {
    pub rfq_line_no: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub lead_time: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentEntry>,
}

/// What a supplier sends. The currency travels alongside on the command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuoteSubmission {
    /// Uploaded quote document. `extracted` is whatever the extraction
    /// collaborator produced for it, possibly nothing.
    Document {
        document: DocumentRef,
        #[serde(default)]
        extracted: Vec<CandidateItem>,
        #[serde(default)]
        declared_total: Option<Decimal>,
        #[serde(default)]
        delivery_fee: Option<Decimal>,
        #[serde(default)]
        tax: Option<Decimal>,
    },
    Manual {
        entries: Vec<ManualEntry>,
        #[serde(default)]
        delivery_fee: Option<Decimal>,
        #[serde(default)]
        tax: Option<Decimal>,
    },
}

/// A quoted line after reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierQuoteLine {
    /// Position in the supplier's list (0-based).
    pub index: u32,
    /// The requested line this was paired with; `None` for extras.
    pub rfq_line_no: Option<u32>,
    pub name: String,
    pub sku: Option<String>,
    pub unit_price: Option<Money>,
    pub quantity: Option<Decimal>,
    pub lead_time: Option<String>,
    pub notes: Option<String>,
    pub components: Vec<ComponentCost>,
    pub classification: Classification,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierQuote {
    /// 1 for the first submission, incremented on every replacement.
    pub revision: u32,
    pub currency: CurrencyCode,
    pub document: Option<DocumentRef>,
    pub lines: Vec<SupplierQuoteLine>,
    pub delivery_fee: Money,
    pub tax: Money,
    pub total: Money,
    /// `true` when `total` is the supplier's declared figure rather than derived.
    pub total_declared: bool,
    pub manual_entry_required: bool,
    pub submitted_at: DateTime<Utc>,
}

impl SupplierQuote {
    pub fn line(&self, index: u32) -> Option<&SupplierQuoteLine> {
        self.lines.iter().find(|l| l.index == index)
    }

    pub fn lines_for(&self, rfq_line_no: u32) -> impl Iterator<Item = &SupplierQuoteLine> {
        self.lines
            .iter()
            .filter(move |l| l.rfq_line_no == Some(rfq_line_no))
    }
}

fn non_negative(field: &str, value: Option<Decimal>) -> DomainResult<Decimal> {
    let value = value.unwrap_or(Decimal::ZERO);
    if value < Decimal::ZERO {
        return Err(DomainError::validation(field, "must not be negative"));
    }
    Ok(value)
}

fn validate_entries(requested: &[RfqLineItem], entries: &[ManualEntry]) -> DomainResult<()> {
    if entries.is_empty() {
        return Err(DomainError::validation("entries", "at least one line must be quoted"));
    }
    let mut seen = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        if !requested.iter().any(|l| l.line_no == entry.rfq_line_no) {
            return Err(DomainError::validation(
                format!("entries[{i}].rfq_line_no"),
                "does not refer to a requested line",
            ));
        }
        if seen.contains(&entry.rfq_line_no) {
            return Err(DomainError::validation(
                format!("entries[{i}].rfq_line_no"),
                "line quoted more than once",
            ));
        }
        seen.push(entry.rfq_line_no);

        if entry.unit_price < Decimal::ZERO {
            return Err(DomainError::validation(
                format!("entries[{i}].unit_price"),
                "must not be negative",
            ));
        }
        if entry.quantity.is_some_and(|q| q <= Decimal::ZERO) {
            return Err(DomainError::validation(
                format!("entries[{i}].quantity"),
                "must be greater than zero",
            ));
        }
        for (j, c) in entry.components.iter().enumerate() {
            if c.name.trim().is_empty() {
                return Err(DomainError::validation(
                    format!("entries[{i}].components[{j}].name"),
                    "must not be empty",
                ));
            }
            if c.unit_price < Decimal::ZERO {
                return Err(DomainError::validation(
                    format!("entries[{i}].components[{j}].unit_price"),
                    "must not be negative",
                ));
            }
            if c.quantity <= Decimal::ZERO {
                return Err(DomainError::validation(
                    format!("entries[{i}].components[{j}].quantity"),
                    "must be greater than zero",
                ));
            }
        }
    }
    Ok(())
}

/// Extraction output is best-effort: unusable figures are dropped, not rejected.
fn sanitise_extracted(extracted: &[CandidateItem]) -> Vec<CandidateItem> {
    extracted
        .iter()
        .map(|c| CandidateItem {
            unit_price: c.unit_price.filter(|p| *p >= Decimal::ZERO),
            quantity: c.quantity.filter(|q| *q > Decimal::ZERO),
            linked_line: None,
            ..c.clone()
        })
        .collect()
}

fn manual_candidates(requested: &[RfqLineItem], entries: &[ManualEntry]) -> Vec<CandidateItem> {
    entries
        .iter()
        .filter_map(|e| {
            let line = requested.iter().find(|l| l.line_no == e.rfq_line_no)?;
            Some(CandidateItem {
                name: line.name.clone(),
                sku: line.sku.clone(),
                unit_price: Some(e.unit_price),
                quantity: e.quantity,
                lead_time: e.lead_time.clone(),
                notes: e.notes.clone(),
                linked_line: Some(e.rfq_line_no),
            })
        })
        .collect()
}

/// Normalise, reconcile and total a submission.
pub(crate) fn build_supplier_quote(
    requested: &[RfqLineItem],
    currency: &CurrencyCode,
    submission: &QuoteSubmission,
    reconciler: &Reconciler,
    revision: u32,
    submitted_at: DateTime<Utc>,
) -> DomainResult<(SupplierQuote, MatchResult)> {
    let (document, candidates, components, declared_total, delivery_fee, tax) = match submission {
        QuoteSubmission::Document {
            document,
            extracted,
            declared_total,
            delivery_fee,
            tax,
        } => {
            let candidates = sanitise_extracted(extracted);
            let components = vec![Vec::new(); candidates.len()];
            let declared = match declared_total {
                Some(_) => Some(non_negative("declared_total", *declared_total)?),
                None => None,
            };
            (
                Some(document.clone()),
                candidates,
                components,
                declared,
                non_negative("delivery_fee", *delivery_fee)?,
                non_negative("tax", *tax)?,
            )
        }
        QuoteSubmission::Manual {
            entries,
            delivery_fee,
            tax,
        } => {
            validate_entries(requested, entries)?;
            let components = entries
                .iter()
                .map(|e| {
                    e.components
                        .iter()
                        .map(|c| ComponentCost {
                            name: c.name.clone(),
                            unit_cost: Money::new(c.unit_price, currency.clone()),
                            quantity: c.quantity,
                        })
                        .collect::<Vec<_>>()
                })
                .collect();
            (
                None,
                manual_candidates(requested, entries),
                components,
                None,
                non_negative("delivery_fee", *delivery_fee)?,
                non_negative("tax", *tax)?,
            )
        }
    };

    let requested_items: Vec<RequestedItem> = requested
        .iter()
        .map(|l| RequestedItem {
            line_no: l.line_no,
            name: l.name.clone(),
            sku: l.sku.clone(),
            quantity: l.quantity,
        })
        .collect();
    let result = reconciler.reconcile(&requested_items, &candidates);

    let lines: Vec<SupplierQuoteLine> = candidates
        .into_iter()
        .zip(components)
        .enumerate()
        .map(|(idx, (c, components))| {
            let paired = result.line_for_candidate(idx);
            SupplierQuoteLine {
                index: idx as u32,
                rfq_line_no: paired.map(|l| l.line_no),
                name: c.name,
                sku: c.sku,
                unit_price: c.unit_price.map(|p| Money::new(p, currency.clone())),
                quantity: c.quantity,
                lead_time: c.lead_time,
                notes: c.notes,
                components,
                classification: result.candidate_classification(idx),
                confidence: paired.map(|l| l.confidence).unwrap_or(0.0),
            }
        })
        .collect();

    let delivery_fee = Money::new(delivery_fee, currency.clone());
    let tax = Money::new(tax, currency.clone());
    let (total, total_declared) = match declared_total {
        Some(declared) => (Money::new(declared, currency.clone()), true),
        None => (derive_total(requested, currency, &lines, &delivery_fee, &tax)?, false),
    };

    let quote = SupplierQuote {
        revision,
        currency: currency.clone(),
        document,
        lines,
        delivery_fee,
        tax,
        total,
        total_declared,
        manual_entry_required: result.manual_entry_required,
        submitted_at,
    };
    Ok((quote, result))
}

/// Σ priced line costs (quantity falls back to the requested quantity, then 1)
/// plus delivery fee and tax.
fn derive_total(
    requested: &[RfqLineItem],
    currency: &CurrencyCode,
    lines: &[SupplierQuoteLine],
    delivery_fee: &Money,
    tax: &Money,
) -> DomainResult<Money> {
    let mut amounts = Vec::with_capacity(lines.len() + 2);
    for line in lines {
        let Some(unit_cost) = &line.unit_price else {
            continue;
        };
        let quantity = line
            .quantity
            .or_else(|| {
                let no = line.rfq_line_no?;
                requested.iter().find(|l| l.line_no == no).map(|l| l.quantity)
            })
            .unwrap_or(Decimal::ONE);
        let cost = CostLine {
            unit_cost: unit_cost.clone(),
            quantity,
            components: line.components.clone(),
        };
        amounts.push(cost.cost_total()?);
    }
    amounts.push(delivery_fee.clone());
    amounts.push(tax.clone());
    aggregate_total(currency, &amounts)
}
