//! Client quote builder: accepted supplier terms → client-facing lines.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quoteflow_core::{CurrencyCode, DomainError, DomainResult, Money};
use quoteflow_pricing::{ComponentCost, CostLine, Markup, PricedComponent, aggregate_total, price_line};
use quoteflow_rfq::{Acceptance, QuoteLineRef, Rfq, SupplierId};

/// One accepted line together with the requested line it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedItem {
    pub line_no: u32,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub acceptance: Acceptance,
}

/// Snapshot of an RFQ's current acceptances, in requested-line order.
pub fn accepted_items(rfq: &Rfq) -> Vec<AcceptedItem> {
    rfq.acceptances()
        .filter_map(|acceptance| {
            let line = rfq.line(acceptance.rfq_line_no)?;
            Some(AcceptedItem {
                line_no: line.line_no,
                name: line.name.clone(),
                description: line.description.clone(),
                unit: line.unit.clone(),
                acceptance: acceptance.clone(),
            })
        })
        .collect()
}

/// Per-quote default markup with optional per-line overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupPlan {
    pub default: Markup,
    #[serde(default)]
    pub overrides: BTreeMap<u32, Markup>,
}

impl MarkupPlan {
    pub fn uniform(default: Markup) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, line_no: u32, markup: Markup) -> Self {
        self.overrides.insert(line_no, markup);
        self
    }

    pub fn markup_for(&self, line_no: u32) -> Markup {
        self.overrides.get(&line_no).copied().unwrap_or(self.default)
    }
}

/// Client-facing line. Carries the client price only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientQuoteLine {
    pub line_no: u32,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub markup: Markup,
    pub unit_price: Money,
    pub quantity: Decimal,
    pub components: Vec<PricedComponent>,
    pub line_total: Money,
}

/// Supplier cost lineage for one client line. Internal to the studio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBasisLine {
    pub line_no: u32,
    pub name: String,
    pub unit: String,
    pub source: QuoteLineRef,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub unit_cost: Money,
    pub quantity: Decimal,
    pub components: Vec<ComponentCost>,
    pub lead_time: Option<String>,
    pub cost_total: Money,
}

impl CostBasisLine {
    pub fn cost_line(&self) -> CostLine {
        CostLine {
            unit_cost: self.unit_cost.clone(),
            quantity: self.quantity,
            components: self.components.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedQuote {
    pub currency: CurrencyCode,
    pub lines: Vec<ClientQuoteLine>,
    pub cost_basis: Vec<CostBasisLine>,
    pub total: Money,
    pub cost_total: Money,
}

impl PricedQuote {
    pub fn profit(&self) -> DomainResult<Money> {
        self.total.checked_sub(&self.cost_total)
    }
}

/// Price every accepted item in `currency`.
///
/// Each line is marked up once, from its accepted supplier cost, with its
/// override or the plan default. An accepted cost in another currency fails
/// with `CurrencyMismatch`; nothing is converted.
pub fn price_items(
    items: &[AcceptedItem],
    currency: &CurrencyCode,
    plan: &MarkupPlan,
) -> DomainResult<PricedQuote> {
    if items.is_empty() {
        return Err(DomainError::validation("items", "no accepted lines to quote"));
    }
    for line_no in plan.overrides.keys() {
        if !items.iter().any(|i| i.line_no == *line_no) {
            return Err(DomainError::validation(
                format!("line_markups[{line_no}]"),
                "no accepted line with that number",
            ));
        }
    }

    let mut lines = Vec::with_capacity(items.len());
    let mut cost_basis = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        if items[..idx].iter().any(|other| other.line_no == item.line_no) {
            return Err(DomainError::validation(
                format!("items[{idx}].line_no"),
                "line accepted more than once",
            ));
        }
        let acceptance = &item.acceptance;
        if acceptance.unit_cost.currency() != currency {
            return Err(DomainError::currency_mismatch(
                currency,
                acceptance.unit_cost.currency(),
            ));
        }

        let cost = acceptance.cost_line();
        let markup = plan.markup_for(item.line_no);
        let priced = price_line(&cost, markup)?;

        lines.push(ClientQuoteLine {
            line_no: item.line_no,
            name: item.name.clone(),
            description: item.description.clone(),
            unit: item.unit.clone(),
            markup,
            unit_price: priced.unit_price,
            quantity: priced.quantity,
            components: priced.components,
            line_total: priced.line_total,
        });
        cost_basis.push(CostBasisLine {
            line_no: item.line_no,
            name: item.name.clone(),
            unit: item.unit.clone(),
            source: acceptance.source,
            supplier_id: acceptance.supplier_id,
            supplier_name: acceptance.supplier_name.clone(),
            unit_cost: acceptance.unit_cost.clone(),
            quantity: acceptance.quantity,
            components: acceptance.components.clone(),
            lead_time: acceptance.lead_time.clone(),
            cost_total: cost.cost_total()?,
        });
    }

    let total = aggregate_total(currency, lines.iter().map(|l| &l.line_total))?;
    let cost_total = aggregate_total(currency, cost_basis.iter().map(|l| &l.cost_total))?;

    Ok(PricedQuote {
        currency: currency.clone(),
        lines,
        cost_basis,
        total,
        cost_total,
    })
}
