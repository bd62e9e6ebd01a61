//! Line-level pricing, including attached component sub-items.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quoteflow_core::{DomainError, DomainResult, Money};

use crate::markup::{Markup, client_unit_price};
use crate::rounding::round2;

/// A component attached to a line (e.g. a fabric upgrade on a sofa), at cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentCost {
    pub name: String,
    pub unit_cost: Money,
    pub quantity: Decimal,
}

/// A line at supplier cost, as accepted from a supplier quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLine {
    pub unit_cost: Money,
    pub quantity: Decimal,
    #[serde(default)]
    pub components: Vec<ComponentCost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedComponent {
    pub name: String,
    pub unit_price: Money,
    pub quantity: Decimal,
    pub total: Money,
}

/// Client-facing prices for one line. Carries no supplier cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub unit_price: Money,
    pub quantity: Decimal,
    pub components: Vec<PricedComponent>,
    pub line_total: Money,
}

/// `round2(unit × quantity)` in the unit's currency.
pub fn line_amount(unit: &Money, quantity: Decimal) -> Money {
    Money::new(round2(unit.amount() * quantity), unit.currency().clone())
}

impl CostLine {
    fn validate(&self) -> DomainResult<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("quantity", "must be greater than zero"));
        }
        if self.unit_cost.is_negative() {
            return Err(DomainError::validation("unit_cost", "must not be negative"));
        }
        for (idx, c) in self.components.iter().enumerate() {
            c.unit_cost.ensure_same_currency(self.unit_cost.currency())?;
            if c.quantity <= Decimal::ZERO {
                return Err(DomainError::validation(
                    format!("components[{idx}].quantity"),
                    "must be greater than zero",
                ));
            }
            if c.unit_cost.is_negative() {
                return Err(DomainError::validation(
                    format!("components[{idx}].unit_cost"),
                    "must not be negative",
                ));
            }
        }
        Ok(())
    }

    /// Total supplier cost of the line, components included, at cost.
    pub fn cost_total(&self) -> DomainResult<Money> {
        self.validate()?;
        let mut total = line_amount(&self.unit_cost, self.quantity);
        for c in &self.components {
            total = total.checked_add(&line_amount(&c.unit_cost, c.quantity))?;
        }
        Ok(total)
    }
}

/// Price a cost line for the client.
///
/// The line and each component are marked up exactly once, from cost; the
/// line total is the rounded line amount plus the rounded component amounts.
pub fn price_line(line: &CostLine, markup: Markup) -> DomainResult<PricedLine> {
    line.validate()?;

    let unit_price = client_unit_price(&line.unit_cost, markup);
    let mut line_total = line_amount(&unit_price, line.quantity);

    let mut components = Vec::with_capacity(line.components.len());
    for c in &line.components {
        let unit_price = client_unit_price(&c.unit_cost, markup);
        let total = line_amount(&unit_price, c.quantity);
        line_total = line_total.checked_add(&total)?;
        components.push(PricedComponent {
            name: c.name.clone(),
            unit_price,
            quantity: c.quantity,
            total,
        });
    }

    Ok(PricedLine {
        unit_price,
        quantity: line.quantity,
        components,
        line_total,
    })
}
