//! Pricing engine: supplier cost → client price, per-currency totals, rounding.
//!
//! Everything here is a pure function over `Money`/`Decimal`. No state, no IO;
//! safe to call from any thread.

pub mod line;
pub mod markup;
pub mod rounding;
pub mod totals;

pub use line::{ComponentCost, CostLine, PricedComponent, PricedLine, line_amount, price_line};
pub use markup::{Markup, client_price, client_unit_price};
pub use rounding::round2;
pub use totals::{CurrencyTotals, aggregate_total};
