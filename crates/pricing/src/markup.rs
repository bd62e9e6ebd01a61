use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quoteflow_core::{DomainError, DomainResult, Money};

use crate::rounding::round2;

/// Markup percentage applied on top of supplier cost. Always `>= 0`.
///
/// Zero is a legitimate cost-plus-zero quote, not an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Markup(Decimal);

impl Markup {
    pub const ZERO: Markup = Markup(Decimal::ZERO);

    pub fn new(percent: Decimal) -> DomainResult<Self> {
        if percent.is_sign_negative() && !percent.is_zero() {
            return Err(DomainError::validation(
                "markup_percent",
                format!("markup must be zero or positive, got {percent}"),
            ));
        }
        Ok(Self(percent))
    }

    pub fn percent(&self) -> Decimal {
        self.0
    }

    /// `1 + percent / 100`.
    pub fn factor(&self) -> Decimal {
        Decimal::ONE + self.0 / Decimal::ONE_HUNDRED
    }
}

impl Default for Markup {
    fn default() -> Self {
        Markup::ZERO
    }
}

impl TryFrom<Decimal> for Markup {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Markup> for Decimal {
    fn from(value: Markup) -> Self {
        value.0
    }
}

impl core::fmt::Display for Markup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// `round2(supplier_cost × (1 + markup/100))`.
pub fn client_price(supplier_cost: Decimal, markup: Markup) -> Decimal {
    round2(supplier_cost * markup.factor())
}

/// Currency-preserving variant of [`client_price`].
pub fn client_unit_price(supplier_cost: &Money, markup: Markup) -> Money {
    Money::new(
        client_price(supplier_cost.amount(), markup),
        supplier_cost.currency().clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use quoteflow_core::CurrencyCode;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_markup_is_a_validation_error() {
        let err = Markup::new(dec!(-0.01)).unwrap_err();
        match err {
            DomainError::Validation { field, .. } => assert_eq!(field, "markup_percent"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn twenty_five_percent_on_one_thousand() {
        let cad = CurrencyCode::new("CAD").unwrap();
        let cost = Money::new(dec!(1000.00), cad.clone());
        let price = client_unit_price(&cost, Markup::new(dec!(25)).unwrap());
        assert_eq!(price, Money::new(dec!(1250.00), cad));
    }

    #[test]
    fn fractional_results_round_half_up() {
        // 19.99 * 1.175 = 23.488250
        assert_eq!(client_price(dec!(19.99), Markup::new(dec!(17.5)).unwrap()), dec!(23.49));
        // 0.01 * 1.5 = 0.015
        assert_eq!(client_price(dec!(0.01), Markup::new(dec!(50)).unwrap()), dec!(0.02));
    }

    #[test]
    fn markup_deserialises_with_validation() {
        let ok: Markup = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(ok.percent(), dec!(12.5));
        assert!(serde_json::from_str::<Markup>("\"-3\"").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Cost-plus-zero is just rounding.
        #[test]
        fn zero_markup_is_identity_after_rounding(cents in 0i64..100_000_000i64, extra in 0u32..100u32) {
            // Up to four decimal places of input precision.
            let cost = Decimal::new(cents * 100 + i64::from(extra), 4);
            prop_assert_eq!(client_price(cost, Markup::ZERO), round2(cost));
        }

        /// Raising the markup never lowers the client price.
        #[test]
        fn client_price_is_monotonic_in_markup(
            cents in 0i64..100_000_000i64,
            low in 0u32..50_000u32,
            delta in 0u32..50_000u32,
        ) {
            let cost = Decimal::new(cents, 2);
            let m1 = Markup::new(Decimal::new(i64::from(low), 2)).unwrap();
            let m2 = Markup::new(Decimal::new(i64::from(low + delta), 2)).unwrap();
            prop_assert!(client_price(cost, m1) <= client_price(cost, m2));
        }
    }
}
