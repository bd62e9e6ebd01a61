//! Per-currency aggregation. Two amounts are only ever summed when their
//! currency codes are identical.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use quoteflow_core::{CurrencyCode, DomainError, DomainResult, Money};

/// Sum `amounts`, all of which must be in `currency`.
///
/// An empty input yields zero in `currency`; any foreign amount fails with
/// `CurrencyMismatch` rather than being summed.
pub fn aggregate_total<'a>(
    currency: &CurrencyCode,
    amounts: impl IntoIterator<Item = &'a Money>,
) -> DomainResult<Money> {
    let mut total = Money::zero(currency.clone());
    for amount in amounts {
        total = total.checked_add(amount)?;
    }
    Ok(total)
}

/// Running totals bucketed by currency code.
///
/// Used where a set legitimately spans currencies (e.g. comparing supplier
/// responses quoted in CAD and USD): each bucket is summed independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrencyTotals {
    totals: BTreeMap<CurrencyCode, Decimal>,
}

impl CurrencyTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, amount: &Money) {
        *self
            .totals
            .entry(amount.currency().clone())
            .or_insert(Decimal::ZERO) += amount.amount();
    }

    pub fn get(&self, currency: &CurrencyCode) -> Option<Money> {
        self.totals
            .get(currency)
            .map(|amount| Money::new(*amount, currency.clone()))
    }

    pub fn currencies(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.totals.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = Money> + '_ {
        self.totals
            .iter()
            .map(|(currency, amount)| Money::new(*amount, currency.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// The single total, when every amount shared one currency.
    ///
    /// Fails with `CurrencyMismatch` if more than one currency was seen.
    pub fn single(&self) -> DomainResult<Option<Money>> {
        let mut iter = self.totals.keys();
        match (iter.next(), iter.next()) {
            (None, _) => Ok(None),
            (Some(only), None) => Ok(self.get(only)),
            (Some(first), Some(second)) => Err(DomainError::currency_mismatch(first, second)),
        }
    }
}

impl<'a> FromIterator<&'a Money> for CurrencyTotals {
    fn from_iter<T: IntoIterator<Item = &'a Money>>(iter: T) -> Self {
        let mut totals = CurrencyTotals::new();
        for amount in iter {
            totals.add(amount);
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::line_amount;
    use crate::markup::{Markup, client_unit_price};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn code(c: &str) -> CurrencyCode {
        CurrencyCode::new(c).unwrap()
    }

    #[test]
    fn mixed_currency_aggregate_fails() {
        let amounts = [
            Money::new(dec!(10), code("CAD")),
            Money::new(dec!(10), code("USD")),
        ];
        let err = aggregate_total(&code("CAD"), &amounts).unwrap_err();
        assert_eq!(
            err,
            DomainError::CurrencyMismatch {
                expected: code("CAD"),
                found: code("USD"),
            }
        );
    }

    #[test]
    fn empty_aggregate_is_zero_in_requested_currency() {
        let total = aggregate_total(&code("USD"), std::iter::empty()).unwrap();
        assert_eq!(total, Money::zero(code("USD")));
    }

    #[test]
    fn currency_totals_keep_buckets_apart() {
        let amounts = [
            Money::new(dec!(10.50), code("CAD")),
            Money::new(dec!(4.25), code("USD")),
            Money::new(dec!(1.50), code("CAD")),
        ];
        let totals: CurrencyTotals = amounts.iter().collect();
        assert_eq!(totals.get(&code("CAD")).unwrap().amount(), dec!(12.00));
        assert_eq!(totals.get(&code("USD")).unwrap().amount(), dec!(4.25));
        assert!(totals.single().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// The aggregate equals the plain sum of individually rounded line totals,
        /// whatever order the lines arrive in.
        #[test]
        fn aggregate_equals_sum_of_rounded_lines(
            lines in prop::collection::vec((0i64..5_000_000i64, 1i64..50i64), 1..20),
            markup in 0u32..10_000u32,
        ) {
            let cad = code("CAD");
            let markup = Markup::new(Decimal::new(i64::from(markup), 2)).unwrap();
            let totals: Vec<Money> = lines
                .iter()
                .map(|(cents, qty)| {
                    let unit = client_unit_price(&Money::new(Decimal::new(*cents, 2), cad.clone()), markup);
                    line_amount(&unit, Decimal::from(*qty))
                })
                .collect();

            let expected: Decimal = totals.iter().map(Money::amount).sum();
            let forward = aggregate_total(&cad, &totals).unwrap();
            let backward = aggregate_total(&cad, totals.iter().rev()).unwrap();

            prop_assert_eq!(forward.amount(), expected);
            prop_assert_eq!(backward.amount(), expected);
        }

        /// Any foreign amount anywhere in the set makes aggregation fail.
        #[test]
        fn any_foreign_amount_fails(
            amounts in prop::collection::vec(0i64..1_000_000i64, 1..10),
            foreign_at in 0usize..10,
        ) {
            let cad = code("CAD");
            let mut set: Vec<Money> = amounts.iter().map(|a| Money::new(Decimal::new(*a, 2), cad.clone())).collect();
            let idx = foreign_at % set.len();
            set[idx] = Money::new(set[idx].amount(), code("EUR"));

            let is_mismatch = matches!(
                aggregate_total(&cad, &set),
                Err(DomainError::CurrencyMismatch { .. })
            );
            prop_assert!(is_mismatch);
        }
    }
}
