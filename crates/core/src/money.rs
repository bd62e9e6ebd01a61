//! Currency codes and currency-tagged amounts.
//!
//! Every monetary amount in the workflow is a [`Money`]: a decimal paired with
//! exactly one [`CurrencyCode`]. There is no implicit default currency.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// ISO-style three-letter currency code (e.g. `CAD`, `USD`).
///
/// Input is trimmed and upper-cased; anything other than three ASCII letters
/// is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl AsRef<str>) -> DomainResult<Self> {
        let code = code.as_ref().trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(
                "currency",
                format!("'{code}' is not a three-letter currency code"),
            ));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

impl ValueObject for CurrencyCode {}

/// A decimal amount in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: CurrencyCode,
}

impl Money {
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Fails with `CurrencyMismatch` unless `other` is in the same currency.
    pub fn ensure_same_currency(&self, other: &CurrencyCode) -> DomainResult<()> {
        if &self.currency != other {
            return Err(DomainError::currency_mismatch(&self.currency, other));
        }
        Ok(())
    }

    /// Add two amounts of the same currency.
    pub fn checked_add(&self, other: &Money) -> DomainResult<Money> {
        self.ensure_same_currency(&other.currency)?;
        Ok(Money::new(self.amount + other.amount, self.currency.clone()))
    }

    /// Subtract `other` (same currency) from `self`.
    pub fn checked_sub(&self, other: &Money) -> DomainResult<Money> {
        self.ensure_same_currency(&other.currency)?;
        Ok(Money::new(self.amount - other.amount, self.currency.clone()))
    }

    /// Same-currency comparison; `None` when the currencies differ.
    pub fn partial_cmp_amount(&self, other: &Money) -> Option<core::cmp::Ordering> {
        (self.currency == other.currency).then(|| self.amount.cmp(&other.amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

impl ValueObject for Money {}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cad() -> CurrencyCode {
        CurrencyCode::new("CAD").unwrap()
    }

    #[test]
    fn currency_code_is_normalised() {
        assert_eq!(CurrencyCode::new(" usd ").unwrap().as_str(), "USD");
        assert!(CurrencyCode::new("US").is_err());
        assert!(CurrencyCode::new("U$D").is_err());
    }

    #[test]
    fn currency_code_round_trips_through_serde_as_string() {
        let json = serde_json::to_string(&cad()).unwrap();
        assert_eq!(json, "\"CAD\"");
        let bad: Result<CurrencyCode, _> = serde_json::from_str("\"dollars\"");
        assert!(bad.is_err());
    }

    #[test]
    fn adding_different_currencies_is_rejected() {
        let a = Money::new(dec!(10), cad());
        let b = Money::new(dec!(5), CurrencyCode::new("USD").unwrap());
        let err = a.checked_add(&b).unwrap_err();
        assert!(matches!(err, DomainError::CurrencyMismatch { .. }));
        assert_eq!(a.partial_cmp_amount(&b), None);
    }

    #[test]
    fn same_currency_arithmetic() {
        let a = Money::new(dec!(10.25), cad());
        let b = Money::new(dec!(0.75), cad());
        assert_eq!(a.checked_add(&b).unwrap().amount(), dec!(11.00));
        assert_eq!(a.checked_sub(&b).unwrap().amount(), dec!(9.50));
        assert_eq!(a.to_string(), "10.25 CAD");
    }
}
