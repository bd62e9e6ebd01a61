//! Human-readable document numbers (`RFQ-2026-0001`, `PO-2026-0042`).
//!
//! Counters are allocated per tenant, per kind, per calendar year by the
//! infrastructure layer; this module only formats and parses them.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Rfq,
    PurchaseOrder,
}

impl DocumentKind {
    pub fn prefix(self) -> &'static str {
        match self {
            DocumentKind::Rfq => "RFQ",
            DocumentKind::PurchaseOrder => "PO",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "RFQ" => Some(DocumentKind::Rfq),
            "PO" => Some(DocumentKind::PurchaseOrder),
            _ => None,
        }
    }
}

/// `<PREFIX>-<4-digit year>-<zero-padded counter>`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentNumber {
    kind: DocumentKind,
    year: i32,
    counter: u32,
}

impl DocumentNumber {
    pub fn new(kind: DocumentKind, year: i32, counter: u32) -> Result<Self, DomainError> {
        if !(1000..=9999).contains(&year) {
            return Err(DomainError::validation(
                "document_number.year",
                format!("{year} is not a four-digit year"),
            ));
        }
        if counter == 0 {
            return Err(DomainError::validation(
                "document_number.counter",
                "counters start at 1",
            ));
        }
        Ok(Self {
            kind,
            year,
            counter,
        })
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:04}-{:04}",
            self.kind.prefix(),
            self.year,
            self.counter
        )
    }
}

impl FromStr for DocumentNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::invalid_id(format!("DocumentNumber: '{s}'"));

        let mut parts = s.split('-');
        let (Some(prefix), Some(year), Some(counter), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let kind = DocumentKind::from_prefix(prefix).ok_or_else(invalid)?;
        if year.len() != 4 || counter.len() < 4 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let counter: u32 = counter.parse().map_err(|_| invalid())?;
        Self::new(kind, year, counter).map_err(|_| invalid())
    }
}

impl TryFrom<String> for DocumentNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentNumber> for String {
    fn from(value: DocumentNumber) -> Self {
        value.to_string()
    }
}

impl ValueObject for DocumentNumber {}
