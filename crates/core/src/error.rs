//! Domain error model.
//!
//! One enum carries every deterministic failure the procurement core can
//! return. Infrastructure failures (storage, publication) live in the infra
//! crate and wrap this type.

use thiserror::Error;

use crate::money::{CurrencyCode, Money};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-range input. `field` names the offending input.
    #[error("validation failed on `{field}`: {message}")]
    Validation { field: String, message: String },

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// Stale version / optimistic concurrency failure.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authorization failure at the domain boundary (unknown or revoked credential).
    #[error("unauthorized")]
    Unauthorized,

    /// The RFQ deadline behind a supplier credential has passed and no reopening
    /// override is active. Viewing remains possible; submitting is not.
    #[error("response deadline has passed")]
    ExpiredToken,

    /// A resubmission lost an optimistic-concurrency race against another
    /// resubmission for the same supplier response.
    #[error("duplicate submission: {0}")]
    DuplicateSubmission(String),

    /// Aggregation or comparison attempted across differing currency codes.
    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        found: CurrencyCode,
    },

    /// Purchase order creation attempted before payment covers the quote total.
    #[error("insufficient payment: {recorded} recorded, {required} required")]
    InsufficientPayment { required: Money, recorded: Money },

    /// A lifecycle transition that the transition table does not permit.
    #[error("{entity} in status {from} does not permit {to}")]
    StateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn currency_mismatch(expected: &CurrencyCode, found: &CurrencyCode) -> Self {
        Self::CurrencyMismatch {
            expected: expected.clone(),
            found: found.clone(),
        }
    }

    pub fn transition(
        entity: &'static str,
        from: impl core::fmt::Display,
        to: impl core::fmt::Display,
    ) -> Self {
        Self::StateTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Message suitable for showing to a studio user or supplier.
    ///
    /// Expired-token and insufficient-payment messages explain the blocking
    /// condition without echoing internal identifiers.
    pub fn user_message(&self) -> String {
        match self {
            DomainError::Validation { field, message } => {
                format!("Please correct `{field}`: {message}.")
            }
            DomainError::ExpiredToken => {
                "The response window for this request has closed. Ask the studio to reopen it \
                 if you still want to submit a quote."
                    .to_string()
            }
            DomainError::InsufficientPayment { required, recorded } => format!(
                "Payment received ({recorded}) does not yet cover the quote total ({required}). \
                 Record the remaining balance before placing the order."
            ),
            DomainError::StateTransition { entity, from, to } => format!(
                "This {entity} is currently {from}, which does not permit {to}. \
                 Check its current status and advance it one step at a time."
            ),
            DomainError::CurrencyMismatch { expected, found } => format!(
                "Amounts in {found} cannot be combined with amounts in {expected}. \
                 Use a single currency."
            ),
            DomainError::DuplicateSubmission(_) | DomainError::Conflict(_) => {
                "Someone else updated this record at the same time. Reload and try again."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}
