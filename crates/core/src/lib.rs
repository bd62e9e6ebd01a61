//! `quoteflow-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the aggregate contract, the domain error taxonomy, money and
//! human-readable document numbers.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod sequence;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use money::{CurrencyCode, Money};
pub use sequence::{DocumentKind, DocumentNumber};
pub use value_object::ValueObject;
