//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values:
/// `Money`, `CurrencyCode` and `DocumentNumber` are value objects, whereas an
/// RFQ or a purchase order is identified by its aggregate id.
///
/// To "modify" a value object, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
