//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// A value object is immutable and compared by its attribute values; two
/// `StockKey`s naming the same item and warehouse are the same key. To
/// "modify" one, construct a new value.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
