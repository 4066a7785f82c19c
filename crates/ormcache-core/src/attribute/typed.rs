//! Typed attribute wrappers and operator builders.

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use ormcache_proto::Value;

use super::{Attribute, AttributeKind};
use crate::operation::{AtomicOperation, OperatorKind, Operation, Parameter};
use crate::order_by::OrderBy;

/// Microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

/// Days since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(pub i32);

/// Variant name of an enum-typed attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumVariant(pub String);

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v.0)
    }
}

impl From<Date> for Value {
    fn from(v: Date) -> Self {
        Value::Date(v.0)
    }
}

impl From<EnumVariant> for Value {
    fn from(v: EnumVariant) -> Self {
        Value::Enum(v.0)
    }
}

impl From<&str> for EnumVariant {
    fn from(v: &str) -> Self {
        EnumVariant(v.to_string())
    }
}

/// Rust types that can back an attribute.
pub trait AttributeValue: Into<Value> + Clone + Send + Sync + 'static {
    /// The attribute kind this type maps to.
    const KIND: AttributeKind;
}

/// Attribute types with a total order, enabling range operators.
pub trait OrderedValue: AttributeValue {}

macro_rules! attribute_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(impl AttributeValue for $ty {
            const KIND: AttributeKind = AttributeKind::$kind;
        })*
    };
}

attribute_value! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
    Timestamp => Timestamp,
    Date => Date,
    EnumVariant => Enum,
}

impl OrderedValue for i32 {}
impl OrderedValue for i64 {}
impl OrderedValue for f32 {}
impl OrderedValue for f64 {}
impl OrderedValue for String {}
impl OrderedValue for Vec<u8> {}
impl OrderedValue for Timestamp {}
impl OrderedValue for Date {}

/// An attribute whose values are `T`.
pub struct TypedAttribute<E, T> {
    attribute: Attribute<E>,
    _marker: PhantomData<fn() -> T>,
}

impl<E, T: AttributeValue> TypedAttribute<E, T> {
    /// Create an attribute from an accessor; `None` reads as null.
    pub fn new(
        entity: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        accessor: impl Fn(&E) -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        let attribute = Attribute::new(entity, name, T::KIND, move |e: &E| {
            accessor(e).map(Into::into).unwrap_or(Value::Null)
        });
        Self::from_attribute(attribute)
    }

    pub(crate) fn from_attribute(attribute: Attribute<E>) -> Self {
        Self {
            attribute,
            _marker: PhantomData,
        }
    }

    /// The untyped attribute.
    pub fn attribute(&self) -> &Attribute<E> {
        &self.attribute
    }

    fn single(&self, kind: OperatorKind, value: T) -> Operation<E> {
        Operation::atomic(AtomicOperation::new(
            self.attribute.clone(),
            kind,
            Parameter::Single(value.into()),
        ))
    }

    fn set(&self, kind: OperatorKind, values: impl IntoIterator<Item = T>) -> Operation<E> {
        let values: BTreeSet<Value> = values.into_iter().map(Into::into).collect();
        Operation::atomic(AtomicOperation::new(
            self.attribute.clone(),
            kind,
            Parameter::Set(Arc::new(values)),
        ))
    }

    fn unary(&self, kind: OperatorKind) -> Operation<E> {
        Operation::atomic(AtomicOperation::new(
            self.attribute.clone(),
            kind,
            Parameter::None,
        ))
    }

    /// `attribute = value`
    pub fn eq(&self, value: impl Into<T>) -> Operation<E> {
        self.single(OperatorKind::Eq, value.into())
    }

    /// `attribute <> value`; null never matches.
    pub fn not_eq(&self, value: impl Into<T>) -> Operation<E> {
        self.single(OperatorKind::NotEq, value.into())
    }

    /// `attribute IN (values)`
    pub fn in_(&self, values: impl IntoIterator<Item = T>) -> Operation<E> {
        self.set(OperatorKind::In, values)
    }

    /// `attribute NOT IN (values)`; null never matches.
    pub fn not_in(&self, values: impl IntoIterator<Item = T>) -> Operation<E> {
        self.set(OperatorKind::NotIn, values)
    }

    /// `attribute IS NULL`
    pub fn is_null(&self) -> Operation<E> {
        self.unary(OperatorKind::IsNull)
    }

    /// `attribute IS NOT NULL`
    pub fn is_not_null(&self) -> Operation<E> {
        self.unary(OperatorKind::IsNotNull)
    }

    /// Ascending ordering on this attribute, nulls first.
    pub fn ascending_order_by(&self) -> OrderBy<E> {
        OrderBy::ascending(self.attribute.clone())
    }

    /// Descending ordering on this attribute, nulls last.
    pub fn descending_order_by(&self) -> OrderBy<E> {
        OrderBy::descending(self.attribute.clone())
    }
}

impl<E, T: OrderedValue> TypedAttribute<E, T> {
    /// `attribute > value`
    pub fn greater_than(&self, value: impl Into<T>) -> Operation<E> {
        self.single(OperatorKind::GreaterThan, value.into())
    }

    /// `attribute >= value`
    pub fn greater_than_equals(&self, value: impl Into<T>) -> Operation<E> {
        self.single(OperatorKind::GreaterThanEquals, value.into())
    }

    /// `attribute < value`
    pub fn less_than(&self, value: impl Into<T>) -> Operation<E> {
        self.single(OperatorKind::LessThan, value.into())
    }

    /// `attribute <= value`
    pub fn less_than_equals(&self, value: impl Into<T>) -> Operation<E> {
        self.single(OperatorKind::LessThanEquals, value.into())
    }
}

impl<E> TypedAttribute<E, String> {
    fn pattern(&self, kind: OperatorKind, pattern: impl Into<String>) -> Operation<E> {
        self.single(kind, pattern.into())
    }

    /// SQL `LIKE` with `%`, `_` and `\` escapes.
    pub fn like(&self, pattern: impl Into<String>) -> Operation<E> {
        self.pattern(OperatorKind::Like, pattern)
    }

    /// SQL `NOT LIKE`; null never matches.
    pub fn not_like(&self, pattern: impl Into<String>) -> Operation<E> {
        self.pattern(OperatorKind::NotLike, pattern)
    }

    pub fn contains(&self, fragment: impl Into<String>) -> Operation<E> {
        self.pattern(OperatorKind::Contains, fragment)
    }

    pub fn starts_with(&self, prefix: impl Into<String>) -> Operation<E> {
        self.pattern(OperatorKind::StartsWith, prefix)
    }

    pub fn ends_with(&self, suffix: impl Into<String>) -> Operation<E> {
        self.pattern(OperatorKind::EndsWith, suffix)
    }

    /// Glob match with `*` and `?`.
    pub fn wildcard(&self, pattern: impl Into<String>) -> Operation<E> {
        self.pattern(OperatorKind::Wildcard, pattern)
    }

    /// Backend full-text search. Never evaluated in memory.
    pub fn full_text(&self, query: impl Into<String>) -> Operation<E> {
        self.pattern(OperatorKind::FullText, query)
    }
}

impl<E, T> Clone for TypedAttribute<E, T> {
    fn clone(&self) -> Self {
        Self {
            attribute: self.attribute.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E, T> fmt::Debug for TypedAttribute<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.attribute, f)
    }
}

impl<E, T> From<TypedAttribute<E, T>> for Attribute<E> {
    fn from(typed: TypedAttribute<E, T>) -> Self {
        typed.attribute
    }
}

impl<E, T> From<&TypedAttribute<E, T>> for Attribute<E> {
    fn from(typed: &TypedAttribute<E, T>) -> Self {
        typed.attribute.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Order {
        amount: f64,
        placed: Date,
        state: EnumVariant,
    }

    #[test]
    fn test_typed_accessor_maps_values() {
        let amount = TypedAttribute::<Order, f64>::new("Order", "amount", |o| Some(o.amount));
        let placed = TypedAttribute::<Order, Date>::new("Order", "placed", |o| Some(o.placed));
        let state =
            TypedAttribute::<Order, EnumVariant>::new("Order", "state", |o| Some(o.state.clone()));
        let order = Order {
            amount: 12.5,
            placed: Date(19_000),
            state: "open".into(),
        };

        assert_eq!(amount.attribute().value_of(&order), Value::Float64(12.5));
        assert_eq!(placed.attribute().value_of(&order), Value::Date(19_000));
        assert_eq!(state.attribute().value_of(&order), Value::Enum("open".into()));
        assert_eq!(state.attribute().kind(), AttributeKind::Enum);
    }

    #[test]
    fn test_builders_match() {
        let amount = TypedAttribute::<Order, f64>::new("Order", "amount", |o| Some(o.amount));
        let order = Order {
            amount: 12.5,
            placed: Date(0),
            state: "open".into(),
        };

        assert_eq!(amount.greater_than(10.0).matches(&order), Some(true));
        assert_eq!(amount.less_than_equals(12.0).matches(&order), Some(false));
        assert_eq!(amount.in_([1.0, 12.5]).matches(&order), Some(true));
        assert_eq!(amount.is_null().matches(&order), Some(false));
    }
}
