//! Entity attributes.
//!
//! An [`Attribute`] names one field of an entity type and knows how to read
//! it from an entity value. [`TypedAttribute`] wraps it with typed operator
//! builders so range and pattern operators only exist where they make sense.

mod typed;

pub use typed::{AttributeValue, Date, EnumVariant, OrderedValue, Timestamp, TypedAttribute};

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ormcache_proto::Value;

use crate::error::Error;
use crate::update_count::UpdateCountHolder;

/// Semantic type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bytes,
    Timestamp,
    Date,
    Enum,
}

impl AttributeKind {
    /// Type name for logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::Bool => "bool",
            AttributeKind::Int32 => "int32",
            AttributeKind::Int64 => "int64",
            AttributeKind::Float32 => "float32",
            AttributeKind::Float64 => "float64",
            AttributeKind::String => "string",
            AttributeKind::Bytes => "bytes",
            AttributeKind::Timestamp => "timestamp",
            AttributeKind::Date => "date",
            AttributeKind::Enum => "enum",
        }
    }

    /// Whether range operators apply.
    pub fn is_ordered(&self) -> bool {
        !matches!(self, AttributeKind::Bool | AttributeKind::Enum)
    }

    /// Whether pattern operators apply.
    pub fn is_string(&self) -> bool {
        matches!(self, AttributeKind::String)
    }

    /// Convert a non-null parameter to this type's value variant.
    ///
    /// Narrower integers and floats widen; anything else must already match.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (AttributeKind::Int64, Value::Int32(v)) => Some(Value::Int64(v as i64)),
            (AttributeKind::Float64, Value::Float32(v)) => Some(Value::Float64(v as f64)),
            (kind, value) => {
                let accepted = matches!(
                    (kind, &value),
                    (AttributeKind::Bool, Value::Bool(_))
                        | (AttributeKind::Int32, Value::Int32(_))
                        | (AttributeKind::Int64, Value::Int64(_))
                        | (AttributeKind::Float32, Value::Float32(_))
                        | (AttributeKind::Float64, Value::Float64(_))
                        | (AttributeKind::String, Value::String(_))
                        | (AttributeKind::Bytes, Value::Bytes(_))
                        | (AttributeKind::Timestamp, Value::Timestamp(_))
                        | (AttributeKind::Date, Value::Date(_))
                        | (AttributeKind::Enum, Value::Enum(_))
                );
                accepted.then_some(value)
            }
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Accessor<E> = Arc<dyn Fn(&E) -> Value + Send + Sync>;

struct AttributeInner<E> {
    entity: Arc<str>,
    name: Arc<str>,
    kind: AttributeKind,
    accessor: Accessor<E>,
    update_count_holder: Option<Arc<UpdateCountHolder>>,
}

/// An untyped attribute of entity type `E`.
///
/// Cloning is cheap. Equality and hashing use the entity name, attribute
/// name and kind, never the accessor.
pub struct Attribute<E> {
    inner: Arc<AttributeInner<E>>,
}

impl<E> Attribute<E> {
    /// Create an attribute from an accessor returning [`Value::Null`] for
    /// missing values.
    ///
    /// The accessor must return values of `kind` (or null); the typed
    /// constructors on [`TypedAttribute`] guarantee this.
    pub fn new(
        entity: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        kind: AttributeKind,
        accessor: impl Fn(&E) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(AttributeInner {
                entity: entity.into(),
                name: name.into(),
                kind,
                accessor: Arc::new(accessor),
                update_count_holder: None,
            }),
        }
    }

    /// Return a copy that carries its own update counter.
    ///
    /// Queries using the attribute then also go stale when that counter
    /// moves, which is how relationship attributes track the related type.
    pub fn with_update_count_holder(&self, holder: Arc<UpdateCountHolder>) -> Self {
        Self {
            inner: Arc::new(AttributeInner {
                entity: self.inner.entity.clone(),
                name: self.inner.name.clone(),
                kind: self.inner.kind,
                accessor: self.inner.accessor.clone(),
                update_count_holder: Some(holder),
            }),
        }
    }

    /// Owning entity type.
    pub fn entity(&self) -> &str {
        &self.inner.entity
    }

    /// Attribute name, which is also the store field name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Semantic type.
    pub fn kind(&self) -> AttributeKind {
        self.inner.kind
    }

    /// Attribute-specific update counter, if any.
    pub fn update_count_holder(&self) -> Option<&Arc<UpdateCountHolder>> {
        self.inner.update_count_holder.as_ref()
    }

    /// Read the attribute from an entity.
    pub fn value_of(&self, entity: &E) -> Value {
        (self.inner.accessor)(entity)
    }

    /// Whether the attribute is null on the entity.
    pub fn is_null(&self, entity: &E) -> bool {
        self.value_of(entity).is_null()
    }

    /// Compare two entities by this attribute, non-null values ascending.
    ///
    /// Null placement is left to the caller; here null sorts first.
    pub fn compare(&self, left: &E, right: &E) -> Ordering {
        let (l, r) = (self.value_of(left), self.value_of(right));
        match (l.is_null(), r.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => l.compare(&r).unwrap_or_else(|| l.cmp(&r)),
        }
    }

    /// View as a typed attribute, checking the kind.
    pub fn typed<T: AttributeValue>(&self) -> Result<TypedAttribute<E, T>, Error> {
        if self.kind() != T::KIND {
            return Err(Error::unsupported(
                self.to_string(),
                format!("attribute is {}, not {}", self.kind(), T::KIND),
            ));
        }
        Ok(TypedAttribute::from_attribute(self.clone()))
    }
}

impl<E> Clone for Attribute<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> PartialEq for Attribute<E> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.kind == other.inner.kind
                && self.inner.name == other.inner.name
                && self.inner.entity == other.inner.entity)
    }
}

impl<E> Eq for Attribute<E> {}

impl<E> Hash for Attribute<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.entity.hash(state);
        self.inner.name.hash(state);
        self.inner.kind.hash(state);
    }
}

impl<E> fmt::Display for Attribute<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.inner.entity, self.inner.name)
    }
}

impl<E> fmt::Debug for Attribute<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attribute({}: {})", self, self.inner.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Order {
        id: i32,
        note: Option<String>,
    }

    fn note() -> Attribute<Order> {
        Attribute::new("Order", "note", AttributeKind::String, |o: &Order| {
            o.note.clone().into()
        })
    }

    #[test]
    fn test_identity_ignores_accessor() {
        let a = note();
        let b = Attribute::new("Order", "note", AttributeKind::String, |_: &Order| Value::Null);
        assert_eq!(a, b);

        let other = Attribute::new("Order", "note", AttributeKind::Int32, |_: &Order| Value::Null);
        assert_ne!(a, other);
    }

    #[test]
    fn test_value_and_null() {
        let attr = note();
        let with = Order { id: 1, note: Some("rush".into()) };
        let without = Order { id: 2, note: None };
        assert_eq!(attr.value_of(&with), Value::String("rush".into()));
        assert!(attr.is_null(&without));
        assert_eq!(attr.compare(&without, &with), Ordering::Less);
        assert_eq!(with.id + without.id, 3);
    }

    #[test]
    fn test_typed_checks_kind() {
        let attr = note();
        assert!(attr.typed::<String>().is_ok());
        assert!(matches!(attr.typed::<i32>(), Err(Error::Unsupported { .. })));
    }

    #[test]
    fn test_holder_copy_keeps_identity() {
        let attr = note();
        let holder = Arc::new(UpdateCountHolder::new("Order.note"));
        let tracked = attr.with_update_count_holder(holder.clone());
        assert_eq!(attr, tracked);
        assert!(attr.update_count_holder().is_none());
        assert!(Arc::ptr_eq(tracked.update_count_holder().unwrap(), &holder));
    }

    #[test]
    fn test_kind_coerce() {
        assert_eq!(AttributeKind::Int64.coerce(Value::Int32(1)), Some(Value::Int64(1)));
        assert_eq!(AttributeKind::Int32.coerce(Value::Int64(1)), None);
        assert_eq!(AttributeKind::String.coerce(Value::Null), None);
        assert!(AttributeKind::Date.is_ordered());
        assert!(!AttributeKind::Enum.is_ordered());
    }
}
