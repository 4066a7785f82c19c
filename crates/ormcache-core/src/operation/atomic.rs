//! Single-attribute predicates.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ormcache_proto::{FilterOp, Value};

use super::pattern::{like_match, wildcard_match};
use super::Operation;
use crate::attribute::Attribute;
use crate::error::Error;

/// Operator of an [`AtomicOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Eq,
    NotEq,
    GreaterThan,
    GreaterThanEquals,
    LessThan,
    LessThanEquals,
    IsNull,
    IsNotNull,
    In,
    NotIn,
    Like,
    NotLike,
    Contains,
    StartsWith,
    EndsWith,
    Wildcard,
    FullText,
}

impl OperatorKind {
    /// The store operator this compiles to.
    pub fn filter_op(&self) -> FilterOp {
        match self {
            OperatorKind::Eq => FilterOp::Eq,
            OperatorKind::NotEq => FilterOp::Ne,
            OperatorKind::GreaterThan => FilterOp::Gt,
            OperatorKind::GreaterThanEquals => FilterOp::Ge,
            OperatorKind::LessThan => FilterOp::Lt,
            OperatorKind::LessThanEquals => FilterOp::Le,
            OperatorKind::IsNull => FilterOp::IsNull,
            OperatorKind::IsNotNull => FilterOp::IsNotNull,
            OperatorKind::In => FilterOp::In,
            OperatorKind::NotIn => FilterOp::NotIn,
            OperatorKind::Like => FilterOp::Like,
            OperatorKind::NotLike => FilterOp::NotLike,
            OperatorKind::Contains => FilterOp::Contains,
            OperatorKind::StartsWith => FilterOp::StartsWith,
            OperatorKind::EndsWith => FilterOp::EndsWith,
            OperatorKind::Wildcard => FilterOp::Wildcard,
            OperatorKind::FullText => FilterOp::FullText,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.filter_op().as_str()
    }

    /// `>`, `>=`, `<` or `<=`.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            OperatorKind::GreaterThan
                | OperatorKind::GreaterThanEquals
                | OperatorKind::LessThan
                | OperatorKind::LessThanEquals
        )
    }

    /// String pattern operators, which are evaluable in memory but never
    /// shape-cached.
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            OperatorKind::Like
                | OperatorKind::NotLike
                | OperatorKind::Contains
                | OperatorKind::StartsWith
                | OperatorKind::EndsWith
                | OperatorKind::Wildcard
        )
    }

    fn symbol(&self) -> &'static str {
        match self {
            OperatorKind::Eq => "=",
            OperatorKind::NotEq => "!=",
            OperatorKind::GreaterThan => ">",
            OperatorKind::GreaterThanEquals => ">=",
            OperatorKind::LessThan => "<",
            OperatorKind::LessThanEquals => "<=",
            OperatorKind::IsNull => "is null",
            OperatorKind::IsNotNull => "is not null",
            OperatorKind::In => "in",
            OperatorKind::NotIn => "not in",
            OperatorKind::Like => "like",
            OperatorKind::NotLike => "not like",
            OperatorKind::Contains => "contains",
            OperatorKind::StartsWith => "starts with",
            OperatorKind::EndsWith => "ends with",
            OperatorKind::Wildcard => "wildcard",
            OperatorKind::FullText => "matches",
        }
    }
}

/// Operator parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Parameter {
    None,
    Single(Value),
    Set(Arc<BTreeSet<Value>>),
}

impl Parameter {
    /// Parameter values in store order.
    pub fn values(&self) -> Vec<Value> {
        match self {
            Parameter::None => vec![],
            Parameter::Single(v) => vec![v.clone()],
            Parameter::Set(set) => set.iter().cloned().collect(),
        }
    }

    pub fn single(&self) -> Option<&Value> {
        match self {
            Parameter::Single(v) => Some(v),
            _ => None,
        }
    }

    pub fn set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Parameter::Set(set) => Some(set),
            _ => None,
        }
    }
}

/// A predicate over one attribute.
pub struct AtomicOperation<E> {
    attribute: Attribute<E>,
    kind: OperatorKind,
    parameter: Parameter,
}

impl<E> AtomicOperation<E> {
    /// Unchecked constructor; typed builders and [`Attribute::operation`]
    /// guarantee the parameter fits the operator.
    pub(crate) fn new(attribute: Attribute<E>, kind: OperatorKind, parameter: Parameter) -> Self {
        Self {
            attribute,
            kind,
            parameter,
        }
    }

    pub fn attribute(&self) -> &Attribute<E> {
        &self.attribute
    }

    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    pub fn parameter(&self) -> &Parameter {
        &self.parameter
    }

    /// Evaluate against an entity. `None` for full-text search.
    pub fn matches(&self, entity: &E) -> Option<bool> {
        self.matches_value(&self.attribute.value_of(entity))
    }

    /// Evaluate against an attribute value. `None` for full-text search.
    pub fn matches_value(&self, value: &Value) -> Option<bool> {
        let matched = match self.kind {
            OperatorKind::IsNull => value.is_null(),
            OperatorKind::IsNotNull => !value.is_null(),
            OperatorKind::FullText => return None,
            _ if value.is_null() => false,
            OperatorKind::Eq => self.compare_to(value) == Some(Ordering::Equal),
            // incomparable values such as NaN are never equal, so they pass
            OperatorKind::NotEq => self.parameter.single().is_some_and(|p| !value.loose_eq(p)),
            OperatorKind::GreaterThan => self.compare_to(value) == Some(Ordering::Greater),
            OperatorKind::GreaterThanEquals => {
                matches!(self.compare_to(value), Some(Ordering::Greater | Ordering::Equal))
            }
            OperatorKind::LessThan => self.compare_to(value) == Some(Ordering::Less),
            OperatorKind::LessThanEquals => {
                matches!(self.compare_to(value), Some(Ordering::Less | Ordering::Equal))
            }
            OperatorKind::In => self.parameter.set().is_some_and(|set| set_matches(set, value)),
            OperatorKind::NotIn => {
                self.parameter.set().is_some_and(|set| !set_matches(set, value))
            }
            OperatorKind::Like => self.text_match(value, like_match),
            OperatorKind::NotLike => {
                value.as_str().is_some() && !self.text_match(value, like_match)
            }
            OperatorKind::Contains => self.text_match(value, |v, p| v.contains(p)),
            OperatorKind::StartsWith => self.text_match(value, |v, p| v.starts_with(p)),
            OperatorKind::EndsWith => self.text_match(value, |v, p| v.ends_with(p)),
            OperatorKind::Wildcard => self.text_match(value, wildcard_match),
        };
        Some(matched)
    }

    /// Ordering of `value` relative to the single parameter.
    fn compare_to(&self, value: &Value) -> Option<Ordering> {
        self.parameter.single().and_then(|p| value.compare(p))
    }

    fn text_match(&self, value: &Value, f: impl Fn(&str, &str) -> bool) -> bool {
        match (value.as_str(), self.parameter.single().and_then(Value::as_str)) {
            (Some(v), Some(p)) => f(v, p),
            _ => false,
        }
    }

    /// Parameter literals when the operator selects exactly those values.
    pub(crate) fn literals(&self) -> Option<Vec<&Value>> {
        match (self.kind, &self.parameter) {
            (OperatorKind::Eq, Parameter::Single(v)) => Some(vec![v]),
            (OperatorKind::In, Parameter::Set(set)) => Some(set.iter().collect()),
            _ => None,
        }
    }

    /// Excluded values of `notEq` / `notIn`.
    pub(crate) fn exclusions(&self) -> Option<Vec<&Value>> {
        match (self.kind, &self.parameter) {
            (OperatorKind::NotEq, Parameter::Single(v)) => Some(vec![v]),
            (OperatorKind::NotIn, Parameter::Set(set)) => Some(set.iter().collect()),
            _ => None,
        }
    }

    /// Accepted values as an interval, for `=` and the range operators.
    pub(crate) fn interval(&self) -> Option<Interval<'_>> {
        let value = self.parameter.single()?;
        let bound = |inclusive| Some(Bound { value, inclusive });
        let interval = match self.kind {
            OperatorKind::Eq => Interval {
                lower: bound(true),
                upper: bound(true),
            },
            OperatorKind::GreaterThan => Interval {
                lower: bound(false),
                upper: None,
            },
            OperatorKind::GreaterThanEquals => Interval {
                lower: bound(true),
                upper: None,
            },
            OperatorKind::LessThan => Interval {
                lower: None,
                upper: bound(false),
            },
            OperatorKind::LessThanEquals => Interval {
                lower: None,
                upper: bound(true),
            },
            _ => return None,
        };
        Some(interval)
    }

    pub(crate) fn with_parameter(&self, kind: OperatorKind, parameter: Parameter) -> Self {
        Self::new(self.attribute.clone(), kind, parameter)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Bound<'a> {
    pub(crate) value: &'a Value,
    pub(crate) inclusive: bool,
}

/// A possibly unbounded interval of values.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Interval<'a> {
    pub(crate) lower: Option<Bound<'a>>,
    pub(crate) upper: Option<Bound<'a>>,
}

impl Interval<'_> {
    /// Whether every value in `inner` lies in `self`.
    pub(crate) fn contains_interval(&self, inner: &Interval<'_>) -> bool {
        let lower_ok = match (self.lower, inner.lower) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(outer), Some(inner)) => match inner.value.compare(outer.value) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => outer.inclusive || !inner.inclusive,
                _ => false,
            },
        };
        let upper_ok = match (self.upper, inner.upper) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(outer), Some(inner)) => match inner.value.compare(outer.value) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => outer.inclusive || !inner.inclusive,
                _ => false,
            },
        };
        lower_ok && upper_ok
    }
}

impl<E> Attribute<E> {
    /// Build an atomic operation from an operator and raw values.
    ///
    /// Range operators need an ordered attribute, pattern and full-text
    /// operators a string attribute. Parameters must be non-null values of
    /// the attribute's kind; narrower numbers widen.
    pub fn operation(&self, kind: OperatorKind, values: Vec<Value>) -> Result<Operation<E>, Error> {
        let reject =
            |reason: String| Error::unsupported(format!("{self} {}", kind.as_str()), reason);

        if kind.is_range() && !self.kind().is_ordered() {
            return Err(reject(format!("{} attributes have no ordering", self.kind())));
        }
        if (kind.is_pattern() || kind == OperatorKind::FullText) && !self.kind().is_string() {
            return Err(reject(format!("{} attributes cannot be pattern matched", self.kind())));
        }

        let mut coerced = Vec::with_capacity(values.len());
        for value in values {
            let described = value.to_string();
            match self.kind().coerce(value) {
                Some(v) => coerced.push(v),
                None => {
                    return Err(reject(format!(
                        "parameter {described} is not a {} value",
                        self.kind()
                    )))
                }
            }
        }

        let parameter = match kind.filter_op().arity() {
            Some(0) if coerced.is_empty() => Parameter::None,
            Some(1) if coerced.len() == 1 => match coerced.pop() {
                Some(v) => Parameter::Single(v),
                None => Parameter::None,
            },
            None => Parameter::Set(Arc::new(coerced.into_iter().collect())),
            Some(arity) => {
                return Err(reject(format!(
                    "expects {arity} parameter(s), got {}",
                    coerced.len()
                )))
            }
        };
        Ok(Operation::atomic(AtomicOperation::new(
            self.clone(),
            kind,
            parameter,
        )))
    }
}

impl<E> Clone for AtomicOperation<E> {
    fn clone(&self) -> Self {
        Self {
            attribute: self.attribute.clone(),
            kind: self.kind,
            parameter: self.parameter.clone(),
        }
    }
}

impl<E> PartialEq for AtomicOperation<E> {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.parameter == other.parameter
            && self.attribute == other.attribute
    }
}

impl<E> Eq for AtomicOperation<E> {}

impl<E> Hash for AtomicOperation<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.attribute.hash(state);
        self.kind.hash(state);
        self.parameter.hash(state);
    }
}

impl<E> fmt::Display for AtomicOperation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.attribute, self.kind.symbol())?;
        match &self.parameter {
            Parameter::None => Ok(()),
            Parameter::Single(v) => write!(f, " {v}"),
            Parameter::Set(set) => {
                f.write_str(" (")?;
                for (i, v) in set.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl<E> fmt::Debug for AtomicOperation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Set membership under the same equality as `eq`. The set's own ordering
/// tells NaN and -0.0 apart, comparison does not.
fn set_matches(set: &BTreeSet<Value>, value: &Value) -> bool {
    set.iter().any(|p| value.loose_eq(p))
}
