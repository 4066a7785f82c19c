//! Evaluate compiled filters against projected rows.

use std::cmp::Ordering;

use ormcache_proto::{FilterNode, FilterOp, StoreFilter, Value};

use crate::error::Error;
use crate::operation::{like_match, wildcard_match};

/// Evaluates a [`StoreFilter`] against a row of field values.
///
/// Null semantics follow in-memory operation evaluation: only `isNull` and
/// `isNotNull` look at nulls, every other predicate is false on a null or
/// missing field.
pub struct StoreFilterEvaluator;

impl StoreFilterEvaluator {
    /// Evaluate the whole filter.
    pub fn evaluate(filter: &StoreFilter, row: &[(String, Value)]) -> Result<bool, Error> {
        Self::evaluate_node(filter, filter.root_index(), row)
    }

    fn evaluate_node(
        filter: &StoreFilter,
        index: u32,
        row: &[(String, Value)],
    ) -> Result<bool, Error> {
        match filter.node(index)? {
            FilterNode::All => Ok(true),
            FilterNode::Predicate { field, op, values } => {
                let value = Self::get_field_value(row, field).unwrap_or(&Value::Null);
                Self::evaluate_predicate(*op, value, values)
            }
            FilterNode::And(children) => {
                for &child in children {
                    if !Self::evaluate_node(filter, child, row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterNode::Or(children) => {
                for &child in children {
                    if Self::evaluate_node(filter, child, row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn evaluate_predicate(op: FilterOp, value: &Value, params: &[Value]) -> Result<bool, Error> {
        match op {
            FilterOp::IsNull => return Ok(value.is_null()),
            FilterOp::IsNotNull => return Ok(!value.is_null()),
            _ if value.is_null() => return Ok(false),
            _ => {}
        }
        let matched = match op {
            FilterOp::In => params.iter().any(|p| value.loose_eq(p)),
            FilterOp::NotIn => !params.iter().any(|p| value.loose_eq(p)),
            FilterOp::Eq => Self::compare(value, params, Ordering::is_eq)?,
            FilterOp::Ne => !value.loose_eq(Self::single(params)?),
            FilterOp::Lt => Self::compare(value, params, Ordering::is_lt)?,
            FilterOp::Le => Self::compare(value, params, Ordering::is_le)?,
            FilterOp::Gt => Self::compare(value, params, Ordering::is_gt)?,
            FilterOp::Ge => Self::compare(value, params, Ordering::is_ge)?,
            FilterOp::Like => Self::text(value, params, like_match)?,
            FilterOp::NotLike => {
                value.as_str().is_some() && !Self::text(value, params, like_match)?
            }
            FilterOp::Contains => Self::text(value, params, |v, p| v.contains(p))?,
            FilterOp::StartsWith => Self::text(value, params, |v, p| v.starts_with(p))?,
            FilterOp::EndsWith => Self::text(value, params, |v, p| v.ends_with(p))?,
            FilterOp::Wildcard => Self::text(value, params, wildcard_match)?,
            FilterOp::FullText => Self::text(value, params, full_text_match)?,
            FilterOp::IsNull | FilterOp::IsNotNull => false,
        };
        Ok(matched)
    }

    fn get_field_value<'a>(row: &'a [(String, Value)], field: &str) -> Option<&'a Value> {
        row.iter().find(|(name, _)| name == field).map(|(_, v)| v)
    }

    fn single(params: &[Value]) -> Result<&Value, Error> {
        match params {
            [param] => Ok(param),
            _ => Err(Error::Inconsistency(format!(
                "expected one parameter, got {}",
                params.len()
            ))),
        }
    }

    fn compare(value: &Value, params: &[Value], f: fn(Ordering) -> bool) -> Result<bool, Error> {
        Ok(value.compare(Self::single(params)?).is_some_and(f))
    }

    fn text(
        value: &Value,
        params: &[Value],
        f: impl Fn(&str, &str) -> bool,
    ) -> Result<bool, Error> {
        let pattern = Self::single(params)?;
        Ok(match (value.as_str(), pattern.as_str()) {
            (Some(v), Some(p)) => f(v, p),
            _ => false,
        })
    }
}

/// Every whitespace-separated term of `query` appears as a word of `text`,
/// ignoring case.
pub fn full_text_match(text: &str, query: &str) -> bool {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    let mut terms = query.split_whitespace().peekable();
    if terms.peek().is_none() {
        return false;
    }
    terms.all(|term| {
        let term = term.to_lowercase();
        words.iter().any(|w| *w == term)
    })
}
