//! Compiled filter IR handed to a store.
//!
//! An operation tree is compiled into a flat arena of [`FilterNode`]s. And/Or
//! nodes reference their children by index instead of boxing them, which keeps
//! the type non-recursive for rkyv. Children are always pushed before their
//! parent, so every child index is smaller than the index of the node that
//! refers to it.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::error::Error;
use crate::value::Value;

/// Predicate operator understood by a store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize,
)]
pub enum FilterOp {
    /// Field equals value.
    Eq,
    /// Field not equals value.
    Ne,
    /// Field less than value.
    Lt,
    /// Field less than or equal to value.
    Le,
    /// Field greater than value.
    Gt,
    /// Field greater than or equal to value.
    Ge,
    /// Field is in a set of values.
    In,
    /// Field is not in a set of values.
    NotIn,
    /// Field is null.
    IsNull,
    /// Field is not null.
    IsNotNull,
    /// Field matches a SQL LIKE pattern.
    Like,
    /// Field does not match a SQL LIKE pattern.
    NotLike,
    /// Field contains a substring.
    Contains,
    /// Field starts with a prefix.
    StartsWith,
    /// Field ends with a suffix.
    EndsWith,
    /// Field matches a `*`/`?` wildcard pattern.
    Wildcard,
    /// Backend full-text search.
    FullText,
}

impl FilterOp {
    /// Operator name as it appears in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "notEq",
            FilterOp::Lt => "lessThan",
            FilterOp::Le => "lessThanEquals",
            FilterOp::Gt => "greaterThan",
            FilterOp::Ge => "greaterThanEquals",
            FilterOp::In => "in",
            FilterOp::NotIn => "notIn",
            FilterOp::IsNull => "isNull",
            FilterOp::IsNotNull => "isNotNull",
            FilterOp::Like => "like",
            FilterOp::NotLike => "notLike",
            FilterOp::Contains => "contains",
            FilterOp::StartsWith => "startsWith",
            FilterOp::EndsWith => "endsWith",
            FilterOp::Wildcard => "wildcard",
            FilterOp::FullText => "fullText",
        }
    }

    /// Number of parameter values the operator expects, `None` for sets.
    pub fn arity(&self) -> Option<usize> {
        match self {
            FilterOp::IsNull | FilterOp::IsNotNull => Some(0),
            FilterOp::In | FilterOp::NotIn => None,
            _ => Some(1),
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a compiled filter.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum FilterNode {
    /// Matches every row.
    All,
    /// A single field predicate.
    Predicate {
        field: String,
        op: FilterOp,
        values: Vec<Value>,
    },
    /// All children must match.
    And(Vec<u32>),
    /// At least one child must match.
    Or(Vec<u32>),
}

/// A compiled filter: an arena of nodes plus the index of the root.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct StoreFilter {
    nodes: Vec<FilterNode>,
    root: u32,
}

impl StoreFilter {
    /// A filter that matches every row.
    pub fn all() -> Self {
        Self {
            nodes: vec![FilterNode::All],
            root: 0,
        }
    }

    /// Rebuild a filter from raw parts, checking the arena invariant.
    pub fn from_parts(nodes: Vec<FilterNode>, root: u32) -> Result<Self, Error> {
        let filter = Self { nodes, root };
        filter.validate()?;
        Ok(filter)
    }

    /// The root node.
    pub fn root(&self) -> Result<&FilterNode, Error> {
        self.node(self.root)
    }

    /// Index of the root node.
    pub fn root_index(&self) -> u32 {
        self.root
    }

    /// Look up a node by index.
    pub fn node(&self, index: u32) -> Result<&FilterNode, Error> {
        self.nodes.get(index as usize).ok_or(Error::DanglingNode {
            index,
            len: self.nodes.len(),
        })
    }

    /// All nodes in push order.
    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    /// Whether this filter matches every row.
    pub fn is_all(&self) -> bool {
        matches!(self.root(), Ok(FilterNode::All))
    }

    /// Number of predicate leaves.
    pub fn predicate_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, FilterNode::Predicate { .. }))
            .count()
    }

    /// Check that every child reference points backwards into the arena.
    pub fn validate(&self) -> Result<(), Error> {
        if self.root as usize >= self.nodes.len() {
            return Err(Error::DanglingNode {
                index: self.root,
                len: self.nodes.len(),
            });
        }
        for (position, node) in self.nodes.iter().enumerate() {
            match node {
                FilterNode::And(children) | FilterNode::Or(children) => {
                    if children.is_empty() {
                        return Err(Error::InvalidFilter(format!(
                            "node {position} has no children"
                        )));
                    }
                    for &child in children {
                        if child as usize >= position {
                            return Err(Error::DanglingNode {
                                index: child,
                                len: position,
                            });
                        }
                    }
                }
                FilterNode::Predicate { op, values, field } => {
                    if let Some(arity) = op.arity() {
                        if values.len() != arity {
                            return Err(Error::InvalidFilter(format!(
                                "{field} {op} expects {arity} value(s), got {}",
                                values.len()
                            )));
                        }
                    }
                }
                FilterNode::All => {}
            }
        }
        Ok(())
    }

    /// Render the filter as JSON, for logging and explain output.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse a JSON filter and check the arena invariant.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let filter: StoreFilter =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        filter.validate()?;
        Ok(filter)
    }
}

/// Incremental builder for a [`StoreFilter`].
#[derive(Debug, Default)]
pub struct FilterBuilder {
    nodes: Vec<FilterNode>,
}

impl FilterBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a predicate leaf and return its index.
    pub fn predicate(&mut self, field: impl Into<String>, op: FilterOp, values: Vec<Value>) -> u32 {
        self.push(FilterNode::Predicate {
            field: field.into(),
            op,
            values,
        })
    }

    /// Push a node and return its index.
    pub fn push(&mut self, node: FilterNode) -> u32 {
        self.nodes.push(node);
        (self.nodes.len() - 1) as u32
    }

    /// Finish the filter with the given root.
    pub fn finish(self, root: u32) -> Result<StoreFilter, Error> {
        StoreFilter::from_parts(self.nodes, root)
    }
}
