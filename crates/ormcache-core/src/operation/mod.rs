//! Operation algebra.
//!
//! An [`Operation`] is an immutable predicate tree over one entity type. It
//! doubles as the query cache key: equality and hashing are value based, and
//! AND/OR compare their operands as a multiset. [`Operation::shape_hash`]
//! ignores literals so that operations differing only in values land in the
//! same sub-query bucket.
//!
//! # Example
//!
//! ```ignore
//! let op = amount.greater_than(10.0).and(&state.eq("open"));
//! assert_eq!(op.matches(&order), Some(true));
//! ```

mod atomic;
mod combine;
mod compile;
mod pattern;
mod shape;

pub use atomic::{AtomicOperation, OperatorKind, Parameter};
pub use combine::AnalyzedOperation;
pub use pattern::{like_match, wildcard_match};
pub use shape::{ShapeMatchResult, SuperMatch};

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::attribute::Attribute;
use crate::update_count::UpdateCountHolder;

/// A predicate over entities of type `E`.
pub enum Operation<E> {
    /// Matches every entity.
    All,
    /// Matches nothing.
    None,
    /// A single-attribute predicate.
    Atomic(Arc<AtomicOperation<E>>),
    /// Conjunction of two or more operands.
    And(Arc<[Operation<E>]>),
    /// Disjunction of two or more operands.
    Or(Arc<[Operation<E>]>),
}

impl<E> Operation<E> {
    pub(crate) fn atomic(op: AtomicOperation<E>) -> Self {
        Operation::Atomic(Arc::new(op))
    }

    /// Conjunction, flattening nested ANDs. Operand order is kept.
    pub fn and(&self, other: &Operation<E>) -> Operation<E> {
        match (self, other) {
            (Operation::None, _) | (_, Operation::None) => Operation::None,
            (Operation::All, op) | (op, Operation::All) => op.clone(),
            _ => {
                let mut operands = Vec::new();
                self.push_flattened_and(&mut operands);
                other.push_flattened_and(&mut operands);
                Operation::And(operands.into())
            }
        }
    }

    /// Disjunction, flattening nested ORs. Operand order is kept.
    pub fn or(&self, other: &Operation<E>) -> Operation<E> {
        match (self, other) {
            (Operation::All, _) | (_, Operation::All) => Operation::All,
            (Operation::None, op) | (op, Operation::None) => op.clone(),
            _ => {
                let mut operands = Vec::new();
                self.push_flattened_or(&mut operands);
                other.push_flattened_or(&mut operands);
                Operation::Or(operands.into())
            }
        }
    }

    /// Conjunction of any number of operations; `All` when empty.
    pub fn and_all(ops: impl IntoIterator<Item = Operation<E>>) -> Operation<E> {
        ops.into_iter()
            .fold(Operation::All, |acc, op| acc.and(&op))
    }

    /// Disjunction of any number of operations; `None` when empty.
    pub fn or_all(ops: impl IntoIterator<Item = Operation<E>>) -> Operation<E> {
        ops.into_iter()
            .fold(Operation::None, |acc, op| acc.or(&op))
    }

    fn push_flattened_and(&self, out: &mut Vec<Operation<E>>) {
        match self {
            Operation::And(ops) => out.extend(ops.iter().cloned()),
            op => out.push(op.clone()),
        }
    }

    fn push_flattened_or(&self, out: &mut Vec<Operation<E>>) {
        match self {
            Operation::Or(ops) => out.extend(ops.iter().cloned()),
            op => out.push(op.clone()),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Operation::All)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Operation::None)
    }

    /// Operands of an AND/OR, empty otherwise.
    pub fn operands(&self) -> &[Operation<E>] {
        match self {
            Operation::And(ops) | Operation::Or(ops) => ops,
            _ => &[],
        }
    }

    /// Evaluate in memory.
    ///
    /// `None` means the answer depends on an operand that only the store can
    /// evaluate (full-text search).
    pub fn matches(&self, entity: &E) -> Option<bool> {
        match self {
            Operation::All => Some(true),
            Operation::None => Some(false),
            Operation::Atomic(op) => op.matches(entity),
            Operation::And(ops) => {
                let mut unknown = false;
                for op in ops.iter() {
                    match op.matches(entity) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                (!unknown).then_some(true)
            }
            Operation::Or(ops) => {
                let mut unknown = false;
                for op in ops.iter() {
                    match op.matches(entity) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                (!unknown).then_some(false)
            }
        }
    }

    /// Keep the entities this operation definitely matches.
    pub fn apply_to<'a>(&self, entities: impl IntoIterator<Item = &'a Arc<E>>) -> Vec<Arc<E>>
    where
        E: 'a,
    {
        entities
            .into_iter()
            .filter(|e| self.matches(e) == Some(true))
            .cloned()
            .collect()
    }

    /// Whether [`matches`](Self::matches) always yields an answer.
    pub fn can_filter_in_memory(&self) -> bool {
        !self.any_atomic(&|op| op.kind() == OperatorKind::FullText)
    }

    /// Whether results may be registered in the sub-query cache.
    pub fn is_shape_cachable(&self) -> bool {
        !self.any_atomic(&|op| op.kind().is_pattern() || op.kind() == OperatorKind::FullText)
    }

    fn any_atomic(&self, pred: &dyn Fn(&AtomicOperation<E>) -> bool) -> bool {
        match self {
            Operation::All | Operation::None => false,
            Operation::Atomic(op) => pred(op),
            Operation::And(ops) | Operation::Or(ops) => ops.iter().any(|op| op.any_atomic(pred)),
        }
    }

    /// Visit every atomic operand.
    pub fn for_each_atomic(&self, f: &mut dyn FnMut(&AtomicOperation<E>)) {
        match self {
            Operation::All | Operation::None => {}
            Operation::Atomic(op) => f(op),
            Operation::And(ops) | Operation::Or(ops) => {
                for op in ops.iter() {
                    op.for_each_atomic(f);
                }
            }
        }
    }

    /// Attributes referenced by the operation, deduplicated.
    pub fn attributes(&self) -> Vec<Attribute<E>> {
        let mut out: Vec<Attribute<E>> = Vec::new();
        self.for_each_atomic(&mut |op| {
            if !out.contains(op.attribute()) {
                out.push(op.attribute().clone());
            }
        });
        out
    }

    /// Add attribute update counters to `out`, skipping ones already present.
    pub fn collect_update_count_holders(&self, out: &mut Vec<Arc<UpdateCountHolder>>) {
        self.for_each_atomic(&mut |op| {
            if let Some(holder) = op.attribute().update_count_holder() {
                if !out.iter().any(|h| Arc::ptr_eq(h, holder)) {
                    out.push(holder.clone());
                }
            }
        });
    }

    /// Structural hash over attributes and operators, ignoring literals.
    pub fn shape_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        std::mem::discriminant(self).hash(&mut hasher);
        match self {
            Operation::All | Operation::None => {}
            Operation::Atomic(op) => {
                op.attribute().hash(&mut hasher);
                op.kind().hash(&mut hasher);
            }
            Operation::And(ops) | Operation::Or(ops) => {
                // order-insensitive
                ops.iter()
                    .map(Operation::shape_hash)
                    .fold(0u64, u64::wrapping_add)
                    .hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    fn value_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        std::mem::discriminant(self).hash(&mut hasher);
        match self {
            Operation::All | Operation::None => {}
            Operation::Atomic(op) => op.hash(&mut hasher),
            Operation::And(ops) | Operation::Or(ops) => {
                ops.iter()
                    .map(Operation::value_hash)
                    .fold(0u64, u64::wrapping_add)
                    .hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}

fn same_operands<E>(left: &[Operation<E>], right: &[Operation<E>]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut used = vec![false; right.len()];
    left.iter().all(|op| {
        let found = right
            .iter()
            .enumerate()
            .position(|(i, candidate)| !used[i] && candidate == op);
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

impl<E> Clone for Operation<E> {
    fn clone(&self) -> Self {
        match self {
            Operation::All => Operation::All,
            Operation::None => Operation::None,
            Operation::Atomic(op) => Operation::Atomic(op.clone()),
            Operation::And(ops) => Operation::And(ops.clone()),
            Operation::Or(ops) => Operation::Or(ops.clone()),
        }
    }
}

impl<E> PartialEq for Operation<E> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Operation::All, Operation::All) | (Operation::None, Operation::None) => true,
            (Operation::Atomic(a), Operation::Atomic(b)) => Arc::ptr_eq(a, b) || a == b,
            (Operation::And(a), Operation::And(b)) | (Operation::Or(a), Operation::Or(b)) => {
                Arc::ptr_eq(a, b) || same_operands(a, b)
            }
            _ => false,
        }
    }
}

impl<E> Eq for Operation<E> {}

impl<E> Hash for Operation<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.value_hash());
    }
}

fn write_joined<E>(f: &mut fmt::Formatter<'_>, ops: &[Operation<E>], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, op) in ops.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{op}")?;
    }
    f.write_str(")")
}

impl<E> fmt::Display for Operation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::All => f.write_str("all"),
            Operation::None => f.write_str("none"),
            Operation::Atomic(op) => write!(f, "{op}"),
            Operation::And(ops) => write_joined(f, ops, " & "),
            Operation::Or(ops) => write_joined(f, ops, " | "),
        }
    }
}

impl<E> fmt::Debug for Operation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operation({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::TypedAttribute;
    use std::collections::HashSet;

    struct Order {
        user_id: i32,
        amount: f64,
        note: Option<String>,
    }

    fn user_id() -> TypedAttribute<Order, i32> {
        TypedAttribute::new("Order", "userId", |o: &Order| Some(o.user_id))
    }

    fn amount() -> TypedAttribute<Order, f64> {
        TypedAttribute::new("Order", "amount", |o: &Order| Some(o.amount))
    }

    fn note() -> TypedAttribute<Order, String> {
        TypedAttribute::new("Order", "note", |o: &Order| o.note.clone())
    }

    #[test]
    fn test_value_equality_used_as_key() {
        let a = user_id().eq(5);
        let b = user_id().eq(5);
        assert_eq!(a, b);

        let mut keys = HashSet::new();
        keys.insert(a);
        assert!(keys.contains(&b));
        assert!(!keys.contains(&user_id().eq(6)));
    }

    #[test]
    fn test_and_is_order_insensitive() {
        let x = user_id().eq(5);
        let y = amount().greater_than(10.0);
        let xy = x.and(&y);
        let yx = y.and(&x);
        assert_eq!(xy, yx);

        let mut keys = HashSet::new();
        keys.insert(xy);
        assert!(keys.contains(&yx));
        assert_ne!(x.and(&y), x.or(&y));
    }

    #[test]
    fn test_and_flattens() {
        let a = user_id().eq(1);
        let b = amount().less_than(3.0);
        let c = note().is_null();
        let nested = a.and(&b).and(&c);
        let flat = a.and(&b.and(&c));
        assert_eq!(nested.operands().len(), 3);
        assert_eq!(nested, flat);

        let or = a.or(&b).or(&c);
        assert_eq!(or.operands().len(), 3);
    }

    #[test]
    fn test_identities() {
        let a = user_id().eq(1);
        assert_eq!(Operation::All.and(&a), a);
        assert_eq!(a.and(&Operation::None), Operation::None);
        assert_eq!(a.or(&Operation::All), Operation::All);
        assert_eq!(Operation::None.or(&a), a);
        assert_eq!(Operation::<Order>::and_all(vec![]), Operation::All);
        assert_eq!(Operation::<Order>::or_all(vec![]), Operation::None);
    }

    #[test]
    fn test_and_or_matches() {
        let order = Order {
            user_id: 3,
            amount: 12.0,
            note: None,
        };
        let op = user_id().eq(3).and(&amount().greater_than(10.0));
        assert_eq!(op.matches(&order), Some(true));
        let op = user_id().eq(4).or(&note().is_null());
        assert_eq!(op.matches(&order), Some(true));
        let op = user_id().eq(4).and(&note().full_text("x"));
        assert_eq!(op.matches(&order), Some(false));
        let op = user_id().eq(3).and(&note().full_text("x"));
        assert_eq!(op.matches(&order), None);
    }

    #[test]
    fn test_shape_hash_ignores_literals() {
        assert_eq!(user_id().eq(1).shape_hash(), user_id().eq(2).shape_hash());
        assert_ne!(user_id().eq(1).shape_hash(), user_id().not_eq(1).shape_hash());
        assert_eq!(
            user_id().in_([1, 2]).shape_hash(),
            user_id().in_([1, 2, 3]).shape_hash()
        );
        let ab = user_id().eq(1).and(&amount().less_than(5.0));
        let ba = amount().less_than(9.0).and(&user_id().eq(7));
        assert_eq!(ab.shape_hash(), ba.shape_hash());
    }

    #[test]
    fn test_cachability_flags() {
        assert!(user_id().eq(1).is_shape_cachable());
        assert!(!note().like("a%").is_shape_cachable());
        assert!(note().like("a%").can_filter_in_memory());
        assert!(!note().full_text("a").can_filter_in_memory());
        assert!(!user_id().eq(1).or(&note().full_text("a")).can_filter_in_memory());
    }

    #[test]
    fn test_display() {
        let op = user_id().eq(1).and(&note().is_not_null());
        assert_eq!(op.to_string(), "(Order.userId = 1 & Order.note is not null)");
    }
}
