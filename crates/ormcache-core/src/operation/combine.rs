//! Same-attribute narrowing and canonical simplification.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use ormcache_proto::Value;

use super::atomic::{AtomicOperation, OperatorKind, Parameter};
use super::Operation;

impl<E> Operation<E> {
    /// Narrow two operations on the same attribute into one.
    ///
    /// Returns `None` when no single-operation equivalent is known;
    /// `Some(Operation::None)` when the conjunction can never match.
    pub fn combined_and(&self, other: &Operation<E>) -> Option<Operation<E>> {
        match (self, other) {
            (Operation::Atomic(a), Operation::Atomic(b)) => combine_atomic(a, b),
            _ => None,
        }
    }

    /// Canonical form: ANDs and ORs flattened, same-attribute conjuncts
    /// narrowed, `All`/`None` folded away, single-element `in` rewritten to
    /// `=`. Matches exactly the same entities.
    pub fn simplify(&self) -> Operation<E> {
        match self {
            Operation::All | Operation::None => self.clone(),
            Operation::Atomic(op) => simplify_atomic(op),
            Operation::And(ops) => {
                let mut operands: Vec<Operation<E>> = Vec::with_capacity(ops.len());
                for op in ops.iter() {
                    match op.simplify() {
                        Operation::None => return Operation::None,
                        Operation::All => {}
                        Operation::And(inner) => operands.extend(inner.iter().cloned()),
                        op => operands.push(op),
                    }
                }
                while let Some((i, j, combined)) = find_combinable(&operands) {
                    if combined.is_none() {
                        return Operation::None;
                    }
                    operands.remove(j);
                    operands[i] = combined;
                }
                match operands.len() {
                    0 => Operation::All,
                    1 => operands.swap_remove(0),
                    _ => Operation::And(operands.into()),
                }
            }
            Operation::Or(ops) => {
                let mut operands: Vec<Operation<E>> = Vec::with_capacity(ops.len());
                for op in ops.iter() {
                    match op.simplify() {
                        Operation::All => return Operation::All,
                        Operation::None => {}
                        Operation::Or(inner) => {
                            for op in inner.iter() {
                                if !operands.contains(op) {
                                    operands.push(op.clone());
                                }
                            }
                        }
                        op => {
                            if !operands.contains(&op) {
                                operands.push(op);
                            }
                        }
                    }
                }
                match operands.len() {
                    0 => Operation::None,
                    1 => operands.swap_remove(0),
                    _ => Operation::Or(operands.into()),
                }
            }
        }
    }
}

fn find_combinable<E>(operands: &[Operation<E>]) -> Option<(usize, usize, Operation<E>)> {
    for i in 0..operands.len() {
        for j in i + 1..operands.len() {
            if let Some(combined) = operands[i].combined_and(&operands[j]) {
                return Some((i, j, combined));
            }
        }
    }
    None
}

fn simplify_atomic<E>(op: &Arc<AtomicOperation<E>>) -> Operation<E> {
    let set = match op.parameter() {
        Parameter::Set(set) => set,
        _ => return Operation::Atomic(op.clone()),
    };
    let narrowed_kind = match op.kind() {
        OperatorKind::In => OperatorKind::Eq,
        OperatorKind::NotIn => OperatorKind::NotEq,
        _ => return Operation::Atomic(op.clone()),
    };
    match (set.len(), op.kind()) {
        (0, OperatorKind::In) => Operation::None,
        (0, _) => Operation::atomic(op.with_parameter(OperatorKind::IsNotNull, Parameter::None)),
        (1, _) => match set.iter().next() {
            Some(v) => {
                Operation::atomic(op.with_parameter(narrowed_kind, Parameter::Single(v.clone())))
            }
            None => Operation::Atomic(op.clone()),
        },
        _ => Operation::Atomic(op.clone()),
    }
}

fn combine_atomic<E>(
    a: &Arc<AtomicOperation<E>>,
    b: &Arc<AtomicOperation<E>>,
) -> Option<Operation<E>> {
    use OperatorKind::*;

    if a.attribute() != b.attribute() {
        return None;
    }
    if a == b {
        return Some(Operation::Atomic(a.clone()));
    }
    match (a.kind(), b.kind()) {
        (FullText, _) | (_, FullText) => None,
        (IsNull, _) | (_, IsNull) => Some(Operation::None),
        (IsNotNull, _) => Some(Operation::Atomic(b.clone())),
        (_, IsNotNull) => Some(Operation::Atomic(a.clone())),
        (Eq, _) => narrow_literal(a, b),
        (_, Eq) => narrow_literal(b, a),
        (In, _) => narrow_set(a, b),
        (_, In) => narrow_set(b, a),
        (NotEq | NotIn, NotEq | NotIn) => Some(merge_exclusions(a, b)),
        (x, y) if x.is_range() && y.is_range() => combine_ranges(a, b),
        _ => None,
    }
}

fn narrow_literal<E>(
    eq: &Arc<AtomicOperation<E>>,
    other: &Arc<AtomicOperation<E>>,
) -> Option<Operation<E>> {
    let value = eq.parameter().single()?;
    match other.matches_value(value)? {
        true => Some(Operation::Atomic(eq.clone())),
        false => Some(Operation::None),
    }
}

fn narrow_set<E>(
    set_op: &Arc<AtomicOperation<E>>,
    other: &Arc<AtomicOperation<E>>,
) -> Option<Operation<E>> {
    let set = set_op.parameter().set()?;
    let mut kept = BTreeSet::new();
    for value in set.iter() {
        if other.matches_value(value)? {
            kept.insert(value.clone());
        }
    }
    if kept.len() == set.len() {
        return Some(Operation::Atomic(set_op.clone()));
    }
    let narrowed = match kept.len() {
        0 => return Some(Operation::None),
        1 => match kept.into_iter().next() {
            Some(v) => Parameter::Single(v),
            None => return Some(Operation::None),
        },
        _ => Parameter::Set(Arc::new(kept)),
    };
    let kind = match narrowed {
        Parameter::Single(_) => OperatorKind::Eq,
        _ => OperatorKind::In,
    };
    Some(Operation::atomic(set_op.with_parameter(kind, narrowed)))
}

fn merge_exclusions<E>(a: &Arc<AtomicOperation<E>>, b: &Arc<AtomicOperation<E>>) -> Operation<E> {
    let mut excluded: BTreeSet<Value> = BTreeSet::new();
    for op in [a, b] {
        if let Some(values) = op.exclusions() {
            excluded.extend(values.into_iter().cloned());
        }
    }
    if excluded.len() == 1 {
        if let Some(v) = excluded.iter().next() {
            return Operation::atomic(
                a.with_parameter(OperatorKind::NotEq, Parameter::Single(v.clone())),
            );
        }
    }
    Operation::atomic(a.with_parameter(OperatorKind::NotIn, Parameter::Set(Arc::new(excluded))))
}

fn is_lower(kind: OperatorKind) -> bool {
    matches!(kind, OperatorKind::GreaterThan | OperatorKind::GreaterThanEquals)
}

fn is_exclusive(kind: OperatorKind) -> bool {
    matches!(kind, OperatorKind::GreaterThan | OperatorKind::LessThan)
}

fn combine_ranges<E>(
    a: &Arc<AtomicOperation<E>>,
    b: &Arc<AtomicOperation<E>>,
) -> Option<Operation<E>> {
    let (av, bv) = (a.parameter().single()?, b.parameter().single()?);
    let order = av.compare(bv)?;

    match (is_lower(a.kind()), is_lower(b.kind())) {
        // two lower bounds: keep the larger, exclusive on a tie
        (true, true) => Some(Operation::Atomic(match order {
            Ordering::Greater => a.clone(),
            Ordering::Less => b.clone(),
            Ordering::Equal if is_exclusive(a.kind()) => a.clone(),
            Ordering::Equal => b.clone(),
        })),
        (false, false) => Some(Operation::Atomic(match order {
            Ordering::Less => a.clone(),
            Ordering::Greater => b.clone(),
            Ordering::Equal if is_exclusive(a.kind()) => a.clone(),
            Ordering::Equal => b.clone(),
        })),
        (lower_first, _) => {
            let (lower, upper) = if lower_first { (a, b) } else { (b, a) };
            let order = if lower_first { order } else { order.reverse() };
            match order {
                Ordering::Greater => Some(Operation::None),
                Ordering::Equal if is_exclusive(lower.kind()) || is_exclusive(upper.kind()) => {
                    Some(Operation::None)
                }
                Ordering::Equal => Some(Operation::atomic(
                    lower.with_parameter(OperatorKind::Eq, lower.parameter().clone()),
                )),
                Ordering::Less => None,
            }
        }
    }
}

/// An operation paired with its canonical form.
pub struct AnalyzedOperation<E> {
    original: Operation<E>,
    analyzed: Operation<E>,
}

impl<E> AnalyzedOperation<E> {
    pub fn new(original: Operation<E>) -> Self {
        let analyzed = original.simplify();
        Self { original, analyzed }
    }

    pub fn original(&self) -> &Operation<E> {
        &self.original
    }

    pub fn analyzed(&self) -> &Operation<E> {
        &self.analyzed
    }

    /// Whether simplification changed anything.
    pub fn is_analyzed_operation_different(&self) -> bool {
        self.original != self.analyzed
    }
}
