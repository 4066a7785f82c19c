//! Shape matching: deciding whether a cached result can answer a new query.
//!
//! `new.shape_match(cached)` asks whether every entity matching `new` is in
//! the result of some `lookup` operation, either the cached operation itself
//! or one that must be found by value in the query cache. The caller then
//! applies `filter` in memory to the lookup result.

use super::atomic::{AtomicOperation, OperatorKind};
use super::Operation;

/// A proof that `new` can be answered from the result of `lookup`.
pub struct SuperMatch<E> {
    pub existing: Operation<E>,
    pub new: Operation<E>,
    /// Superset of `new`; equal to `existing` or to be found by value.
    pub lookup: Operation<E>,
    /// Applied in memory to the lookup result.
    pub filter: Operation<E>,
}

impl<E> SuperMatch<E> {
    /// Whether the cached operation itself is the lookup.
    pub fn lookup_is_existing(&self) -> bool {
        self.lookup == self.existing
    }
}

/// Outcome of [`Operation::shape_match`].
pub enum ShapeMatchResult<E> {
    /// Same shape, different literals: only an exact lookup can help.
    ExactMatch,
    SuperMatch(SuperMatch<E>),
    NoMatch,
    /// A new operand cannot be filtered in memory and is not present
    /// verbatim in the cached operation.
    NoMatchRequiresExact,
}

impl<E> ShapeMatchResult<E> {
    pub fn is_super_match(&self) -> bool {
        matches!(self, ShapeMatchResult::SuperMatch(_))
    }

    pub fn is_exact_match(&self) -> bool {
        matches!(self, ShapeMatchResult::ExactMatch)
    }

    pub fn into_super_match(self) -> Option<SuperMatch<E>> {
        match self {
            ShapeMatchResult::SuperMatch(m) => Some(m),
            _ => None,
        }
    }
}

impl<E> std::fmt::Debug for ShapeMatchResult<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShapeMatchResult::ExactMatch => f.write_str("ExactMatch"),
            ShapeMatchResult::SuperMatch(m) => f
                .debug_struct("SuperMatch")
                .field("existing", &m.existing)
                .field("new", &m.new)
                .field("lookup", &m.lookup)
                .field("filter", &m.filter)
                .finish(),
            ShapeMatchResult::NoMatch => f.write_str("NoMatch"),
            ShapeMatchResult::NoMatchRequiresExact => f.write_str("NoMatchRequiresExact"),
        }
    }
}

impl<E> Operation<E> {
    /// Match this (new) operation against a cached one.
    pub fn shape_match(&self, existing: &Operation<E>) -> ShapeMatchResult<E> {
        if self == existing {
            return ShapeMatchResult::ExactMatch;
        }
        match (self, existing) {
            (_, Operation::None) | (Operation::None, _) | (Operation::All, _) => {
                ShapeMatchResult::NoMatch
            }
            (_, Operation::All) => self.filtered_super_match(existing),
            (Operation::Atomic(new), Operation::Atomic(cached)) => {
                match_atomic(new, cached, self, existing)
            }
            (Operation::Or(disjuncts), _) => {
                if disjuncts.iter().all(|d| d.is_provable_subset_of(existing)) {
                    self.filtered_super_match(existing)
                } else {
                    ShapeMatchResult::NoMatch
                }
            }
            (_, Operation::Or(cached)) => {
                if cached.iter().any(|d| self.is_provable_subset_of(d)) {
                    self.filtered_super_match(existing)
                } else {
                    ShapeMatchResult::NoMatch
                }
            }
            (Operation::Atomic(_), Operation::And(cached)) => self.match_reverse(existing, cached),
            (Operation::And(new), Operation::And(cached)) => self.match_and(existing, new, cached),
            (Operation::And(new), Operation::Atomic(_)) => self.match_one_at_a_time(existing, new),
        }
    }

    /// Whether `self` selects a subset of `other`'s result without any
    /// further lookup.
    fn is_provable_subset_of(&self, other: &Operation<E>) -> bool {
        match self.shape_match(other) {
            ShapeMatchResult::ExactMatch => self == other,
            ShapeMatchResult::SuperMatch(m) => m.lookup == *other,
            _ => false,
        }
    }

    /// Super-match with the cached operation as lookup and `self` as filter.
    fn filtered_super_match(&self, existing: &Operation<E>) -> ShapeMatchResult<E> {
        if !self.can_filter_in_memory() {
            return ShapeMatchResult::NoMatchRequiresExact;
        }
        ShapeMatchResult::SuperMatch(SuperMatch {
            existing: existing.clone(),
            new: self.clone(),
            lookup: existing.clone(),
            filter: self.clone(),
        })
    }

    /// New atomic against a cached AND: every cached operand must hold.
    fn match_reverse(
        &self,
        existing: &Operation<E>,
        cached: &[Operation<E>],
    ) -> ShapeMatchResult<E> {
        let mut lookup = Vec::with_capacity(cached.len());
        for operand in cached {
            match self.shape_match(operand) {
                ShapeMatchResult::ExactMatch => lookup.push(self.clone()),
                ShapeMatchResult::SuperMatch(m) => lookup.push(m.lookup),
                _ => return ShapeMatchResult::NoMatch,
            }
        }
        ShapeMatchResult::SuperMatch(SuperMatch {
            existing: existing.clone(),
            new: self.clone(),
            lookup: and_of(lookup),
            filter: self.clone(),
        })
    }

    /// New AND against a cached AND.
    ///
    /// Each new operand is matched against the cached operands in order.
    /// Operands that cannot be filtered in memory must appear verbatim.
    /// Every cached operand must be covered by some new operand.
    fn match_and(
        &self,
        existing: &Operation<E>,
        new: &[Operation<E>],
        cached: &[Operation<E>],
    ) -> ShapeMatchResult<E> {
        let mut matched = vec![false; cached.len()];
        let mut lookup = Vec::new();
        let mut filter = Vec::new();

        for operand in new {
            if !operand.can_filter_in_memory() {
                match cached.iter().position(|c| c == operand) {
                    Some(slot) => {
                        matched[slot] = true;
                        lookup.push(operand.clone());
                    }
                    None => return ShapeMatchResult::NoMatchRequiresExact,
                }
                continue;
            }
            let mut placed = false;
            for (slot, candidate) in cached.iter().enumerate() {
                match operand.shape_match(candidate) {
                    ShapeMatchResult::ExactMatch => {
                        lookup.push(operand.clone());
                        matched[slot] = true;
                        placed = true;
                    }
                    ShapeMatchResult::SuperMatch(m) => {
                        lookup.push(m.lookup);
                        filter.push(operand.clone());
                        matched[slot] = true;
                        placed = true;
                    }
                    _ => continue,
                }
                break;
            }
            if !placed {
                filter.push(operand.clone());
            }
        }

        if lookup.is_empty() || matched.iter().any(|m| !m) {
            return ShapeMatchResult::NoMatch;
        }
        ShapeMatchResult::SuperMatch(SuperMatch {
            existing: existing.clone(),
            new: self.clone(),
            lookup: and_of(lookup),
            filter: and_of(filter),
        })
    }

    /// New AND against a cached atomic: one operand matching suffices.
    fn match_one_at_a_time(
        &self,
        existing: &Operation<E>,
        new: &[Operation<E>],
    ) -> ShapeMatchResult<E> {
        for (i, operand) in new.iter().enumerate() {
            match operand.shape_match(existing) {
                ShapeMatchResult::ExactMatch => {
                    let rest: Vec<Operation<E>> = new
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, op)| op.clone())
                        .collect();
                    if rest.iter().any(|op| !op.can_filter_in_memory()) {
                        return ShapeMatchResult::NoMatchRequiresExact;
                    }
                    return ShapeMatchResult::SuperMatch(SuperMatch {
                        existing: existing.clone(),
                        new: self.clone(),
                        lookup: operand.clone(),
                        filter: and_of(rest),
                    });
                }
                ShapeMatchResult::SuperMatch(m) => {
                    if !self.can_filter_in_memory() {
                        return ShapeMatchResult::NoMatchRequiresExact;
                    }
                    return ShapeMatchResult::SuperMatch(SuperMatch {
                        existing: existing.clone(),
                        new: self.clone(),
                        lookup: m.lookup,
                        filter: self.clone(),
                    });
                }
                _ => continue,
            }
        }
        ShapeMatchResult::NoMatch
    }
}

/// Conjunction without simplification, so the result still compares equal to
/// a cached AND built from the same operands.
fn and_of<E>(mut ops: Vec<Operation<E>>) -> Operation<E> {
    match ops.len() {
        0 => Operation::All,
        1 => ops.swap_remove(0),
        _ => Operation::And(ops.into()),
    }
}

fn match_atomic<E>(
    new: &AtomicOperation<E>,
    cached: &AtomicOperation<E>,
    new_op: &Operation<E>,
    cached_op: &Operation<E>,
) -> ShapeMatchResult<E> {
    use OperatorKind::*;

    if new.attribute() != cached.attribute() {
        return ShapeMatchResult::NoMatch;
    }
    let superset = || {
        ShapeMatchResult::SuperMatch(SuperMatch {
            existing: cached_op.clone(),
            new: new_op.clone(),
            lookup: cached_op.clone(),
            filter: new_op.clone(),
        })
    };
    let when = |holds: bool| if holds { superset() } else { ShapeMatchResult::NoMatch };

    match (new.kind(), cached.kind()) {
        (Eq, Eq) => ShapeMatchResult::ExactMatch,
        (FullText, _) | (_, FullText) => ShapeMatchResult::NoMatch,
        (IsNull, _) | (_, IsNull) => ShapeMatchResult::NoMatch,
        (kind, _) if kind.is_pattern() => ShapeMatchResult::NoMatch,
        (IsNotNull, _) => ShapeMatchResult::NoMatch,
        (_, IsNotNull) => superset(),
        (Eq | In, _) => match new.literals() {
            Some(values) => when(values.iter().all(|v| cached.matches_value(v) == Some(true))),
            None => ShapeMatchResult::NoMatch,
        },
        (NotEq | NotIn, NotEq | NotIn) => match (new.exclusions(), cached.exclusions()) {
            // every value the cached operation excludes is excluded here too
            (Some(mine), Some(theirs)) => when(
                theirs
                    .iter()
                    .all(|v| mine.iter().any(|m| *m == *v || m.loose_eq(v))),
            ),
            _ => ShapeMatchResult::NoMatch,
        },
        (x, y) if x.is_range() && y.is_range() => match (new.interval(), cached.interval()) {
            (Some(inner), Some(outer)) => when(outer.contains_interval(&inner)),
            _ => ShapeMatchResult::NoMatch,
        },
        _ => ShapeMatchResult::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::TypedAttribute;

    struct Trade {
        user: i32,
        qty: i32,
        state: String,
    }

    fn user() -> TypedAttribute<Trade, i32> {
        TypedAttribute::new("Trade", "user", |t: &Trade| Some(t.user))
    }

    fn qty() -> TypedAttribute<Trade, i32> {
        TypedAttribute::new("Trade", "qty", |t: &Trade| Some(t.qty))
    }

    fn state() -> TypedAttribute<Trade, String> {
        TypedAttribute::new("Trade", "state", |t: &Trade| Some(t.state.clone()))
    }

    fn lookup_of(result: ShapeMatchResult<Trade>) -> Operation<Trade> {
        match result {
            ShapeMatchResult::SuperMatch(m) => m.lookup,
            other => panic!("expected super match, got {other:?}"),
        }
    }

    #[test]
    fn test_eq_against_eq_is_exact() {
        assert!(user().eq(1).shape_match(&user().eq(2)).is_exact_match());
        assert!(user().eq(1).shape_match(&user().eq(1)).is_exact_match());
        assert!(matches!(user().eq(1).shape_match(&qty().eq(1)), ShapeMatchResult::NoMatch));
    }

    #[test]
    fn test_range_contains_eq() {
        let m = user().eq(2).shape_match(&user().greater_than(0));
        assert_eq!(lookup_of(m), user().greater_than(0));
        assert!(!user().eq(2).shape_match(&user().greater_than(2)).is_super_match());
        assert!(user().eq(2).shape_match(&user().greater_than_equals(2)).is_super_match());
    }

    #[test]
    fn test_range_contains_range() {
        assert!(user().greater_than(5).shape_match(&user().greater_than(0)).is_super_match());
        assert!(!user().greater_than(0).shape_match(&user().greater_than(5)).is_super_match());
        assert!(!user().less_than(3).shape_match(&user().greater_than(0)).is_super_match());
    }

    #[test]
    fn test_filter_is_new_operation() {
        let new = user().greater_than(10).and(&user().less_than(20));
        let m = new
            .shape_match(&user().greater_than(10))
            .into_super_match()
            .unwrap();
        assert!(m.lookup_is_existing());
        assert_eq!(m.filter, user().less_than(20));
    }

    #[test]
    fn test_and_against_and_builds_lookup() {
        let cached = user().eq(1).and(&qty().greater_than(0));
        let new = user().eq(2).and(&qty().greater_than(5)).and(&state().eq("open"));
        let m = new.shape_match(&cached).into_super_match().unwrap();
        assert_eq!(m.lookup, user().eq(2).and(&qty().greater_than(0)));
        assert_eq!(m.filter, qty().greater_than(5).and(&state().eq("open")));
        assert!(!m.lookup_is_existing());
    }

    #[test]
    fn test_unfilterable_operand_requires_exact() {
        let cached = user().eq(1).and(&qty().greater_than(0));
        let new = user().eq(1).and(&state().full_text("x"));
        assert!(matches!(
            new.shape_match(&cached),
            ShapeMatchResult::NoMatchRequiresExact
        ));

        let cached = user().eq(1).and(&state().full_text("x"));
        let new = user().eq(1).and(&state().full_text("x")).and(&qty().eq(3));
        assert!(new.shape_match(&cached).is_super_match());
    }

    #[test]
    fn test_all_accepts_filterable() {
        assert!(user().eq(1).shape_match(&Operation::All).is_super_match());
        assert!(matches!(
            state().full_text("x").shape_match(&Operation::All),
            ShapeMatchResult::NoMatchRequiresExact
        ));
    }

    #[test]
    fn test_or_subsets() {
        let cached = user().greater_than(0).or(&qty().is_not_null());
        assert!(user().eq(2).shape_match(&cached).is_super_match());

        let new = user().eq(1).or(&user().eq(2));
        assert!(new.shape_match(&user().in_([1, 2, 3])).is_super_match());
        assert!(!new.shape_match(&user().in_([1, 3])).is_super_match());
    }
}
