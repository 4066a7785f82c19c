//! Result ordering.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ormcache_proto::{NullOrdering, OrderDirection, OrderSpec};

use crate::attribute::Attribute;
use crate::update_count::UpdateCountHolder;

/// One sort key.
pub struct OrderKey<E> {
    pub attribute: Attribute<E>,
    pub direction: OrderDirection,
    pub nulls: NullOrdering,
}

impl<E> OrderKey<E> {
    fn compare(&self, left: &E, right: &E) -> Ordering {
        let (l, r) = (
            self.attribute.value_of(left),
            self.attribute.value_of(right),
        );
        let nulls_first = self.nulls == NullOrdering::First;
        match (l.is_null(), r.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = l.compare(&r).unwrap_or_else(|| l.cmp(&r));
                match self.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                }
            }
        }
    }
}

impl<E> Clone for OrderKey<E> {
    fn clone(&self) -> Self {
        Self {
            attribute: self.attribute.clone(),
            direction: self.direction,
            nulls: self.nulls,
        }
    }
}

impl<E> PartialEq for OrderKey<E> {
    fn eq(&self, other: &Self) -> bool {
        self.attribute == other.attribute
            && self.direction == other.direction
            && self.nulls == other.nulls
    }
}

/// An immutable, chainable comparator over entities.
///
/// Null placement is absolute: `NullOrdering::First` puts nulls first in
/// both directions.
pub struct OrderBy<E> {
    keys: Arc<[OrderKey<E>]>,
}

impl<E> OrderBy<E> {
    /// Ascending, nulls first.
    pub fn ascending(attribute: impl Into<Attribute<E>>) -> Self {
        Self::single(attribute.into(), OrderDirection::Asc, NullOrdering::First)
    }

    /// Descending, nulls last.
    pub fn descending(attribute: impl Into<Attribute<E>>) -> Self {
        Self::single(attribute.into(), OrderDirection::Desc, NullOrdering::Last)
    }

    fn single(attribute: Attribute<E>, direction: OrderDirection, nulls: NullOrdering) -> Self {
        Self {
            keys: Arc::from(vec![OrderKey {
                attribute,
                direction,
                nulls,
            }]),
        }
    }

    /// Same keys, with the last key's null placement overridden.
    pub fn with_nulls(&self, nulls: NullOrdering) -> Self {
        let mut keys = self.keys.to_vec();
        if let Some(last) = keys.last_mut() {
            last.nulls = nulls;
        }
        Self { keys: keys.into() }
    }

    /// Break ties with `next`.
    pub fn and(&self, next: &OrderBy<E>) -> Self {
        let keys: Vec<OrderKey<E>> = self.keys.iter().chain(next.keys.iter()).cloned().collect();
        Self { keys: keys.into() }
    }

    pub fn keys(&self) -> &[OrderKey<E>] {
        &self.keys
    }

    pub fn compare(&self, left: &E, right: &E) -> Ordering {
        for key in self.keys.iter() {
            let ordering = key.compare(left, right);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable sort in place.
    pub fn sort(&self, entities: &mut [Arc<E>]) {
        entities.sort_by(|a, b| self.compare(a, b));
    }

    /// Store form of the ordering.
    pub fn to_specs(&self) -> Vec<OrderSpec> {
        self.keys
            .iter()
            .map(|key| OrderSpec {
                field: key.attribute.name().to_string(),
                direction: key.direction,
                nulls: key.nulls,
            })
            .collect()
    }

    /// Add attribute update counters to `out`, skipping ones already present.
    pub fn collect_update_count_holders(&self, out: &mut Vec<Arc<UpdateCountHolder>>) {
        for key in self.keys.iter() {
            if let Some(holder) = key.attribute.update_count_holder() {
                if !out.iter().any(|h| Arc::ptr_eq(h, holder)) {
                    out.push(holder.clone());
                }
            }
        }
    }
}

impl<E> Clone for OrderBy<E> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
        }
    }
}

impl<E> PartialEq for OrderBy<E> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.keys, &other.keys) || self.keys[..] == other.keys[..]
    }
}

impl<E> Eq for OrderBy<E> {}

impl<E> Hash for OrderBy<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for key in self.keys.iter() {
            key.attribute.hash(state);
            key.direction.hash(state);
            key.nulls.hash(state);
        }
    }
}

impl<E> fmt::Debug for OrderBy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for key in self.keys.iter() {
            list.entry(&format_args!(
                "{} {:?} nulls {:?}",
                key.attribute, key.direction, key.nulls
            ));
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::TypedAttribute;

    struct Account {
        region: Option<String>,
        balance: i64,
    }

    fn region() -> TypedAttribute<Account, String> {
        TypedAttribute::new("Account", "region", |a: &Account| a.region.clone())
    }

    fn balance() -> TypedAttribute<Account, i64> {
        TypedAttribute::new("Account", "balance", |a: &Account| Some(a.balance))
    }

    fn accounts() -> Vec<Arc<Account>> {
        vec![
            Arc::new(Account { region: Some("emea".into()), balance: 5 }),
            Arc::new(Account { region: None, balance: 7 }),
            Arc::new(Account { region: Some("apac".into()), balance: 5 }),
            Arc::new(Account { region: Some("emea".into()), balance: 1 }),
        ]
    }

    fn balances(rows: &[Arc<Account>]) -> Vec<i64> {
        rows.iter().map(|a| a.balance).collect()
    }

    #[test]
    fn test_ascending_nulls_first() {
        let mut rows = accounts();
        region().ascending_order_by().sort(&mut rows);
        let regions: Vec<Option<&str>> = rows.iter().map(|a| a.region.as_deref()).collect();
        assert_eq!(regions, vec![None, Some("apac"), Some("emea"), Some("emea")]);
    }

    #[test]
    fn test_descending_nulls_last_and_chain() {
        let mut rows = accounts();
        let order = region().descending_order_by().and(&balance().ascending_order_by());
        order.sort(&mut rows);
        assert_eq!(balances(&rows), vec![1, 5, 5, 7]);

        let mut rows = accounts();
        region()
            .descending_order_by()
            .with_nulls(NullOrdering::First)
            .sort(&mut rows);
        assert_eq!(rows[0].region, None);
    }

    #[test]
    fn test_stable_sort() {
        let mut rows = accounts();
        balance().ascending_order_by().sort(&mut rows);
        // equal balances keep input order
        let regions: Vec<Option<&str>> = rows.iter().map(|a| a.region.as_deref()).collect();
        assert_eq!(regions, vec![Some("emea"), Some("emea"), Some("apac"), None]);
    }

    #[test]
    fn test_equality_and_specs() {
        let a = region().ascending_order_by().and(&balance().descending_order_by());
        let b = region().ascending_order_by().and(&balance().descending_order_by());
        assert_eq!(a, b);
        assert_ne!(a, region().ascending_order_by());

        let specs = a.to_specs();
        assert_eq!(specs[0], OrderSpec::asc("region"));
        assert_eq!(specs[1], OrderSpec::desc("balance"));
    }
}
