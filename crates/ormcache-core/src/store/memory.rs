//! In-process store keyed by an identity attribute.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use ormcache_proto::{
    CompiledQuery, FilterNode, FilterOp, NullOrdering, OrderDirection, OrderSpec, Value,
};
use parking_lot::RwLock;
use tracing::trace;

use super::evaluator::StoreFilterEvaluator;
use super::Store;
use crate::attribute::Attribute;
use crate::error::Error;
use crate::update_count::UpdateCountHolder;

/// Holds entities in memory and answers compiled queries by scanning them.
///
/// Every mutation bumps the per-class holder while the rows lock is held,
/// before the new row is visible, so a reader that captured counters before
/// calling [`execute`](Store::execute) either sees the old rows or a moved
/// counter.
pub struct MemoryStore<E> {
    entity: String,
    identity: Attribute<E>,
    attributes: Vec<Attribute<E>>,
    rows: RwLock<BTreeMap<Value, Arc<E>>>,
    holder: Arc<UpdateCountHolder>,
    retrievals: AtomicU64,
    unsupported: Vec<FilterOp>,
}

impl<E> MemoryStore<E> {
    /// Create an empty store. `identity` is also queryable.
    pub fn new(
        entity: impl Into<String>,
        identity: impl Into<Attribute<E>>,
        holder: Arc<UpdateCountHolder>,
    ) -> Self {
        let identity = identity.into();
        Self {
            entity: entity.into(),
            attributes: vec![identity.clone()],
            identity,
            rows: RwLock::new(BTreeMap::new()),
            holder,
            retrievals: AtomicU64::new(0),
            unsupported: Vec::new(),
        }
    }

    /// Register a queryable attribute.
    pub fn with_attribute(mut self, attribute: impl Into<Attribute<E>>) -> Self {
        let attribute = attribute.into();
        if !self.attributes.contains(&attribute) {
            self.attributes.push(attribute);
        }
        self
    }

    /// Refuse queries that use `op`.
    pub fn without_support(mut self, op: FilterOp) -> Self {
        self.unsupported.push(op);
        self
    }

    /// Insert or replace by identity. Returns the replaced row.
    pub fn insert(&self, entity: E) -> Option<Arc<E>> {
        let key = self.identity.value_of(&entity);
        let mut rows = self.rows.write();
        self.holder.increment_update_count();
        rows.insert(key, Arc::new(entity))
    }

    /// Alias of [`insert`](Self::insert) for readability at call sites.
    pub fn update(&self, entity: E) -> Option<Arc<E>> {
        self.insert(entity)
    }

    /// Remove by identity.
    pub fn delete(&self, key: &Value) -> Option<Arc<E>> {
        let mut rows = self.rows.write();
        if !rows.contains_key(key) {
            return None;
        }
        self.holder.increment_update_count();
        rows.remove(key)
    }

    pub fn get(&self, key: &Value) -> Option<Arc<E>> {
        self.rows.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Number of executed queries.
    pub fn retrieval_count(&self) -> u64 {
        self.retrievals.load(AtomicOrdering::Relaxed)
    }

    /// Holder bumped by every mutation.
    pub fn update_count_holder(&self) -> &Arc<UpdateCountHolder> {
        &self.holder
    }

    fn attribute(&self, field: &str) -> Result<&Attribute<E>, Error> {
        self.attributes
            .iter()
            .find(|a| a.name() == field)
            .ok_or_else(|| Error::Store(format!("{} has no attribute {field}", self.entity)))
    }

    fn check(&self, query: &CompiledQuery) -> Result<(), Error> {
        if query.entity != self.entity {
            return Err(Error::Store(format!(
                "store for {} cannot answer a query on {}",
                self.entity, query.entity
            )));
        }
        query.filter.validate()?;
        for node in query.filter.nodes() {
            if let FilterNode::Predicate { field, op, .. } = node {
                if self.unsupported.contains(op) {
                    return Err(Error::unsupported(op.as_str(), "disabled for this store"));
                }
                self.attribute(field)?;
            }
        }
        Ok(())
    }

    fn project(&self, entity: &E) -> Vec<(String, Value)> {
        self.attributes
            .iter()
            .map(|a| (a.name().to_string(), a.value_of(entity)))
            .collect()
    }
}

fn compare_values(left: &Value, right: &Value, spec: &OrderSpec) -> Ordering {
    let nulls_first = spec.nulls == NullOrdering::First;
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) if nulls_first => Ordering::Less,
        (true, false) => Ordering::Greater,
        (false, true) if nulls_first => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ordering = left.compare(right).unwrap_or_else(|| left.cmp(right));
            match spec.direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            }
        }
    }
}

impl<E: Send + Sync> Store<E> for MemoryStore<E> {
    fn execute(&self, query: &CompiledQuery) -> Result<Vec<Arc<E>>, Error> {
        self.check(query)?;
        let order: Vec<(&Attribute<E>, &OrderSpec)> = query
            .order_by
            .iter()
            .map(|spec| self.attribute(&spec.field).map(|a| (a, spec)))
            .collect::<Result<_, _>>()?;

        let mut matched = Vec::new();
        {
            let rows = self.rows.read();
            for row in rows.values() {
                if StoreFilterEvaluator::evaluate(&query.filter, &self.project(row))? {
                    matched.push(row.clone());
                }
            }
        }
        self.retrievals.fetch_add(1, AtomicOrdering::Relaxed);

        if !order.is_empty() {
            matched.sort_by(|a, b| {
                for (attribute, spec) in &order {
                    let ordering =
                        compare_values(&attribute.value_of(a), &attribute.value_of(b), spec);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }
        trace!(entity = %self.entity, rows = matched.len(), "Memory store scan");
        Ok(matched)
    }

    fn supports(&self, op: FilterOp) -> bool {
        !self.unsupported.contains(&op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::TypedAttribute;

    #[derive(Debug)]
    struct Order {
        id: i32,
        amount: Option<i32>,
    }

    fn id() -> TypedAttribute<Order, i32> {
        TypedAttribute::new("Order", "id", |o: &Order| Some(o.id))
    }

    fn amount() -> TypedAttribute<Order, i32> {
        TypedAttribute::new("Order", "amount", |o: &Order| o.amount)
    }

    fn store() -> MemoryStore<Order> {
        let store = MemoryStore::new("Order", id(), Arc::new(UpdateCountHolder::new("Order")))
            .with_attribute(amount());
        store.insert(Order { id: 1, amount: Some(30) });
        store.insert(Order { id: 2, amount: None });
        store.insert(Order { id: 3, amount: Some(10) });
        store
    }

    #[test]
    fn test_mutations_bump_holder() {
        let store = store();
        assert_eq!(store.update_count_holder().update_count(), 3);
        store.update(Order { id: 1, amount: Some(31) });
        assert_eq!(store.update_count_holder().update_count(), 4);
        assert!(store.delete(&Value::Int32(9)).is_none());
        assert_eq!(store.update_count_holder().update_count(), 4);
        assert!(store.delete(&Value::Int32(2)).is_some());
        assert_eq!(store.update_count_holder().update_count(), 5);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_execute_filters_and_sorts() {
        let store = store();
        let query = amount()
            .is_not_null()
            .compile("Order", Some(&amount().descending_order_by()))
            .unwrap();
        let rows = store.execute(&query).unwrap();
        let ids: Vec<i32> = rows.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(store.retrieval_count(), 1);
    }

    #[test]
    fn test_execute_rejects_foreign_queries() {
        let store = store().without_support(FilterOp::Gt);
        assert!(!store.supports(FilterOp::Gt));

        let gt = amount().greater_than(5).compile("Order", None).unwrap();
        assert!(matches!(store.execute(&gt), Err(Error::Unsupported { .. })));

        let wrong_entity = amount().eq(5).compile("Invoice", None).unwrap();
        assert!(matches!(store.execute(&wrong_entity), Err(Error::Store(_))));

        let unknown = TypedAttribute::<Order, i32>::new("Order", "qty", |_| None)
            .eq(1)
            .compile("Order", None)
            .unwrap();
        assert!(matches!(store.execute(&unknown), Err(Error::Store(_))));
    }
}
