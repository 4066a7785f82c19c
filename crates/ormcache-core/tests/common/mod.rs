//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use ormcache_core::{
    Attribute, AttributeKind, CacheContext, MemoryStore, Operation, OrderBy, Portal, PortalConfig,
    TypedAttribute, UpdateCountHolder,
};
use ormcache_core::proto::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i32,
    pub user_id: i32,
    pub amount: Option<f64>,
    pub state: String,
    pub note: Option<String>,
    pub tier: Option<String>,
}

/// Attribute set for [`Order`]. `tier` is read through a relationship and
/// carries its own update counter.
pub struct OrderAttributes {
    pub id: TypedAttribute<Order, i32>,
    pub user_id: TypedAttribute<Order, i32>,
    pub amount: TypedAttribute<Order, f64>,
    pub state: TypedAttribute<Order, String>,
    pub note: TypedAttribute<Order, String>,
    pub tier: TypedAttribute<Order, String>,
    pub tier_holder: Arc<UpdateCountHolder>,
}

impl OrderAttributes {
    pub fn new() -> Self {
        let tier_holder = Arc::new(UpdateCountHolder::new("Customer"));
        let tier = Attribute::new("Order", "tier", AttributeKind::String, |o: &Order| {
            Value::from(o.tier.clone())
        })
        .with_update_count_holder(tier_holder.clone())
        .typed::<String>()
        .unwrap();
        Self {
            id: TypedAttribute::new("Order", "id", |o: &Order| Some(o.id)),
            user_id: TypedAttribute::new("Order", "user_id", |o: &Order| Some(o.user_id)),
            amount: TypedAttribute::new("Order", "amount", |o: &Order| o.amount),
            state: TypedAttribute::new("Order", "state", |o: &Order| Some(o.state.clone())),
            note: TypedAttribute::new("Order", "note", |o: &Order| o.note.clone()),
            tier,
            tier_holder,
        }
    }
}

pub fn order(id: i32) -> Order {
    let states = ["open", "held", "closed"];
    Order {
        id,
        user_id: id % 4,
        amount: (id % 7 != 0).then_some(id as f64 * 2.5),
        state: states[id as usize % 3].to_string(),
        note: match id % 3 {
            0 => None,
            1 => Some(format!("rush order {id}")),
            _ => Some(format!("standard {id}")),
        },
        tier: (id % 2 == 0).then(|| "gold".to_string()),
    }
}

pub struct Fixture {
    pub attrs: OrderAttributes,
    pub context: Arc<CacheContext>,
    pub store: Arc<MemoryStore<Order>>,
    pub portal: Portal<Order>,
}

impl Fixture {
    pub fn new(config: PortalConfig) -> Self {
        Self::with_context(config, Arc::new(CacheContext::new()))
    }

    pub fn with_context(config: PortalConfig, context: Arc<CacheContext>) -> Self {
        init_tracing();
        let attrs = OrderAttributes::new();
        let holder = context.per_class_update_count_holder("Order");
        let store = Arc::new(
            MemoryStore::new("Order", attrs.id.clone(), holder)
                .with_attribute(attrs.user_id.clone())
                .with_attribute(attrs.amount.clone())
                .with_attribute(attrs.state.clone())
                .with_attribute(attrs.note.clone())
                .with_attribute(attrs.tier.clone()),
        );
        for id in 1..=60 {
            store.insert(order(id));
        }
        let portal = Portal::<Order>::new(config, context.clone(), store.clone()).unwrap();
        Self {
            attrs,
            context,
            store,
            portal,
        }
    }

    /// Ids returned by the portal.
    pub fn find_ids(&self, op: &Operation<Order>, order_by: Option<&OrderBy<Order>>) -> Vec<i32> {
        let result = self.portal.find(op, order_by).unwrap();
        result.result().iter().map(|o| o.id).collect()
    }

    /// Ids straight from the store, sorted the same way.
    pub fn expected_ids(
        &self,
        op: &Operation<Order>,
        order_by: Option<&OrderBy<Order>>,
    ) -> Vec<i32> {
        let rows = self.portal.find_bypass_cache(op, order_by).unwrap();
        rows.iter().map(|o| o.id).collect()
    }

    pub fn by_id(&self) -> OrderBy<Order> {
        self.attrs.id.ascending_order_by()
    }

    pub fn retrievals(&self) -> u64 {
        self.store.retrieval_count()
    }
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
