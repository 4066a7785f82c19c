mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ormcache_core::proto::{CompiledQuery, FilterOp, Value};
use ormcache_core::{
    CacheContext, Error, ManualClock, MemoryStore, Operation, Portal, PortalConfig,
    QueryCacheConfig, Store,
};

use common::{order, Fixture, Order, OrderAttributes};

#[test]
fn test_round_trip_then_mutation() {
    let fx = Fixture::new(PortalConfig::new("Order"));
    let op = fx.attrs.state.eq("open");
    let by_id = fx.by_id();

    let first = fx.find_ids(&op, Some(&by_id));
    assert_eq!(fx.retrievals(), 1);
    assert_eq!(fx.find_ids(&op, Some(&by_id)), first);
    assert_eq!(fx.retrievals(), 1);

    let mut changed = order(3);
    changed.state = "held".to_string();
    fx.store.update(changed);

    let after = fx.find_ids(&op, Some(&by_id));
    assert_eq!(fx.retrievals(), 2);
    assert!(!after.contains(&3));
    assert_eq!(after, fx.expected_ids(&op, Some(&by_id)));
}

#[test]
fn test_ordering_clone_keeps_original() {
    let fx = Fixture::new(PortalConfig::new("Order"));
    let op = fx.attrs.user_id.eq(1);

    let asc = fx.portal.find(&op, Some(&fx.attrs.id.ascending_order_by())).unwrap();
    let desc = fx.portal.find(&op, Some(&fx.attrs.id.descending_order_by())).unwrap();
    assert_eq!(fx.retrievals(), 1);

    let asc_ids: Vec<i32> = asc.result().iter().map(|o| o.id).collect();
    let mut desc_ids: Vec<i32> = desc.result().iter().map(|o| o.id).collect();
    desc_ids.reverse();
    assert_eq!(asc_ids, desc_ids);
    assert!(asc_ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_equivalent_forms_share_one_retrieval() {
    let fx = Fixture::new(PortalConfig::new("Order"));
    let loose = fx
        .attrs
        .amount
        .greater_than(20.0)
        .and(&fx.attrs.amount.greater_than(40.0));
    let tight = fx.attrs.amount.greater_than(40.0);

    let a = fx.find_ids(&loose, Some(&fx.by_id()));
    let b = fx.find_ids(&tight, Some(&fx.by_id()));
    assert_eq!(a, b);
    assert_eq!(fx.retrievals(), 1);
}

#[test]
fn test_lru_eviction_sends_find_to_store() {
    let config = PortalConfig::new("Order").with_query_cache(QueryCacheConfig::bounded(2, 4));
    let fx = Fixture::new(config);
    let ops: Vec<Operation<Order>> = (1..=3).map(|u| fx.attrs.user_id.eq(u)).collect();

    for op in &ops {
        fx.portal.find(op, None).unwrap();
    }
    assert_eq!(fx.retrievals(), 3);
    assert!(fx.portal.stats().evictions() >= 1);

    fx.portal.find(&ops[2], None).unwrap();
    assert_eq!(fx.retrievals(), 3);
    fx.portal.find(&ops[0], None).unwrap();
    assert_eq!(fx.retrievals(), 4);
}

#[test]
fn test_relationship_list_isolated_from_top_level_pressure() {
    let config = PortalConfig::new("Order").with_query_cache(QueryCacheConfig::bounded(1, 8));
    let fx = Fixture::new(config);
    let related = fx.attrs.user_id.eq(2);

    fx.portal.find_for_relationship(&related, None).unwrap();
    for u in [0, 1, 3] {
        fx.portal.find(&fx.attrs.user_id.eq(u), None).unwrap();
    }
    assert_eq!(fx.retrievals(), 4);

    let hit = fx.portal.find_for_relationship(&related, None).unwrap();
    assert_eq!(fx.retrievals(), 4);
    assert!(hit.flags().for_relationship);
}

#[test]
fn test_time_to_live_expires_entries() {
    let clock = Arc::new(ManualClock::new());
    let context = Arc::new(CacheContext::with_clock(clock.clone()));
    let config = PortalConfig::new("Order").with_query_cache(
        QueryCacheConfig::bounded(16, 16).with_time_to_live(Duration::from_secs(1)),
    );
    let fx = Fixture::with_context(config, context);
    let op = fx.attrs.user_id.eq(1);

    fx.portal.find(&op, None).unwrap();
    clock.advance(Duration::from_millis(999));
    fx.portal.find(&op, None).unwrap();
    assert_eq!(fx.retrievals(), 1);

    clock.advance(Duration::from_millis(1));
    fx.portal.find(&op, None).unwrap();
    assert_eq!(fx.retrievals(), 2);
    assert!(fx.portal.stats().expired() >= 1);
}

#[test]
fn test_time_to_live_applies_to_sub_queries() {
    let clock = Arc::new(ManualClock::new());
    let context = Arc::new(CacheContext::with_clock(clock.clone()));
    let config = PortalConfig::new("Order").with_query_cache(
        QueryCacheConfig::bounded(16, 16).with_time_to_live(Duration::from_secs(1)),
    );
    let fx = Fixture::with_context(config, context);
    let user = &fx.attrs.user_id;
    let base = user.greater_than(0);
    let narrow = user.greater_than(0).and(&user.less_than(2));

    fx.portal.find(&base, None).unwrap();
    clock.advance(Duration::from_secs(10));

    let by_id = fx.by_id();
    let ids = fx.find_ids(&narrow, Some(&by_id));
    assert_eq!(fx.retrievals(), 2);
    assert_eq!(fx.portal.stats().sub_query_hits(), 0);
    assert_eq!(ids, fx.expected_ids(&narrow, Some(&by_id)));
}

#[test]
fn test_derived_results_expire_with_their_base() {
    let clock = Arc::new(ManualClock::new());
    let context = Arc::new(CacheContext::with_clock(clock.clone()));
    let config = PortalConfig::new("Order").with_query_cache(
        QueryCacheConfig::bounded(16, 16).with_time_to_live(Duration::from_secs(1)),
    );
    let fx = Fixture::with_context(config, context);
    let user = &fx.attrs.user_id;
    let narrow = user.greater_than(0).and(&user.less_than(2));

    fx.portal.find(&user.greater_than(0), None).unwrap();
    clock.advance(Duration::from_millis(600));
    fx.portal.find(&narrow, None).unwrap();
    assert_eq!(fx.retrievals(), 1);
    assert_eq!(fx.portal.stats().sub_query_hits(), 1);

    // one second after the base was read, not after the derivation
    clock.advance(Duration::from_millis(400));
    fx.portal.find(&narrow, None).unwrap();
    assert_eq!(fx.retrievals(), 2);
    assert_eq!(fx.portal.stats().sub_query_hits(), 1);
}

#[test]
fn test_relationship_holder_expires_dependent_queries() {
    let fx = Fixture::new(PortalConfig::new("Order"));
    let gold = fx.attrs.tier.eq("gold");
    let plain = fx.attrs.user_id.eq(1);

    fx.portal.find(&gold, None).unwrap();
    fx.portal.find(&plain, None).unwrap();
    assert_eq!(fx.retrievals(), 2);

    fx.attrs.tier_holder.increment_update_count();
    fx.portal.find(&plain, None).unwrap();
    assert_eq!(fx.retrievals(), 2);
    fx.portal.find(&gold, None).unwrap();
    assert_eq!(fx.retrievals(), 3);
}

#[test]
fn test_full_cache_config_from_json() {
    let json = r#"{"entity": "Order", "query_cache": {"full_cache": true}}"#;
    let config = PortalConfig::from_json(json).unwrap();
    let fx = Fixture::new(config);
    assert!(fx.portal.query_cache().is_full_cache());

    for u in 0..4 {
        fx.portal.find(&fx.attrs.user_id.eq(u), None).unwrap();
    }
    for u in 0..4 {
        fx.portal.find(&fx.attrs.user_id.eq(u), None).unwrap();
    }
    assert_eq!(fx.retrievals(), 4);
    assert_eq!(fx.portal.stats().evictions(), 0);
}

#[test]
fn test_invalid_config_rejected() {
    let context = Arc::new(CacheContext::new());
    let attrs = OrderAttributes::new();
    let store: Arc<MemoryStore<Order>> = Arc::new(MemoryStore::new(
        "Order",
        attrs.id.clone(),
        context.per_class_update_count_holder("Order"),
    ));
    let config = PortalConfig::new("Order").with_query_cache(QueryCacheConfig::bounded(0, 10));
    let err = Portal::<Order>::new(config, context, store).err();
    assert!(matches!(err, Some(Error::Config { .. })));
}

/// Inserts a matching row after the portal captured its snapshot but before
/// the rows are read.
struct RacingStore {
    inner: Arc<MemoryStore<Order>>,
    armed: AtomicBool,
}

impl Store<Order> for RacingStore {
    fn execute(&self, query: &CompiledQuery) -> Result<Vec<Arc<Order>>, Error> {
        if self.armed.swap(false, Ordering::SeqCst) {
            let mut racer = order(1000);
            racer.user_id = 1;
            self.inner.insert(racer);
        }
        self.inner.execute(query)
    }

    fn supports(&self, op: FilterOp) -> bool {
        self.inner.supports(op)
    }
}

#[test]
fn test_mutation_during_retrieval_expires_result() {
    let fx = Fixture::new(PortalConfig::new("Order"));
    let racing = Arc::new(RacingStore {
        inner: fx.store.clone(),
        armed: AtomicBool::new(true),
    });
    let portal =
        Portal::<Order>::new(PortalConfig::new("Order"), fx.context.clone(), racing).unwrap();
    let op = fx.attrs.user_id.eq(1);

    let first = portal.find(&op, None).unwrap();
    assert!(first.is_expired());

    let second = portal.find(&op, None).unwrap();
    assert!(!second.is_expired());
    assert!(second.result().iter().any(|o| o.id == 1000));
    assert_eq!(fx.retrievals(), 2);
}

#[test]
fn test_concurrent_finds_with_mutations() {
    let fx = Fixture::new(PortalConfig::new("Order").with_query_cache(QueryCacheConfig::full()));
    let wide = fx.attrs.amount.greater_than(50.0);
    let narrow = wide.and(&fx.attrs.amount.less_than(120.0));

    thread::scope(|s| {
        for t in 0..2 {
            let store = fx.store.clone();
            s.spawn(move || {
                for i in 0..200 {
                    let id = 1 + (i * 7 + t * 13) % 60;
                    let mut changed = order(id);
                    changed.amount = Some(((i * 31 + t * 17) % 150) as f64);
                    store.update(changed);
                }
            });
        }
        for _ in 0..4 {
            let portal = &fx.portal;
            let wide = &wide;
            let narrow = &narrow;
            s.spawn(move || {
                for _ in 0..200 {
                    let rows = portal.find(wide, None).unwrap();
                    assert!(rows.result().iter().all(|o| o.amount.is_some_and(|a| a > 50.0)));
                    let rows = portal.find(narrow, None).unwrap();
                    assert!(rows
                        .result()
                        .iter()
                        .all(|o| o.amount.is_some_and(|a| a > 50.0 && a < 120.0)));
                }
            });
        }
    });

    let by_id = fx.by_id();
    assert_eq!(fx.find_ids(&wide, Some(&by_id)), fx.expected_ids(&wide, Some(&by_id)));
    assert_eq!(fx.find_ids(&narrow, Some(&by_id)), fx.expected_ids(&narrow, Some(&by_id)));
}

#[test]
fn test_store_rejects_unknown_key_delete() {
    let fx = Fixture::new(PortalConfig::new("Order"));
    let before = fx.store.update_count_holder().update_count();
    assert!(fx.store.delete(&Value::Int32(404)).is_none());
    assert_eq!(fx.store.update_count_holder().update_count(), before);
    assert!(fx.store.delete(&Value::Int32(1)).is_some());
    assert_eq!(fx.store.update_count_holder().update_count(), before + 1);
}
