//! Benchmark harness: a populated store behind a portal.

use std::sync::Arc;

use ormcache_core::{CacheContext, MemoryStore, Portal, PortalConfig, QueryCacheConfig};

use crate::fixtures::{generate_trades, Scale, Trade, TradeAttributes};

pub struct TestContext {
    pub attrs: TradeAttributes,
    pub store: Arc<MemoryStore<Trade>>,
    pub portal: Portal<Trade>,
}

impl TestContext {
    /// Bounded cache with default sizes.
    pub fn with_scale(scale: Scale) -> Self {
        Self::with_config(scale, PortalConfig::new("Trade"))
    }

    /// Unbounded cache.
    pub fn full_cache(scale: Scale) -> Self {
        Self::with_config(
            scale,
            PortalConfig::new("Trade").with_query_cache(QueryCacheConfig::full()),
        )
    }

    pub fn with_config(scale: Scale, config: PortalConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let context = Arc::new(CacheContext::new());
        let attrs = TradeAttributes::new();
        let holder = context.per_class_update_count_holder("Trade");
        let store = Arc::new(
            MemoryStore::new("Trade", attrs.id.clone(), holder)
                .with_attribute(attrs.account.clone())
                .with_attribute(attrs.symbol.clone())
                .with_attribute(attrs.quantity.clone())
                .with_attribute(attrs.price.clone())
                .with_attribute(attrs.state.clone())
                .with_attribute(attrs.memo.clone()),
        );
        for trade in generate_trades(scale, 42) {
            store.insert(trade);
        }
        let portal = match Portal::<Trade>::new(config, context, store.clone()) {
            Ok(portal) => portal,
            Err(e) => panic!("invalid benchmark portal config: {e}"),
        };
        Self {
            attrs,
            store,
            portal,
        }
    }
}
