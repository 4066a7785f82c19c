//! ormcache core - operation algebra, query result cache and sub-query cache.
//!
//! Application code builds [`Operation`]s over typed attributes of an entity
//! and asks a [`Portal`] for the matching entities. The portal answers from
//! its [`QueryCache`] when an equal, equivalent or subsuming result is cached
//! and not stale, and from a [`Store`] otherwise.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ormcache_core::{CacheContext, MemoryStore, Portal, PortalConfig, TypedAttribute};
//!
//! let amount = TypedAttribute::new("Order", "amount", |o: &Order| Some(o.amount));
//! let context = Arc::new(CacheContext::new());
//! let holder = context.per_class_update_count_holder("Order");
//! let store = Arc::new(MemoryStore::new("Order", id, holder));
//! let portal = Portal::new(PortalConfig::new("Order"), context, store)?;
//!
//! let open = portal.find(&amount.greater_than(10), None)?;
//! // answered in memory from the cached result above
//! let narrow = portal.find(&amount.greater_than(10).and(&amount.less_than(20)), None)?;
//! ```

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod attribute;
pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod operation;
pub mod order_by;
pub mod portal;
pub mod store;
pub mod update_count;

pub use attribute::{
    Attribute, AttributeKind, AttributeValue, Date, EnumVariant, OrderedValue, Timestamp,
    TypedAttribute,
};
pub use cache::{
    CacheClock, CachedQuery, CachedQueryFlags, FullQueryIndex, LruQueryIndex, ManualClock,
    QueryCache, QueryIndex, QueryResult, SubQueryCache, SystemClock,
};
pub use config::{PortalConfig, QueryCacheConfig};
pub use error::Error;
pub use metrics::{QueryCacheStats, QueryCacheStatsSnapshot, SharedQueryCacheStats};
pub use operation::{
    AnalyzedOperation, AtomicOperation, Operation, OperatorKind, Parameter, ShapeMatchResult,
    SuperMatch,
};
pub use order_by::{OrderBy, OrderKey};
pub use portal::{CacheContext, Portal};
pub use store::{MemoryStore, Store, StoreFilterEvaluator};
pub use update_count::{StalenessSnapshot, UpdateCountHolder, UpdateCountPool};

/// Re-export store-facing IR types.
pub use ormcache_proto as proto;
