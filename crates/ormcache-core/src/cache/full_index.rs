//! Unbounded query index.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use super::cached_query::CachedQuery;
use super::index::QueryIndex;
use crate::metrics::SharedQueryCacheStats;
use crate::operation::Operation;

/// Keeps every query until it goes stale or the cache is cleared. Top-level
/// and relationship results share one map.
pub struct FullQueryIndex<E> {
    queries: DashMap<Operation<E>, Arc<CachedQuery<E>>>,
    stats: SharedQueryCacheStats,
}

impl<E> FullQueryIndex<E> {
    pub fn new(stats: SharedQueryCacheStats) -> Self {
        Self {
            queries: DashMap::new(),
            stats,
        }
    }
}

impl<E: Send + Sync> QueryIndex<E> for FullQueryIndex<E> {
    fn get(
        &self,
        operation: &Operation<E>,
        _for_relationship: bool,
    ) -> Option<Arc<CachedQuery<E>>> {
        // clone out before removing so no shard guard is held
        let query = self.queries.get(operation).map(|entry| entry.value().clone())?;
        if !query.is_expired() {
            return Some(query);
        }
        let removed = self
            .queries
            .remove_if(operation, |_, current| Arc::ptr_eq(current, &query));
        if removed.is_some() {
            self.stats.record_expired();
            trace!(%operation, "Dropped expired query");
        }
        None
    }

    fn put(&self, query: Arc<CachedQuery<E>>, _for_relationship: bool) {
        self.queries.insert(query.operation().clone(), query);
    }

    fn clear(&self) {
        self.queries.clear();
    }

    fn rough_size(&self) -> usize {
        self.queries.len()
    }
}
