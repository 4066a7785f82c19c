//! Per-entity query result cache.

use std::sync::Arc;

use tracing::debug;

use super::cached_query::CachedQuery;
use super::clock::CacheClock;
use super::full_index::FullQueryIndex;
use super::index::QueryIndex;
use super::lru_index::LruQueryIndex;
use super::sub_query_cache::SubQueryCache;
use crate::config::QueryCacheConfig;
use crate::error::Error;
use crate::metrics::SharedQueryCacheStats;
use crate::operation::Operation;
use crate::order_by::OrderBy;

/// Exact-match index plus the shape-matching sub-query cache.
pub struct QueryCache<E> {
    entity: Arc<str>,
    index: Box<dyn QueryIndex<E>>,
    sub_query_cache: SubQueryCache<E>,
    full_cache: bool,
    stats: SharedQueryCacheStats,
}

impl<E: Send + Sync + 'static> QueryCache<E> {
    pub fn new(
        entity: impl Into<Arc<str>>,
        config: &QueryCacheConfig,
        clock: Arc<dyn CacheClock>,
        stats: SharedQueryCacheStats,
    ) -> Result<Self, Error> {
        config.validate()?;
        let index: Box<dyn QueryIndex<E>> = if config.full_cache {
            Box::new(FullQueryIndex::new(stats.clone()))
        } else {
            Box::new(LruQueryIndex::new(config, clock, stats.clone())?)
        };
        Ok(Self {
            entity: entity.into(),
            index,
            sub_query_cache: SubQueryCache::new(),
            full_cache: config.full_cache,
            stats,
        })
    }

    /// Cached result for an equal operation. Expired entries are dropped
    /// and reported as a miss.
    pub fn find_by_equality(
        &self,
        operation: &Operation<E>,
        for_relationship: bool,
    ) -> Option<Arc<CachedQuery<E>>> {
        self.index.get(operation, for_relationship)
    }

    /// Cache a top-level result. Returns false for queries without a
    /// snapshot.
    pub fn cache_query(&self, query: Arc<CachedQuery<E>>) -> bool {
        self.put(query, false)
    }

    pub fn cache_query_for_relationship(&self, query: Arc<CachedQuery<E>>) -> bool {
        self.put(query, true)
    }

    pub(crate) fn put(&self, query: Arc<CachedQuery<E>>, for_relationship: bool) -> bool {
        if !query.prepare_to_cache_query() {
            return false;
        }
        self.sub_query_cache.cache_query(&query);
        self.index.put(query, for_relationship);
        true
    }

    /// Derive a result in memory from a cached superset, if one exists.
    pub fn find_by_sub_query(
        &self,
        operation: &Operation<E>,
        analyzed: Option<&Operation<E>>,
        order_by: Option<&OrderBy<E>>,
        for_relationship: bool,
    ) -> Option<Arc<CachedQuery<E>>> {
        self.sub_query_cache.resolve_and_cache_sub_query(
            self,
            operation,
            analyzed,
            order_by,
            for_relationship,
        )
    }

    pub fn clear_cache(&self) {
        self.index.clear();
        self.sub_query_cache.clear();
        debug!(entity = %self.entity, "Query cache cleared");
    }

    pub fn rough_size(&self) -> usize {
        self.index.rough_size()
    }

    pub fn is_full_cache(&self) -> bool {
        self.full_cache
    }

    pub fn sub_query_cache(&self) -> &SubQueryCache<E> {
        &self.sub_query_cache
    }

    pub fn stats(&self) -> &SharedQueryCacheStats {
        &self.stats
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }
}
