//! Bounded query index: two LRU lists with optional time-to-live.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use super::cached_query::CachedQuery;
use super::clock::CacheClock;
use super::index::QueryIndex;
use crate::config::QueryCacheConfig;
use crate::error::Error;
use crate::metrics::SharedQueryCacheStats;
use crate::operation::Operation;

struct TimedEntry<E> {
    query: Arc<CachedQuery<E>>,
    cached_at: u64,
}

impl<E> TimedEntry<E> {
    fn is_live(&self, ttl_millis: Option<u64>, now: u64) -> bool {
        if self.query.is_expired() {
            return false;
        }
        match ttl_millis {
            Some(ttl) => now.saturating_sub(self.cached_at) < ttl,
            None => true,
        }
    }
}

struct LruList<E> {
    entries: LruCache<Operation<E>, TimedEntry<E>>,
    ttl_millis: Option<u64>,
}

impl<E> LruList<E> {
    fn new(capacity: usize, ttl: Option<Duration>, field: &'static str) -> Result<Self, Error> {
        let capacity =
            NonZeroUsize::new(capacity).ok_or_else(|| Error::config(field, "must be at least 1"))?;
        Ok(Self {
            entries: LruCache::new(capacity),
            ttl_millis: ttl.map(|d| d.as_millis() as u64),
        })
    }
}

struct Lists<E> {
    queries: LruList<E>,
    relationships: LruList<E>,
}

impl<E> Lists<E> {
    fn list_mut(&mut self, for_relationship: bool) -> &mut LruList<E> {
        if for_relationship {
            &mut self.relationships
        } else {
            &mut self.queries
        }
    }
}

/// Top-level and relationship results live in separate lists so pressure on
/// one never evicts the other.
pub struct LruQueryIndex<E> {
    lists: Mutex<Lists<E>>,
    clock: Arc<dyn CacheClock>,
    stats: SharedQueryCacheStats,
}

impl<E> LruQueryIndex<E> {
    pub fn new(
        config: &QueryCacheConfig,
        clock: Arc<dyn CacheClock>,
        stats: SharedQueryCacheStats,
    ) -> Result<Self, Error> {
        let lists = Lists {
            queries: LruList::new(
                config.min_queries_to_keep,
                config.time_to_live,
                "min_queries_to_keep",
            )?,
            relationships: LruList::new(
                config.relationship_cache_size,
                config.relationship_time_to_live,
                "relationship_cache_size",
            )?,
        };
        Ok(Self {
            lists: Mutex::new(lists),
            clock,
            stats,
        })
    }

    /// Entries in each list, top-level first.
    pub fn lens(&self) -> (usize, usize) {
        let lists = self.lists.lock();
        (lists.queries.entries.len(), lists.relationships.entries.len())
    }
}

impl<E: Send + Sync> QueryIndex<E> for LruQueryIndex<E> {
    fn get(&self, operation: &Operation<E>, for_relationship: bool) -> Option<Arc<CachedQuery<E>>> {
        let now = self.clock.now_millis();
        let mut lists = self.lists.lock();
        // the requested list first, then the other one
        for relationship in [for_relationship, !for_relationship] {
            let list = lists.list_mut(relationship);
            let ttl = list.ttl_millis;
            let found = list
                .entries
                .get(operation)
                .map(|entry| (entry.query.clone(), entry.is_live(ttl, now)));
            match found {
                Some((query, true)) => return Some(query),
                Some((_, false)) => {
                    list.entries.pop(operation);
                    self.stats.record_expired();
                    trace!(%operation, relationship, "Dropped expired query");
                }
                None => {}
            }
        }
        None
    }

    fn put(&self, query: Arc<CachedQuery<E>>, for_relationship: bool) {
        let key = query.operation().clone();
        // derived and equivalent copies age from the original store read
        let cached_at = query.retrieved_at().unwrap_or_else(|| self.clock.now_millis());
        let entry = TimedEntry { query, cached_at };
        let mut lists = self.lists.lock();
        let list = lists.list_mut(for_relationship);
        if let Some((evicted, _)) = list.entries.push(key, entry) {
            // push hands back the old value on a key update, which is not an eviction
            if !list.entries.contains(&evicted) {
                self.stats.record_eviction();
                trace!(operation = %evicted, for_relationship, "Evicted query");
            }
        }
    }

    fn clear(&self) {
        let mut lists = self.lists.lock();
        lists.queries.entries.clear();
        lists.relationships.entries.clear();
    }

    fn rough_size(&self) -> usize {
        let (queries, relationships) = self.lens();
        queries + relationships
    }
}
