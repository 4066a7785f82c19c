//! Query cache statistics.
//!
//! Counters are relaxed atomics shared between a portal and its caches.
//! [`QueryCacheStats::snapshot`] gives a plain, serializable copy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Live counters for one portal.
#[derive(Debug, Default)]
pub struct QueryCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sub_query_hits: AtomicU64,
    store_retrievals: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
}

/// Shared handle to a stats block.
pub type SharedQueryCacheStats = Arc<QueryCacheStats>;

impl QueryCacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact or canonical-form hit.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookup that fell through to the store.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sub_query_hit(&self) {
        self.sub_query_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_retrieval(&self) {
        self.store_retrievals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Entry dropped on discovery because its counters moved or its TTL ran out.
    pub fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn sub_query_hits(&self) -> u64 {
        self.sub_query_hits.load(Ordering::Relaxed)
    }

    pub fn store_retrievals(&self) -> u64 {
        self.store_retrievals.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    /// Fraction of finds answered from memory (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let answered = (self.hits() + self.sub_query_hits()) as f64;
        let total = answered + self.misses() as f64;
        if total > 0.0 {
            answered / total
        } else {
            0.0
        }
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> QueryCacheStatsSnapshot {
        QueryCacheStatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            sub_query_hits: self.sub_query_hits(),
            store_retrievals: self.store_retrievals(),
            evictions: self.evictions(),
            expired: self.expired(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Serializable counter values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueryCacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sub_query_hits: u64,
    pub store_retrievals: u64,
    pub evictions: u64,
    pub expired: u64,
    pub hit_rate: f64,
}
