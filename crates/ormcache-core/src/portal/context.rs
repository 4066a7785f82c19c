use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::{CacheClock, SystemClock};
use crate::update_count::{UpdateCountHolder, UpdateCountPool};

/// State shared by every portal of one application: the TTL clock, the
/// interning pool for snapshot arrays, and one update counter per entity type.
#[derive(Debug)]
pub struct CacheContext {
    clock: Arc<dyn CacheClock>,
    pool: UpdateCountPool,
    holders: DashMap<String, Arc<UpdateCountHolder>>,
}

impl CacheContext {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn CacheClock>) -> Self {
        Self {
            clock,
            pool: UpdateCountPool::new(),
            holders: DashMap::new(),
        }
    }

    pub fn clock(&self) -> Arc<dyn CacheClock> {
        self.clock.clone()
    }

    pub fn pool(&self) -> &UpdateCountPool {
        &self.pool
    }

    /// The entity type's counter, created on first use. Every portal and
    /// store for the same entity shares it.
    pub fn per_class_update_count_holder(&self, entity: &str) -> Arc<UpdateCountHolder> {
        if let Some(holder) = self.holders.get(entity) {
            return holder.value().clone();
        }
        self.holders
            .entry(entity.to_string())
            .or_insert_with(|| Arc::new(UpdateCountHolder::new(entity)))
            .value()
            .clone()
    }
}

impl Default for CacheContext {
    fn default() -> Self {
        Self::new()
    }
}
