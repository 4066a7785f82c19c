//! Entry point for finding entities of one type.
//!
//! A [`Portal`] answers operations from its query cache when it can and from
//! the [`Store`] otherwise. Lookups run in this order:
//!
//! 1. exact match on the operation as given
//! 2. exact match on its canonical (simplified) form
//! 3. the sub-query cache, filtering a cached superset in memory
//! 4. the store, caching the result under both forms
//!
//! The staleness snapshot for a store result is captured before the store is
//! called, so a mutation racing with the read always leaves the result
//! expired rather than stale.

mod context;

pub use context::CacheContext;

use std::sync::Arc;

use tracing::{debug, info, instrument, trace};

use crate::cache::{CacheClock, CachedQuery, CachedQueryFlags, QueryCache};
use crate::config::PortalConfig;
use crate::error::Error;
use crate::metrics::{QueryCacheStats, SharedQueryCacheStats};
use crate::operation::{AnalyzedOperation, Operation};
use crate::order_by::OrderBy;
use crate::store::Store;
use crate::update_count::{StalenessSnapshot, UpdateCountHolder};

pub struct Portal<E> {
    config: PortalConfig,
    context: Arc<CacheContext>,
    store: Arc<dyn Store<E>>,
    holder: Arc<UpdateCountHolder>,
    query_cache: QueryCache<E>,
    stats: SharedQueryCacheStats,
}

impl<E: Send + Sync + 'static> Portal<E> {
    pub fn new(
        config: PortalConfig,
        context: Arc<CacheContext>,
        store: Arc<dyn Store<E>>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let stats = Arc::new(QueryCacheStats::new());
        let query_cache = QueryCache::new(
            config.entity.as_str(),
            &config.query_cache,
            context.clock(),
            stats.clone(),
        )?;
        let holder = context.per_class_update_count_holder(&config.entity);
        debug!(
            entity = %config.entity,
            full_cache = config.query_cache.full_cache,
            unmanaged = config.unmanaged,
            "Portal created"
        );
        Ok(Self {
            config,
            context,
            store,
            holder,
            query_cache,
            stats,
        })
    }

    /// Find entities matching `operation`, sorted by `order_by` when given.
    pub fn find(
        &self,
        operation: &Operation<E>,
        order_by: Option<&OrderBy<E>>,
    ) -> Result<Arc<CachedQuery<E>>, Error> {
        self.resolve(operation, order_by, false)
    }

    /// Like [`find`](Self::find), cached in the relationship list.
    pub fn find_for_relationship(
        &self,
        operation: &Operation<E>,
        order_by: Option<&OrderBy<E>>,
    ) -> Result<Arc<CachedQuery<E>>, Error> {
        self.resolve(operation, order_by, true)
    }

    #[instrument(
        skip_all,
        fields(
            entity = %self.config.entity,
            operation = %operation,
            for_relationship = for_relationship
        )
    )]
    fn resolve(
        &self,
        operation: &Operation<E>,
        order_by: Option<&OrderBy<E>>,
        for_relationship: bool,
    ) -> Result<Arc<CachedQuery<E>>, Error> {
        if operation.is_none() {
            return Ok(self.empty(operation, order_by));
        }
        let managed = !self.config.unmanaged;

        if managed {
            if let Some(hit) = self.query_cache.find_by_equality(operation, for_relationship) {
                self.stats.record_hit();
                trace!(rows = hit.len(), "Exact cache hit");
                return Ok(hit.clone_if_different_order_by(order_by));
            }
        }

        let analyzed = AnalyzedOperation::new(operation.clone());
        let canonical = analyzed.analyzed();
        let differs = analyzed.is_analyzed_operation_different();
        if canonical.is_none() {
            debug!("Operation is unsatisfiable");
            return Ok(self.empty(operation, order_by));
        }

        if managed && differs {
            if let Some(hit) = self.query_cache.find_by_equality(canonical, for_relationship) {
                self.stats.record_hit();
                trace!(%canonical, rows = hit.len(), "Canonical cache hit");
                let equivalent = Arc::new(
                    hit.clone_for_equivalent_operation(operation.clone(), order_by.cloned()),
                );
                self.query_cache.put(equivalent.clone(), for_relationship);
                return Ok(equivalent);
            }
        }

        if managed {
            let analyzed_arg = differs.then_some(canonical);
            if let Some(hit) = self.query_cache.find_by_sub_query(
                operation,
                analyzed_arg,
                order_by,
                for_relationship,
            ) {
                self.stats.record_sub_query_hit();
                return Ok(hit);
            }
        }

        self.stats.record_miss();
        self.retrieve(&analyzed, order_by, for_relationship)
    }

    fn retrieve(
        &self,
        analyzed: &AnalyzedOperation<E>,
        order_by: Option<&OrderBy<E>>,
        for_relationship: bool,
    ) -> Result<Arc<CachedQuery<E>>, Error> {
        let operation = analyzed.original();
        let canonical = analyzed.analyzed();

        // before the store round trip
        let snapshot = if self.config.unmanaged {
            None
        } else {
            Some(self.capture_snapshot(operation, order_by)?)
        };
        let retrieved_at = self.context.clock().now_millis();

        let rows = self.execute(canonical, order_by)?;
        let flags = CachedQueryFlags {
            for_relationship,
            ..CachedQueryFlags::default()
        };
        let query = Arc::new(
            CachedQuery::new(operation.clone(), order_by.cloned(), snapshot, rows)
                .with_flags(flags)
                .with_retrieved_at(retrieved_at),
        );
        debug!(rows = query.len(), "Retrieved from store");

        if self.query_cache.put(query.clone(), for_relationship)
            && analyzed.is_analyzed_operation_different()
        {
            let stored = Arc::new(
                query
                    .clone_for_equivalent_operation(canonical.clone(), order_by.cloned())
                    .with_flags(CachedQueryFlags {
                        was_defaulted: true,
                        ..flags
                    }),
            );
            self.query_cache.put(stored, for_relationship);
        }
        Ok(query)
    }

    fn execute(
        &self,
        operation: &Operation<E>,
        order_by: Option<&OrderBy<E>>,
    ) -> Result<Vec<Arc<E>>, Error> {
        for op in operation.filter_ops() {
            if !self.store.supports(op) {
                return Err(Error::unsupported(
                    operation.to_string(),
                    format!("store for {} cannot evaluate {op}", self.config.entity),
                ));
            }
        }
        let compiled = operation.compile(&self.config.entity, order_by)?;
        let rows = self.store.execute(&compiled)?;
        self.stats.record_store_retrieval();
        Ok(rows)
    }

    fn empty(
        &self,
        operation: &Operation<E>,
        order_by: Option<&OrderBy<E>>,
    ) -> Arc<CachedQuery<E>> {
        Arc::new(CachedQuery::new(operation.clone(), order_by.cloned(), None, Vec::new()))
    }

    /// Query the store directly. Nothing is read from or written to the
    /// cache.
    pub fn find_bypass_cache(
        &self,
        operation: &Operation<E>,
        order_by: Option<&OrderBy<E>>,
    ) -> Result<Vec<Arc<E>>, Error> {
        let canonical = operation.simplify();
        if canonical.is_none() {
            return Ok(Vec::new());
        }
        let mut rows = self.execute(&canonical, order_by)?;
        if let Some(order_by) = order_by {
            order_by.sort(&mut rows);
        }
        Ok(rows)
    }

    /// Counter values for the per-class holder and every attribute holder
    /// `operation` and `order_by` depend on.
    pub fn capture_snapshot(
        &self,
        operation: &Operation<E>,
        order_by: Option<&OrderBy<E>>,
    ) -> Result<StalenessSnapshot, Error> {
        let mut holders = vec![self.holder.clone()];
        operation.collect_update_count_holders(&mut holders);
        if let Some(order_by) = order_by {
            order_by.collect_update_count_holders(&mut holders);
        }
        let holders = self.pooled_update_count_holders(holders);
        StalenessSnapshot::capture(holders, self.context.pool())
    }

    /// Drop every cached result and expire results already handed out.
    pub fn clear_query_cache(&self) {
        let size = self.query_cache.rough_size();
        self.query_cache.clear_cache();
        self.holder.increment_update_count();
        info!(entity = %self.config.entity, dropped = size, "Query cache cleared");
    }

    /// Bump the per-class counter, expiring every cached result.
    pub fn increment_update_count(&self) -> u64 {
        self.holder.increment_update_count()
    }

    pub fn per_class_update_count_holder(&self) -> &Arc<UpdateCountHolder> {
        &self.holder
    }

    pub fn pooled_update_count_holders(
        &self,
        holders: Vec<Arc<UpdateCountHolder>>,
    ) -> Arc<[Arc<UpdateCountHolder>]> {
        self.context.pool().pooled_update_count_holders(holders)
    }

    pub fn pooled_integer_array(&self, counts: &[u64]) -> Arc<[u64]> {
        self.context.pool().pooled_integer_array(counts)
    }

    pub fn query_cache(&self) -> &QueryCache<E> {
        &self.query_cache
    }

    pub fn stats(&self) -> &SharedQueryCacheStats {
        &self.stats
    }

    pub fn entity(&self) -> &str {
        &self.config.entity
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }
}
