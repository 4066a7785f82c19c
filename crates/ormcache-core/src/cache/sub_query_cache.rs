//! Shape-matching cache of recent results that can answer narrower queries.
//!
//! Eight weak slots indexed by `shape_hash & 7` plus one slot for the
//! all-rows query. Slots never keep a result alive; when the owning query
//! cache drops an entry its slot goes dead. Writers overwrite whatever is in
//! the slot.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use super::cached_query::{CachedQuery, CachedQueryFlags};
use super::query_cache::QueryCache;
use crate::operation::{Operation, ShapeMatchResult, SuperMatch};
use crate::order_by::OrderBy;
use crate::update_count::StalenessSnapshot;

/// Number of shape buckets. Must be a power of two.
pub const SUB_QUERY_SLOTS: usize = 8;

/// Results larger than this are not registered.
pub const MAX_SUB_QUERY_RESULT_SIZE: usize = 30_000;

type Slot<E> = RwLock<Weak<CachedQuery<E>>>;

pub struct SubQueryCache<E> {
    slots: [Slot<E>; SUB_QUERY_SLOTS],
    all: Slot<E>,
}

impl<E> SubQueryCache<E> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| RwLock::new(Weak::new())),
            all: RwLock::new(Weak::new()),
        }
    }

    fn bucket(operation: &Operation<E>) -> usize {
        (operation.shape_hash() as usize) & (SUB_QUERY_SLOTS - 1)
    }

    /// Offer a freshly cached query. Returns whether a slot took it.
    pub fn cache_query(&self, query: &Arc<CachedQuery<E>>) -> bool {
        if query.len() > MAX_SUB_QUERY_RESULT_SIZE {
            trace!(rows = query.len(), "Result too large for sub-query cache");
            return false;
        }
        let operation = query.operation();
        if operation.is_all() {
            *self.all.write() = Arc::downgrade(query);
            return true;
        }
        if operation.is_none() || !operation.is_shape_cachable() || query.flags().was_sub_query {
            return false;
        }
        *self.slots[Self::bucket(operation)].write() = Arc::downgrade(query);
        true
    }

    /// Live, unexpired candidates: shape buckets first, then the all slot.
    /// Time-to-live is checked once a candidate is looked up in the index.
    fn candidates(&self) -> impl Iterator<Item = Arc<CachedQuery<E>>> + '_ {
        self.slots
            .iter()
            .chain(std::iter::once(&self.all))
            .filter_map(|slot| slot.read().upgrade())
            .filter(|query| !query.is_expired())
    }

    /// Try to answer `operation` by filtering a cached superset.
    ///
    /// Matching runs on `analyzed` when given. The derived result is cached
    /// in `cache` under `operation`, and under `analyzed` as well when that
    /// differs.
    pub fn resolve_and_cache_sub_query(
        &self,
        cache: &QueryCache<E>,
        operation: &Operation<E>,
        analyzed: Option<&Operation<E>>,
        order_by: Option<&OrderBy<E>>,
        for_relationship: bool,
    ) -> Option<Arc<CachedQuery<E>>>
    where
        E: Send + Sync + 'static,
    {
        let target = analyzed.unwrap_or(operation);
        if target.is_all() || target.is_none() {
            return None;
        }
        for existing in self.candidates() {
            match target.shape_match(existing.operation()) {
                ShapeMatchResult::ExactMatch => {
                    trace!(%target, "Shape bucket holds an exact match");
                    return None;
                }
                ShapeMatchResult::SuperMatch(super_match) => {
                    if let Some(resolved) = self.resolve(
                        cache,
                        &existing,
                        super_match,
                        target,
                        order_by,
                        for_relationship,
                    ) {
                        return Some(self.store(
                            cache,
                            operation,
                            analyzed,
                            resolved,
                            for_relationship,
                        ));
                    }
                }
                ShapeMatchResult::NoMatch | ShapeMatchResult::NoMatchRequiresExact => {}
            }
        }
        None
    }

    fn resolve(
        &self,
        cache: &QueryCache<E>,
        existing: &Arc<CachedQuery<E>>,
        super_match: SuperMatch<E>,
        target: &Operation<E>,
        order_by: Option<&OrderBy<E>>,
        for_relationship: bool,
    ) -> Option<CachedQuery<E>>
    where
        E: Send + Sync + 'static,
    {
        if !super_match.filter.can_filter_in_memory() {
            return None;
        }
        // the index applies time-to-live and drops expired entries
        let Some(base) = cache.find_by_equality(&super_match.lookup, for_relationship) else {
            trace!(
                %target,
                lookup = %super_match.lookup,
                existing = %existing.operation(),
                "Lookup result no longer cached"
            );
            return None;
        };
        let base_snapshot = base.snapshot()?;

        // read before filtering so a racing update leaves the result expired
        let mut dependencies = Vec::new();
        target.collect_update_count_holders(&mut dependencies);
        if let Some(order_by) = order_by {
            order_by.collect_update_count_holders(&mut dependencies);
        }
        let snapshot = match StalenessSnapshot::read(dependencies)
            .and_then(|current| base_snapshot.merge(&current))
        {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(%target, base = %base.operation(), %error, "Could not merge snapshots");
                return None;
            }
        };
        if base.is_expired() {
            return None;
        }

        let rows = super_match.filter.apply_to(base.result());
        debug!(
            %target,
            base = %base.operation(),
            base_rows = base.len(),
            rows = rows.len(),
            tracked = snapshot.len(),
            "Resolved from sub-query cache"
        );
        Some(CachedQuery::derived(
            target.clone(),
            order_by.cloned(),
            &base,
            snapshot,
            rows,
        ))
    }

    fn store(
        &self,
        cache: &QueryCache<E>,
        operation: &Operation<E>,
        analyzed: Option<&Operation<E>>,
        resolved: CachedQuery<E>,
        for_relationship: bool,
    ) -> Arc<CachedQuery<E>>
    where
        E: Send + Sync + 'static,
    {
        let flags = CachedQueryFlags {
            for_relationship,
            was_defaulted: false,
            was_sub_query: true,
        };
        let order_by = resolved.order_by().cloned();
        let query = Arc::new(
            resolved
                .clone_for_equivalent_operation(operation.clone(), order_by.clone())
                .with_flags(flags),
        );
        cache.put(query.clone(), for_relationship);

        if let Some(analyzed) = analyzed.filter(|a| *a != operation) {
            let canonical = resolved
                .clone_for_equivalent_operation(analyzed.clone(), order_by)
                .with_flags(CachedQueryFlags {
                    was_defaulted: true,
                    ..flags
                });
            cache.put(Arc::new(canonical), for_relationship);
        }
        query
    }

    /// Empty every slot.
    pub fn clear(&self) {
        for slot in self.slots.iter().chain(std::iter::once(&self.all)) {
            *slot.write() = Weak::new();
        }
    }

    /// Number of slots holding a live result.
    pub fn live_entries(&self) -> usize {
        self.slots
            .iter()
            .chain(std::iter::once(&self.all))
            .filter(|slot| slot.read().strong_count() > 0)
            .count()
    }
}

impl<E> Default for SubQueryCache<E> {
    fn default() -> Self {
        Self::new()
    }
}
