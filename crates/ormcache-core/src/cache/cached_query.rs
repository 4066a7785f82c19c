//! A materialized query result and its staleness snapshot.

use std::fmt;
use std::sync::Arc;

use crate::operation::Operation;
use crate::order_by::OrderBy;
use crate::update_count::{StalenessSnapshot, UpdateCountHolder};

/// Materialized rows. Small results avoid a slice allocation.
pub enum QueryResult<E> {
    Empty,
    One(Arc<E>),
    Many(Arc<[Arc<E>]>),
}

impl<E> QueryResult<E> {
    pub fn from_vec(mut rows: Vec<Arc<E>>) -> Self {
        match rows.len() {
            0 => QueryResult::Empty,
            1 => QueryResult::One(rows.swap_remove(0)),
            _ => QueryResult::Many(rows.into()),
        }
    }

    pub fn as_slice(&self) -> &[Arc<E>] {
        match self {
            QueryResult::Empty => &[],
            QueryResult::One(row) => std::slice::from_ref(row),
            QueryResult::Many(rows) => rows,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, QueryResult::Empty)
    }
}

impl<E> Clone for QueryResult<E> {
    fn clone(&self) -> Self {
        match self {
            QueryResult::Empty => QueryResult::Empty,
            QueryResult::One(row) => QueryResult::One(row.clone()),
            QueryResult::Many(rows) => QueryResult::Many(rows.clone()),
        }
    }
}

/// How a cached query came to be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachedQueryFlags {
    /// Loaded to resolve a relationship rather than a top-level find.
    pub for_relationship: bool,
    /// Cached under the canonical form of the operation the caller used.
    pub was_defaulted: bool,
    /// Derived in memory from another cached result.
    pub was_sub_query: bool,
}

/// Operation, ordering, rows and the counters the rows were read under.
pub struct CachedQuery<E> {
    operation: Operation<E>,
    order_by: Option<OrderBy<E>>,
    result: QueryResult<E>,
    snapshot: Option<StalenessSnapshot>,
    retrieved_at: Option<u64>,
    flags: CachedQueryFlags,
}

impl<E> CachedQuery<E> {
    /// Wrap store rows, sorting them when an ordering is given.
    ///
    /// `snapshot` must have been captured before the rows were read; `None`
    /// marks a query that must never be cached.
    pub fn new(
        operation: Operation<E>,
        order_by: Option<OrderBy<E>>,
        snapshot: Option<StalenessSnapshot>,
        mut rows: Vec<Arc<E>>,
    ) -> Self {
        if let Some(order_by) = &order_by {
            if rows.len() > 1 {
                order_by.sort(&mut rows);
            }
        }
        Self {
            operation,
            order_by,
            result: QueryResult::from_vec(rows),
            snapshot,
            retrieved_at: None,
            flags: CachedQueryFlags::default(),
        }
    }

    /// Result filtered from `base`.
    ///
    /// `snapshot` should be `base`'s snapshot merged with any holders the
    /// filter adds. The retrieval time is inherited from `base`.
    pub fn derived(
        operation: Operation<E>,
        order_by: Option<OrderBy<E>>,
        base: &CachedQuery<E>,
        snapshot: StalenessSnapshot,
        rows: Vec<Arc<E>>,
    ) -> Self {
        let mut query = Self::new(operation, order_by, Some(snapshot), rows);
        query.retrieved_at = base.retrieved_at;
        query.flags = CachedQueryFlags {
            was_sub_query: true,
            ..base.flags
        };
        query
    }

    pub fn with_flags(mut self, flags: CachedQueryFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Record when the rows were read from the store, in clock millis.
    pub fn with_retrieved_at(mut self, millis: u64) -> Self {
        self.retrieved_at = Some(millis);
        self
    }

    /// When the rows were read from the store. Time-to-live is measured
    /// from here rather than from the time an entry was indexed.
    pub fn retrieved_at(&self) -> Option<u64> {
        self.retrieved_at
    }

    pub fn operation(&self) -> &Operation<E> {
        &self.operation
    }

    pub fn order_by(&self) -> Option<&OrderBy<E>> {
        self.order_by.as_ref()
    }

    /// Rows in result order. Never mutable; see
    /// [`to_modifiable_list`](Self::to_modifiable_list).
    pub fn result(&self) -> &[Arc<E>] {
        self.result.as_slice()
    }

    pub fn len(&self) -> usize {
        self.result.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    pub fn flags(&self) -> CachedQueryFlags {
        self.flags
    }

    pub fn snapshot(&self) -> Option<&StalenessSnapshot> {
        self.snapshot.as_ref()
    }

    /// Whether the query may be stored in a cache.
    pub fn prepare_to_cache_query(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Whether any tracked counter has moved. Queries without a snapshot
    /// are treated as expired.
    pub fn is_expired(&self) -> bool {
        self.snapshot.as_ref().map_or(true, StalenessSnapshot::is_expired)
    }

    /// Whether the snapshot tracks every given holder.
    pub fn covers(&self, holders: &[Arc<UpdateCountHolder>]) -> bool {
        self.snapshot.as_ref().is_some_and(|s| s.covers(holders))
    }

    /// A fresh list the caller may mutate.
    pub fn to_modifiable_list(&self) -> Vec<Arc<E>> {
        self.result().to_vec()
    }

    /// The same rows under an equivalent operation, resorted only when the
    /// ordering differs.
    pub fn clone_for_equivalent_operation(
        &self,
        operation: Operation<E>,
        order_by: Option<OrderBy<E>>,
    ) -> Self {
        let result = match &order_by {
            Some(order) if self.order_by.as_ref() != Some(order) && self.len() > 1 => {
                let mut rows = self.to_modifiable_list();
                order.sort(&mut rows);
                QueryResult::from_vec(rows)
            }
            _ => self.result.clone(),
        };
        Self {
            operation,
            order_by,
            result,
            snapshot: self.snapshot.clone(),
            retrieved_at: self.retrieved_at,
            flags: self.flags,
        }
    }

    /// `self` when it already satisfies `order_by`, otherwise a resorted copy.
    ///
    /// No requested ordering accepts any order.
    pub fn clone_if_different_order_by(
        self: &Arc<Self>,
        order_by: Option<&OrderBy<E>>,
    ) -> Arc<Self> {
        match order_by {
            Some(order) if self.order_by.as_ref() != Some(order) => Arc::new(
                self.clone_for_equivalent_operation(self.operation.clone(), Some(order.clone())),
            ),
            _ => self.clone(),
        }
    }
}

impl<E> fmt::Debug for CachedQuery<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedQuery")
            .field("operation", &self.operation)
            .field("order_by", &self.order_by)
            .field("rows", &self.len())
            .field("flags", &self.flags)
            .finish()
    }
}
