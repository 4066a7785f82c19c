use std::sync::Arc;

use super::cached_query::CachedQuery;
use crate::operation::Operation;

/// Exact-match storage behind a [`QueryCache`](super::QueryCache).
///
/// Implementations drop expired entries when they find them; `get` never
/// returns a query whose snapshot has moved.
pub trait QueryIndex<E>: Send + Sync {
    /// Look up by operation equality.
    fn get(&self, operation: &Operation<E>, for_relationship: bool) -> Option<Arc<CachedQuery<E>>>;

    /// Store `query` under its operation, replacing any previous entry.
    fn put(&self, query: Arc<CachedQuery<E>>, for_relationship: bool);

    fn clear(&self);

    /// Approximate number of entries, possibly counting expired ones.
    fn rough_size(&self) -> usize;
}
