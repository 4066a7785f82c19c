//! Backing store interface.
//!
//! The cache never talks to a database directly. A [`Store`] receives a
//! [`CompiledQuery`] and returns materialized rows; mutation code owns the
//! update counters and bumps them before a change becomes visible.

mod evaluator;
mod memory;

pub use evaluator::{full_text_match, StoreFilterEvaluator};
pub use memory::MemoryStore;

use std::sync::Arc;

use ormcache_proto::{CompiledQuery, FilterOp};

use crate::error::Error;

/// Executes compiled queries for one entity type.
pub trait Store<E>: Send + Sync {
    /// Run the query and return matching rows.
    ///
    /// Row order follows `query.order_by` when it is non-empty and is
    /// unspecified otherwise.
    fn execute(&self, query: &CompiledQuery) -> Result<Vec<Arc<E>>, Error>;

    /// Whether the store can evaluate the operator.
    fn supports(&self, _op: FilterOp) -> bool {
        true
    }
}
