//! Query result caching.
//!
//! A [`QueryCache`] maps operations to [`CachedQuery`] results through a
//! bounded [`LruQueryIndex`] or an unbounded [`FullQueryIndex`], and offers
//! every cached result to its [`SubQueryCache`] so narrower queries can be
//! answered by filtering in memory.

mod cached_query;
mod clock;
mod full_index;
mod index;
mod lru_index;
mod query_cache;
mod sub_query_cache;

pub use cached_query::{CachedQuery, CachedQueryFlags, QueryResult};
pub use clock::{CacheClock, ManualClock, SystemClock};
pub use full_index::FullQueryIndex;
pub use index::QueryIndex;
pub use lru_index::LruQueryIndex;
pub use query_cache::QueryCache;
pub use sub_query_cache::{SubQueryCache, MAX_SUB_QUERY_RESULT_SIZE, SUB_QUERY_SLOTS};
