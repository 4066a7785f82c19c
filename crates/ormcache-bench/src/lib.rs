//! ormcache benchmark suite
//!
//! Criterion benchmarks for the query cache.
//!
//! # Benchmark Categories
//!
//! - **Cache**: exact hits, canonical hits, sub-query resolution, store misses
//! - **Filter**: shape matching, simplification, in-memory and store-side filtering
//! - **Serialization**: compiled query IR through rkyv and JSON

pub mod fixtures;
pub mod harness;

pub use fixtures::{generate_trades, Scale, Trade, TradeAttributes};
pub use harness::TestContext;
