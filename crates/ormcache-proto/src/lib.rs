//! ormcache store-facing IR.
//!
//! This crate defines the types exchanged between the query cache and a
//! backing store, using rkyv for zero-copy serialization and serde for
//! human-readable output.
//!
//! # Modules
//!
//! - [`value`] - Runtime values for parameters and entity projections
//! - [`filter`] - Compiled filter arena
//! - [`query`] - Compiled query and ordering specification
//! - [`error`] - Protocol error types
//!
//! # Serialization
//!
//! ```ignore
//! use ormcache_proto::{CompiledQuery, StoreFilter};
//!
//! let query = CompiledQuery::new("Order", StoreFilter::all());
//! let bytes = query.to_bytes()?;
//! let decoded = CompiledQuery::from_bytes(&bytes)?;
//! ```

pub mod error;
pub mod filter;
pub mod query;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use filter::{FilterBuilder, FilterNode, FilterOp, StoreFilter};
pub use query::{CompiledQuery, NullOrdering, OrderDirection, OrderSpec};
pub use value::Value;

/// Version of the compiled IR layout.
///
/// Stores that persist or forward compiled queries can use this to reject
/// buffers produced by an incompatible build.
pub const IR_VERSION: u32 = 1;
