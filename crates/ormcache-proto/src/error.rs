//! Protocol error types.

use thiserror::Error;

/// Errors raised while building or encoding store-facing IR.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A filter node referenced a node index that does not exist.
    #[error("filter node {index} out of range (arena holds {len} nodes)")]
    DanglingNode { index: u32, len: usize },

    /// Invalid filter structure.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}
