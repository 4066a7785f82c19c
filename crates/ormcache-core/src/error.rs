//! Core error types.

use thiserror::Error;

/// Core cache errors.
///
/// A cache miss is never an error: lookups return `Option` and fall back to
/// the store. These variants are reserved for misconfiguration, requests the
/// store or an attribute cannot express, and internal defects.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid portal or query cache configuration.
    #[error("invalid configuration for {field}: {reason}")]
    Config {
        /// The offending setting.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Configuration could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The operation cannot be built, compiled or bound.
    #[error("unsupported operation {operation}: {reason}")]
    Unsupported {
        /// Rendered operation or operator name.
        operation: String,
        /// Why it is unsupported.
        reason: String,
    },

    /// An internal invariant was violated.
    #[error("internal inconsistency: {0}")]
    Inconsistency(String),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(String),

    /// Compiled IR error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ormcache_proto::Error),
}

impl Error {
    /// Shorthand for an [`Error::Unsupported`].
    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Unsupported {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`Error::Config`].
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Config {
            field,
            reason: reason.into(),
        }
    }
}
