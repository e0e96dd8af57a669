//! Error types for prefetching.

use thiserror::Error;

/// Result type for prefetch operations that can fail at the call site.
pub type Result<T> = std::result::Result<T, PrefetchError>;

/// Errors surfaced to callers of the coordinator.
///
/// Fetch failures never reach a caller of `prefetch`; they are logged and
/// swallowed. Only malformed keys, which indicate a programming error, are
/// reported.
#[derive(Error, Debug)]
pub enum PrefetchError {
    /// A route key must identify something.
    #[error("route key must contain at least one part")]
    EmptyKey,

    /// A key part cannot be encoded canonically.
    #[error("invalid route key: {0}")]
    InvalidKey(String),
}

/// Failure reported by a loader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct LoadError(pub String);

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure reported by the fetch-if-stale runtime.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The loader rejected.
    #[error("loader rejected: {0}")]
    Load(#[from] LoadError),

    /// The runtime refused the fetch.
    #[error("fetch rejected: {0}")]
    Rejected(String),
}
