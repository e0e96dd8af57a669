//! Route prefetching.
//!
//! This module contains the prefetch coordinator and its bookkeeping:
//! - [`key`]: RouteKey, KeyPart and the canonical key encoding
//! - [`ledger`]: Dedup ledger (absent / pending / present per key)
//! - [`timers`]: Tracked delay and expiry timers with bulk cancellation
//! - [`fetcher`]: The fetch-if-stale collaborator and an in-memory runtime
//! - [`request`]: PrefetchRequest and PrefetchOptions
//! - [`coordinator`]: PrefetchCoordinator, the public entry point
//! - [`hover`]: Debounced hover and focus triggers
//! - [`stats`]: Prefetch counters

pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod hover;
pub mod key;
pub mod ledger;
pub mod request;
pub mod stats;
pub mod timers;

pub use coordinator::PrefetchCoordinator;
pub use error::{FetchError, LoadError, PrefetchError};
pub use fetcher::{loader_fn, FetchIfStale, Loader, QueryCache};
pub use hover::HoverHandlers;
pub use key::{KeyPart, RouteKey};
pub use request::{PrefetchOptions, PrefetchRequest};
pub use stats::PrefetchStatsSnapshot;
