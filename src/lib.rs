//! route-prefetch: speculative route prefetching with dedup and expiry.
//!
//! Decides when to warm data for routes the user has not visited yet,
//! suppresses repeat prefetches for the same route within a staleness
//! window, and cancels its own timers on teardown. Payload storage belongs
//! to a fetch-if-stale runtime; see [`prefetch::FetchIfStale`].
//!
//! The `route-prefetch` binary wraps a coordinator in a small HTTP sidecar.

pub mod config;
pub mod prefetch;
pub mod server;

pub use prefetch::{
    FetchIfStale, HoverHandlers, KeyPart, PrefetchCoordinator, PrefetchError, PrefetchOptions,
    PrefetchRequest, QueryCache, RouteKey,
};
