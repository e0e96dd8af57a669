//! Prefetch requests and per-call options.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use crate::prefetch::error::{LoadError, Result};
use crate::prefetch::fetcher::{loader_fn, Loader};
use crate::prefetch::key::{KeyPart, RouteKey};

/// What to prefetch and how to load it. Immutable once built.
#[derive(Clone)]
pub struct PrefetchRequest {
    key: RouteKey,
    loader: Loader,
    stale_time: Option<Duration>,
}

impl PrefetchRequest {
    /// Build a request from key parts and an async loader.
    ///
    /// Fails if the key is empty or cannot be encoded.
    pub fn new<F, Fut>(parts: Vec<KeyPart>, loader: F) -> Result<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Bytes, LoadError>> + Send + 'static,
    {
        Ok(Self::with_loader(RouteKey::new(parts)?, loader_fn(loader)))
    }

    pub fn with_loader(key: RouteKey, loader: Loader) -> Self {
        Self {
            key,
            loader,
            stale_time: None,
        }
    }

    /// Per-request staleness override; wins over [`PrefetchOptions::stale_time`].
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn key(&self) -> &RouteKey {
        &self.key
    }

    pub fn loader(&self) -> Loader {
        self.loader.clone()
    }

    pub fn stale_time(&self) -> Option<Duration> {
        self.stale_time
    }
}

impl fmt::Debug for PrefetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchRequest")
            .field("key", &self.key)
            .field("stale_time", &self.stale_time)
            .finish_non_exhaustive()
    }
}

/// Per-call options. Unset values fall back to the coordinator's
/// [`PrefetchConfig`](crate::config::PrefetchConfig).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchOptions {
    /// Wait this long before fetching. Zero fetches inline.
    pub delay: Option<Duration>,

    /// Advisory: the caller intends this request for a hover trigger.
    pub on_hover: bool,

    /// How long a success suppresses repeats.
    pub stale_time: Option<Duration>,
}

impl PrefetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn on_hover(mut self, on_hover: bool) -> Self {
        self.on_hover = on_hover;
        self
    }
}
