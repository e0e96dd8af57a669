//! The fetch-if-stale collaborator.
//!
//! The coordinator never stores payloads. It hands a key, a loader and a
//! staleness window to a [`FetchIfStale`] runtime, which owns the payload
//! cache and decides whether the loader actually needs to run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::prefetch::error::{FetchError, LoadError};
use crate::prefetch::key::RouteKey;

/// Zero-argument async loader producing an opaque payload.
pub type Loader = Arc<dyn Fn() -> BoxFuture<'static, Result<Bytes, LoadError>> + Send + Sync>;

/// Wrap an async closure as a [`Loader`].
pub fn loader_fn<F, Fut>(f: F) -> Loader
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, LoadError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Remote data-fetching runtime contract.
#[async_trait]
pub trait FetchIfStale: Send + Sync {
    /// Run `loader` unless the runtime already holds data for `key` younger
    /// than `stale_time`. Any error counts as a prefetch failure.
    async fn fetch_if_stale(
        &self,
        key: &RouteKey,
        loader: Loader,
        stale_time: Duration,
    ) -> Result<(), FetchError>;
}

/// A payload held by [`QueryCache`].
#[derive(Debug, Clone)]
pub struct CachedPayload {
    pub data: Bytes,
    pub fetched_at: Instant,
}

impl CachedPayload {
    fn is_fresh(&self, stale_time: Duration, now: Instant) -> bool {
        now.duration_since(self.fetched_at) < stale_time
    }
}

/// In-memory fetch-if-stale runtime.
///
/// Payloads are kept until overwritten; eviction is not this crate's concern.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: RwLock<HashMap<RouteKey, CachedPayload>>,
    loads: AtomicU64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached payload for `key`, fresh or not.
    pub fn get(&self, key: &RouteKey) -> Option<CachedPayload> {
        self.entries.read().get(key).cloned()
    }

    /// Number of loader invocations so far.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl FetchIfStale for QueryCache {
    async fn fetch_if_stale(
        &self,
        key: &RouteKey,
        loader: Loader,
        stale_time: Duration,
    ) -> Result<(), FetchError> {
        let fresh = self
            .entries
            .read()
            .get(key)
            .is_some_and(|entry| entry.is_fresh(stale_time, Instant::now()));
        if fresh {
            debug!(key = %key, "Cached payload still fresh, skipping load");
            return Ok(());
        }

        self.loads.fetch_add(1, Ordering::Relaxed);
        let data = loader().await?;

        debug!(key = %key, bytes = data.len(), "Stored payload");
        self.entries.write().insert(
            key.clone(),
            CachedPayload {
                data,
                fetched_at: Instant::now(),
            },
        );
        Ok(())
    }
}
