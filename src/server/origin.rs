//! Simulated origin backing the sidecar's loaders.
//!
//! The sidecar has no real upstream; each load sleeps for the configured
//! latency and returns a synthetic payload tagged with the route key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::config::OriginConfig;
use crate::prefetch::fetcher::{loader_fn, Loader};
use crate::prefetch::key::RouteKey;

#[derive(Debug)]
pub struct SimulatedOrigin {
    latency: Duration,
    payload_bytes: usize,
    loads: AtomicU64,
}

impl SimulatedOrigin {
    pub fn new(config: &OriginConfig) -> Self {
        Self {
            latency: Duration::from_millis(config.latency_ms),
            payload_bytes: config.payload_bytes,
            loads: AtomicU64::new(0),
        }
    }

    /// A loader that fetches `key` from this origin.
    pub fn loader(self: &Arc<Self>, key: &RouteKey) -> Loader {
        let origin = Arc::clone(self);
        let key = key.clone();
        loader_fn(move || {
            let origin = Arc::clone(&origin);
            let key = key.clone();
            async move {
                tokio::time::sleep(origin.latency).await;
                origin.loads.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Origin load complete");
                Ok(origin.payload_for(&key))
            }
        })
    }

    fn payload_for(&self, key: &RouteKey) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload_bytes);
        let tag = key.as_str().as_bytes();
        buf.put_slice(&tag[..tag.len().min(self.payload_bytes)]);
        buf.resize(self.payload_bytes, 0);
        buf.freeze()
    }

    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}
