//! Prefetch coordinator: decides whether a route is fetched now, later, or
//! not at all, and keeps the dedup ledger and timer set consistent with that.
//!
//! Flow for one call:
//! 1. Resolve delay and staleness window from options and config
//! 2. Delay of zero: admit through the ledger and fetch inline
//! 3. Otherwise: skip if the key is fresh or in flight, else schedule a
//!    tracked delay timer that admits and fetches when it fires
//! 4. On success: promote the key and schedule a tracked expiry timer
//! 5. On failure: drop the pending entry and log; callers never see it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::PrefetchConfig;
use crate::prefetch::fetcher::FetchIfStale;
use crate::prefetch::hover::HoverHandlers;
use crate::prefetch::key::RouteKey;
use crate::prefetch::ledger::{Admission, DedupLedger, LedgerState, Ticket};
use crate::prefetch::request::{PrefetchOptions, PrefetchRequest};
use crate::prefetch::stats::{PrefetchStats, PrefetchStatsSnapshot};
use crate::prefetch::timers::TimerSet;

/// Handle to a prefetch coordinator.
///
/// Clones share the same ledger and timers. Dropping the last handle tears
/// the coordinator down just like [`dispose`](Self::dispose). Every
/// [`HoverHandlers`] and every task spawned by a focus event holds a handle,
/// so those must be gone too; call `dispose` to tear down while they live.
#[derive(Clone)]
pub struct PrefetchCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: Arc<dyn FetchIfStale>,
    ledger: Mutex<DedupLedger>,
    timers: TimerSet,
    config: PrefetchConfig,
    stats: PrefetchStats,
    disposed: AtomicBool,
}

/// Releases a pending ledger entry unless the fetch was promoted.
///
/// Covers both failure and the fetch future being dropped mid-flight.
struct PendingGuard<'a> {
    ledger: &'a Mutex<DedupLedger>,
    key: &'a RouteKey,
    ticket: Ticket,
    armed: bool,
}

impl PendingGuard<'_> {
    fn promote(mut self) -> bool {
        self.armed = false;
        self.ledger.lock().promote(self.key, self.ticket)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.ledger.lock().abandon(self.key, self.ticket);
        }
    }
}

impl PrefetchCoordinator {
    /// Create a coordinator driving `fetcher`.
    pub fn new(fetcher: Arc<dyn FetchIfStale>, config: PrefetchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                ledger: Mutex::new(DedupLedger::new()),
                timers: TimerSet::new(),
                config,
                stats: PrefetchStats::default(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Prefetch one route.
    ///
    /// With a zero delay this resolves once the fetch settles (or once the
    /// in-flight fetch it joined settles). With a positive delay it resolves
    /// immediately and the fetch runs when the timer fires. Never fails:
    /// fetch errors are logged and dropped.
    pub async fn prefetch(&self, request: PrefetchRequest, options: PrefetchOptions) {
        let inner = &self.inner;
        if inner.is_disposed() {
            debug!(key = %request.key(), "Coordinator disposed, ignoring prefetch");
            return;
        }
        PrefetchStats::bump(&inner.stats.requested);

        let delay = options
            .delay
            .unwrap_or_else(|| inner.config.default_delay());
        let stale_time = request
            .stale_time()
            .or(options.stale_time)
            .unwrap_or_else(|| inner.config.stale_time());

        if delay.is_zero() {
            inner.run(request, stale_time).await;
            return;
        }

        let state = inner.ledger.lock().state(request.key());
        if state != LedgerState::Absent {
            PrefetchStats::bump(&inner.stats.deduplicated);
            debug!(key = %request.key(), ?state, "Already prefetched, skipping delayed prefetch");
            return;
        }

        let key = request.key().clone();
        let weak = Arc::downgrade(inner);
        let scheduled = inner.timers.schedule(delay, async move {
            if let Some(inner) = weak.upgrade() {
                inner.run(request, stale_time).await;
            }
        });
        match scheduled {
            Some(_) => debug!(
                key = %key,
                ?delay,
                on_hover = options.on_hover,
                "Scheduled delayed prefetch"
            ),
            None => debug!(key = %key, "Coordinator disposed, delayed prefetch dropped"),
        }
    }

    /// Prefetch several routes concurrently and wait for all of them.
    ///
    /// One request failing has no effect on its siblings.
    pub async fn prefetch_many<I>(&self, requests: I, options: PrefetchOptions)
    where
        I: IntoIterator<Item = PrefetchRequest>,
    {
        join_all(
            requests
                .into_iter()
                .map(|request| self.prefetch(request, options.clone())),
        )
        .await;
    }

    /// Build hover/focus handlers for one target.
    ///
    /// The hover-intent threshold is `options.delay`, or the configured
    /// hover delay when unset.
    pub fn hover_handlers(
        &self,
        request: PrefetchRequest,
        options: PrefetchOptions,
    ) -> HoverHandlers {
        let threshold = options
            .delay
            .unwrap_or_else(|| self.inner.config.hover_delay());
        HoverHandlers::new(self.clone(), request, options, threshold)
    }

    /// Forget that `key` was prefetched, so the next request fetches again.
    ///
    /// Any expiry timer for the key stays scheduled and later finds nothing
    /// to remove. Returns whether an entry was removed.
    pub fn clear_prefetch(&self, key: &RouteKey) -> bool {
        let removed = self.inner.ledger.lock().remove(key);
        if removed {
            PrefetchStats::bump(&self.inner.stats.invalidated);
            debug!(key = %key, "Invalidated prefetch");
        }
        removed
    }

    /// Forget every prefetched key. Outstanding timers are left alone.
    ///
    /// In-flight fetches are dropped too, so their results are discarded,
    /// but only fresh keys count towards the returned total.
    pub fn clear_all_prefetch(&self) -> usize {
        let removed = self.inner.ledger.lock().clear();
        PrefetchStats::add(&self.inner.stats.invalidated, removed);
        debug!(removed, "Invalidated all prefetches");
        removed
    }

    /// Cancel every outstanding timer and stop accepting work.
    ///
    /// Fetches already running are not interrupted, but their completion
    /// schedules nothing. Calling this more than once is a no-op.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Whether `key` is currently fresh in the ledger.
    pub fn is_prefetched(&self, key: &RouteKey) -> bool {
        self.inner.ledger.lock().state(key) == LedgerState::Present
    }

    /// Whether a fetch for `key` is in flight.
    pub fn is_pending(&self, key: &RouteKey) -> bool {
        self.inner.ledger.lock().state(key) == LedgerState::Pending
    }

    /// Number of fresh keys.
    pub fn ledger_len(&self) -> usize {
        self.inner.ledger.lock().len()
    }

    /// Number of keys with a fetch in flight.
    pub fn pending_fetches(&self) -> usize {
        self.inner.ledger.lock().pending_len()
    }

    /// Number of delay and expiry timers that have not fired yet.
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.len()
    }

    pub fn stats(&self) -> PrefetchStatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.inner.config
    }
}

impl Inner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let cancelled = self.timers.close();
        PrefetchStats::add(&self.stats.timers_cancelled, cancelled);
        info!(cancelled, "Prefetch coordinator disposed");
    }

    /// Admit, fetch and settle one request.
    async fn run(self: &Arc<Self>, request: PrefetchRequest, stale_time: Duration) {
        if self.is_disposed() {
            return;
        }
        let key = request.key();

        let admission = self.ledger.lock().try_begin(key);
        let ticket = match admission {
            Admission::Fresh => {
                PrefetchStats::bump(&self.stats.deduplicated);
                debug!(key = %key, "Already prefetched, skipping");
                return;
            }
            Admission::InFlight(mut settled) => {
                PrefetchStats::bump(&self.stats.deduplicated);
                PrefetchStats::bump(&self.stats.joined);
                debug!(key = %key, "Prefetch in flight, joining");
                // A closed channel means the entry was invalidated; either way we're done.
                let _ = settled.wait_for(Option::is_some).await;
                return;
            }
            Admission::Granted(ticket) => ticket,
        };

        let guard = PendingGuard {
            ledger: &self.ledger,
            key,
            ticket,
            armed: true,
        };
        PrefetchStats::bump(&self.stats.started);
        debug!(key = %key, ?stale_time, "Prefetch started");

        match self
            .fetcher
            .fetch_if_stale(key, request.loader(), stale_time)
            .await
        {
            Ok(()) => {
                if self.is_disposed() {
                    drop(guard);
                    debug!(key = %key, "Coordinator disposed while in flight, not recording");
                    return;
                }
                if !guard.promote() {
                    debug!(key = %key, "Invalidated while in flight, not recording");
                    return;
                }
                PrefetchStats::bump(&self.stats.succeeded);
                self.schedule_expiry(key.clone(), ticket, stale_time);
            }
            Err(e) => {
                drop(guard);
                PrefetchStats::bump(&self.stats.failed);
                warn!(key = %key, error = %e, "Prefetch failed");
            }
        }
    }

    fn schedule_expiry(self: &Arc<Self>, key: RouteKey, ticket: Ticket, stale_time: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let expiry_key = key.clone();
        let scheduled = self.timers.schedule(stale_time, async move {
            if let Some(inner) = weak.upgrade() {
                inner.expire(&expiry_key, ticket);
            }
        });
        match scheduled {
            Some(_) => debug!(key = %key, ?stale_time, "Prefetch recorded"),
            None => {
                // Disposed between promotion and here: an entry without an
                // expiry timer would stay fresh forever.
                self.ledger.lock().expire(&key, ticket);
                debug!(key = %key, "Coordinator disposed, entry dropped");
            }
        }
    }

    fn expire(&self, key: &RouteKey, ticket: Ticket) {
        if self.ledger.lock().expire(key, ticket) {
            PrefetchStats::bump(&self.stats.expired);
            debug!(key = %key, "Prefetch expired");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_parts;
    use crate::prefetch::error::{FetchError, LoadError};
    use crate::prefetch::fetcher::Loader;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runs the loader every time.
    struct Direct;

    #[async_trait]
    impl FetchIfStale for Direct {
        async fn fetch_if_stale(
            &self,
            _key: &RouteKey,
            loader: Loader,
            _stale_time: Duration,
        ) -> Result<(), FetchError> {
            loader().await?;
            Ok(())
        }
    }

    fn coordinator() -> PrefetchCoordinator {
        PrefetchCoordinator::new(Arc::new(Direct), PrefetchConfig::default())
    }

    fn request(id: i64, calls: &Arc<AtomicUsize>, fail: bool) -> PrefetchRequest {
        let calls = calls.clone();
        PrefetchRequest::new(key_parts!["users", id], move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(LoadError::new("boom"))
                } else {
                    Ok(Bytes::from_static(b"ok"))
                }
            }
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_time_precedence() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        // Request override (100ms) beats options (10s).
        let req = request(1, &calls, false).with_stale_time(Duration::from_millis(100));
        coordinator
            .prefetch(req, PrefetchOptions::new().with_stale_time(Duration::from_secs(10)))
            .await;
        let key = RouteKey::new(key_parts!["users", 1]).unwrap();
        assert!(coordinator.is_prefetched(&key));

        tokio::time::sleep(Duration::from_millis(101)).await;
        assert!(!coordinator.is_prefetched(&key));
        assert_eq!(coordinator.stats().expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_counts_and_leaves_no_timer() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        coordinator
            .prefetch(request(2, &calls, true), PrefetchOptions::new())
            .await;
        assert_eq!(coordinator.ledger_len(), 0);
        assert_eq!(coordinator.pending_timers(), 0);

        let stats = coordinator.stats();
        assert_eq!(stats.started, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_cancels_timers() {
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let coordinator = coordinator();
            coordinator
                .prefetch(
                    request(3, &calls, false),
                    PrefetchOptions::new().with_delay(Duration::from_millis(50)),
                )
                .await;
            assert_eq!(coordinator.pending_timers(), 1);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_prefetch_rechecks_ledger_on_fire() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        coordinator
            .prefetch(
                request(4, &calls, false),
                PrefetchOptions::new().with_delay(Duration::from_millis(50)),
            )
            .await;
        // Immediate prefetch lands before the timer fires.
        coordinator
            .prefetch(request(4, &calls, false), PrefetchOptions::new())
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prefetch_after_dispose_is_noop() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        coordinator.dispose();
        coordinator.dispose();
        assert!(coordinator.is_disposed());

        coordinator
            .prefetch(request(5, &calls, false), PrefetchOptions::new())
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.stats().requested, 0);
    }
}
