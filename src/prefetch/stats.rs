//! Prefetch counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct PrefetchStats {
    pub requested: AtomicU64,
    pub deduplicated: AtomicU64,
    pub joined: AtomicU64,
    pub started: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub expired: AtomicU64,
    pub invalidated: AtomicU64,
    pub timers_cancelled: AtomicU64,
}

/// Point-in-time copy of [`PrefetchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchStatsSnapshot {
    /// Calls to `prefetch` on a live coordinator.
    pub requested: u64,
    /// Calls suppressed because the key was fresh or already being fetched.
    pub deduplicated: u64,
    /// Immediate calls that waited on someone else's in-flight fetch.
    pub joined: u64,
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub expired: u64,
    pub invalidated: u64,
    pub timers_cancelled: u64,
}

impl PrefetchStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PrefetchStatsSnapshot {
        PrefetchStatsSnapshot {
            requested: self.requested.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
            timers_cancelled: self.timers_cancelled.load(Ordering::Relaxed),
        }
    }
}

impl PrefetchStatsSnapshot {
    /// Counter values paired with stable names, for exporters.
    pub fn events(&self) -> [(&'static str, u64); 9] {
        [
            ("requested", self.requested),
            ("deduplicated", self.deduplicated),
            ("joined", self.joined),
            ("started", self.started),
            ("succeeded", self.succeeded),
            ("failed", self.failed),
            ("expired", self.expired),
            ("invalidated", self.invalidated),
            ("timers_cancelled", self.timers_cancelled),
        ]
    }
}
