//! Tracked timers.
//!
//! Every timer scheduled here is a Tokio task that sleeps and then runs a
//! callback. A timer leaves the set exactly once: either it removes itself
//! when it fires (before its callback runs), or [`TimerSet::close`] aborts it.
//! Once the callback has started the timer is no longer tracked and can no
//! longer be cancelled.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::debug;

/// Identifies a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Default)]
struct TimerState {
    next_id: u64,
    handles: HashMap<TimerId, AbortHandle>,
    closed: bool,
}

/// The set of outstanding timers owned by one coordinator.
#[derive(Debug, Default)]
pub struct TimerSet {
    state: Arc<Mutex<TimerState>>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`.
    ///
    /// Returns `None` (and drops `task`) once the set is closed. Must be
    /// called from within a Tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> Option<TimerId>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }

        let id = TimerId(state.next_id);
        state.next_id += 1;

        let registry = Arc::downgrade(&self.state);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(registry) = registry.upgrade() else {
                return;
            };
            // Self-removal blocks until `schedule` has finished inserting.
            if registry.lock().handles.remove(&id).is_none() {
                return;
            }
            drop(registry);
            task.await;
        });

        state.handles.insert(id, handle.abort_handle());
        Some(id)
    }

    /// Abort every outstanding timer and refuse new ones.
    ///
    /// Returns the number of timers aborted; a second call returns 0.
    pub fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let cancelled = state.handles.len();
        for (_, handle) in state.handles.drain() {
            handle.abort();
        }
        if cancelled > 0 {
            debug!(cancelled, "Cancelled outstanding timers");
        }
        cancelled
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn len(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
