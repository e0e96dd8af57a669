//! Hover and focus triggers.
//!
//! Pointer transits over a link should not fetch anything, so mouse-enter
//! only arms a timer; the prefetch fires if the pointer is still there when
//! the hover-intent threshold elapses. Focus is stronger intent and fetches
//! right away.
//!
//! ```text
//! Idle    --enter--> Pending   (arm threshold timer)
//! Pending --leave--> Idle      (cancel timer, no fetch)
//! Pending --timer--> Idle      (prefetch with zero delay)
//! any     --focus--> unchanged (prefetch with zero delay)
//! ```
//!
//! The threshold timer is local to these handlers and is not tracked by the
//! coordinator's timer set. Dropping the handlers cancels it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::prefetch::coordinator::PrefetchCoordinator;
use crate::prefetch::request::{PrefetchOptions, PrefetchRequest};

#[derive(Debug)]
enum Phase {
    Idle,
    Pending { generation: u64, handle: AbortHandle },
}

#[derive(Debug)]
struct HoverState {
    phase: Phase,
    next_generation: u64,
}

/// Event handlers for one prefetchable target.
///
/// All handlers are synchronous and must be called from within a Tokio
/// runtime; any fetch they trigger runs on a spawned task.
pub struct HoverHandlers {
    coordinator: PrefetchCoordinator,
    request: PrefetchRequest,
    options: PrefetchOptions,
    threshold: Duration,
    state: Arc<Mutex<HoverState>>,
}

impl HoverHandlers {
    pub(crate) fn new(
        coordinator: PrefetchCoordinator,
        request: PrefetchRequest,
        options: PrefetchOptions,
        threshold: Duration,
    ) -> Self {
        Self {
            coordinator,
            request,
            // Handlers do their own waiting; the prefetch itself is immediate.
            options: options.with_delay(Duration::ZERO),
            threshold,
            state: Arc::new(Mutex::new(HoverState {
                phase: Phase::Idle,
                next_generation: 0,
            })),
        }
    }

    /// Pointer entered the target: arm the hover-intent timer.
    ///
    /// Entering again while already armed keeps the existing timer.
    pub fn on_mouse_enter(&self) {
        if self.coordinator.is_disposed() {
            return;
        }
        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Pending { .. }) {
            return;
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let shared = Arc::clone(&self.state);
        let coordinator = self.coordinator.clone();
        let request = self.request.clone();
        let options = self.options.clone();
        let threshold = self.threshold;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(threshold).await;
            {
                let mut state = shared.lock();
                let armed = matches!(
                    state.phase,
                    Phase::Pending { generation: current, .. } if current == generation
                );
                if !armed {
                    return;
                }
                state.phase = Phase::Idle;
            }
            debug!(key = %request.key(), "Hover intent confirmed");
            coordinator.prefetch(request, options).await;
        });

        state.phase = Phase::Pending {
            generation,
            handle: handle.abort_handle(),
        };
        debug!(
            key = %self.request.key(),
            ?threshold,
            "Hover armed"
        );
    }

    /// Pointer left the target: cancel a pending hover prefetch.
    pub fn on_mouse_leave(&self) {
        let previous = std::mem::replace(&mut self.state.lock().phase, Phase::Idle);
        if let Phase::Pending { handle, .. } = previous {
            handle.abort();
            debug!(key = %self.request.key(), "Hover cancelled before threshold");
        }
    }

    /// Target gained focus: prefetch now, regardless of hover state.
    pub fn on_focus(&self) {
        if self.coordinator.is_disposed() {
            return;
        }
        let coordinator = self.coordinator.clone();
        let request = self.request.clone();
        let options = self.options.clone();
        debug!(key = %request.key(), "Focus prefetch");
        tokio::spawn(async move {
            coordinator.prefetch(request, options).await;
        });
    }

    /// Whether a hover timer is armed.
    pub fn is_pending(&self) -> bool {
        matches!(self.state.lock().phase, Phase::Pending { .. })
    }
}

impl Drop for HoverHandlers {
    fn drop(&mut self) {
        if let Phase::Pending { handle, .. } = &self.state.lock().phase {
            handle.abort();
        }
    }
}
