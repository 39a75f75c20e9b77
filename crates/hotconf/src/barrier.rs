//! Best-effort countdown barrier for before-reload hooks.
//!
//! The reload protocol waits for its before-hooks with a bounded timeout:
//! completions beyond the timeout are simply ignored, and a cancellation
//! signal aborts the wait entirely. Built on a counter plus
//! [`parking_lot::Condvar`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Outcome of a barrier wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierWait {
    /// Every expected arrival happened before the timeout.
    Completed,
    /// The timeout elapsed with arrivals outstanding.
    TimedOut,
    /// The barrier was cancelled while waiting.
    Cancelled,
}

#[derive(Debug)]
struct State {
    remaining: usize,
    cancelled: bool,
}

/// Countdown barrier with a timeout escape and explicit cancellation.
#[derive(Debug)]
pub struct ReloadBarrier {
    state: Mutex<State>,
    condvar: Condvar,
}

impl ReloadBarrier {
    /// Create a barrier expecting `count` arrivals.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            state: Mutex::new(State {
                remaining: count,
                cancelled: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Record one arrival. Arrivals beyond the expected count are ignored.
    pub fn arrive(&self) {
        let mut state = self.state.lock();
        if state.remaining > 0 {
            state.remaining -= 1;
            if state.remaining == 0 {
                self.condvar.notify_all();
            }
        }
    }

    /// Cancel the barrier, waking any waiter with [`BarrierWait::Cancelled`].
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        self.condvar.notify_all();
    }

    /// Wait until all arrivals happen, the timeout elapses, or the barrier
    /// is cancelled.
    pub fn wait(&self, timeout: Duration) -> BarrierWait {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return BarrierWait::Cancelled;
            }
            if state.remaining == 0 {
                return BarrierWait::Completed;
            }
            if self.condvar.wait_until(&mut state, deadline).timed_out() {
                if state.cancelled {
                    return BarrierWait::Cancelled;
                }
                if state.remaining == 0 {
                    return BarrierWait::Completed;
                }
                return BarrierWait::TimedOut;
            }
        }
    }

    /// Number of arrivals still outstanding.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.state.lock().remaining
    }
}

/// Guard that arrives at its barrier exactly once when dropped.
///
/// Wrapping a hook invocation in this guard guarantees the arrival happens
/// whether the hook returns, errors, or panics while unwinding.
pub(crate) struct ArrivalGuard(Arc<ReloadBarrier>);

impl ArrivalGuard {
    pub(crate) fn new(barrier: Arc<ReloadBarrier>) -> Self {
        Self(barrier)
    }
}

impl Drop for ArrivalGuard {
    fn drop(&mut self) {
        self.0.arrive();
    }
}
