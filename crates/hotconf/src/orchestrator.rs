//! Phased reload orchestration.
//!
//! A [`ReloadOrchestrator`] turns one accepted change event into a completed
//! in-memory refresh:
//!
//! 1. the cycle is scheduled on the async lane after a settle delay, letting
//!    the write that caused the event finish flushing to disk;
//! 2. every before-hook is dispatched to its lane, with a countdown barrier
//!    sized to the before-hook count;
//! 3. the cycle waits on the barrier up to a fixed timeout; the wait is
//!    best-effort rather than a hard precondition: a timed-out wait proceeds
//!    anyway, a cancelled wait aborts the cycle entirely;
//! 4. the serializer's load replaces the in-memory value; a load failure
//!    ends the cycle (no after-hooks) and is logged;
//! 5. after-hooks are dispatched fire-and-forget.
//!
//! Before-hooks get a barrier because they often must run before the new
//! values are read (flush, validate, warn); after-hooks react to
//! already-applied values and must not delay availability of the reloaded
//! configuration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::barrier::{ArrivalGuard, BarrierWait, ReloadBarrier};
use crate::dispatch::Dispatcher;
use crate::event::ChangeKind;
use crate::hooks::{HookAffinity, HookHandle, ReloadPhase};
use crate::serializer::ConfigSerializer;
use crate::wrapper::ConfigWrapper;

/// Timing knobs for the reload protocol.
///
/// Fixed at orchestrator construction; not negotiable per call.
#[derive(Debug, Clone, Copy)]
pub struct ReloadOptions {
    /// Pause between observing a change and starting the cycle.
    pub settle_delay: Duration,
    /// Upper bound on the before-hook barrier wait.
    pub barrier_timeout: Duration,
}

impl ReloadOptions {
    /// Set the settle delay.
    #[must_use]
    pub const fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the barrier timeout.
    #[must_use]
    pub const fn barrier_timeout(mut self, timeout: Duration) -> Self {
        self.barrier_timeout = timeout;
        self
    }
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(200),
            barrier_timeout: Duration::from_secs(4),
        }
    }
}

/// Runs the two-phase callback barrier and the serializer load for accepted
/// change events.
pub struct ReloadOrchestrator {
    dispatcher: Arc<dyn Dispatcher>,
    options: ReloadOptions,
    shutdown: AtomicBool,
    /// Live barriers for in-flight cycles, cancelled on shutdown.
    pending: Mutex<Vec<std::sync::Weak<ReloadBarrier>>>,
}

impl ReloadOrchestrator {
    /// Create an orchestrator dispatching onto `dispatcher` with the given
    /// timing options.
    #[must_use]
    pub fn new(dispatcher: Arc<dyn Dispatcher>, options: ReloadOptions) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            options,
            shutdown: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
        })
    }

    /// The orchestrator's timing options.
    #[must_use]
    pub const fn options(&self) -> ReloadOptions {
        self.options
    }

    /// Register the reload listener for `wrapper` on its watched location.
    ///
    /// The listener accepts `{Created, Modified}` events only and schedules
    /// a reload cycle per accepted, non-deduplicated event. Listener work is
    /// enqueue-only; nothing heavy runs on the watch thread.
    pub fn bind<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        wrapper: &Arc<ConfigWrapper<T>>,
        serializer: &Arc<dyn ConfigSerializer<T>>,
    ) {
        let orchestrator = self.clone();
        let wrapper_for_listener = wrapper.clone();
        let serializer = serializer.clone();

        wrapper.location().add_listener(
            ChangeKind::RELOAD_DEFAULT,
            Arc::new(move |event| {
                tracing::debug!(event = %event, "scheduling configuration reload");
                orchestrator.schedule_reload(&wrapper_for_listener, &serializer);
                Ok(())
            }),
        );
    }

    /// Schedule one reload cycle for `wrapper` on the async lane, after the
    /// settle delay.
    ///
    /// Cycles for the same wrapper are not serialized: two qualifying events
    /// spaced beyond both the dedup window and the settle delay can launch
    /// overlapping cycles racing on the same instance. Callers that cannot
    /// tolerate eventually-consistent reads must coordinate externally.
    pub fn schedule_reload<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        wrapper: &Arc<ConfigWrapper<T>>,
        serializer: &Arc<dyn ConfigSerializer<T>>,
    ) {
        let orchestrator = self.clone();
        let wrapper = wrapper.clone();
        let serializer = serializer.clone();
        let settle = self.options.settle_delay;

        self.dispatcher.run_async(Box::new(move || {
            // Let the write that produced the event finish flushing.
            if !settle.is_zero() {
                thread::sleep(settle);
            }
            orchestrator.run_cycle(&wrapper, &serializer);
        }));
    }

    /// Cancel in-flight barrier waits and refuse further cycles.
    ///
    /// A cycle whose wait is cancelled aborts entirely: no load, no
    /// after-hooks. Cycles already past their barrier run to completion.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let pending = std::mem::take(&mut *self.pending.lock());
        for weak in pending {
            if let Some(barrier) = weak.upgrade() {
                barrier.cancel();
            }
        }
    }

    /// Whether `shutdown()` has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn run_cycle<T: Send + Sync + 'static>(
        &self,
        wrapper: &Arc<ConfigWrapper<T>>,
        serializer: &Arc<dyn ConfigSerializer<T>>,
    ) {
        if self.is_shut_down() {
            return;
        }

        let hooks = wrapper.hooks();
        let before_count = hooks.before_count();
        let barrier = Arc::new(ReloadBarrier::new(before_count));
        self.track(&barrier);

        for handle in hooks.partition(ReloadPhase::Before, HookAffinity::Async) {
            self.dispatch_before(handle.clone(), &barrier);
        }
        for handle in hooks.partition(ReloadPhase::Before, HookAffinity::Sync) {
            self.dispatch_before(handle.clone(), &barrier);
        }

        if before_count > 0 {
            match barrier.wait(self.options.barrier_timeout) {
                BarrierWait::Cancelled => {
                    tracing::debug!(
                        path = %wrapper.relative_path().display(),
                        "reload cycle cancelled before load"
                    );
                    return;
                }
                BarrierWait::TimedOut => {
                    tracing::warn!(
                        path = %wrapper.relative_path().display(),
                        outstanding = barrier.remaining(),
                        "before-reload hooks did not finish in time; proceeding"
                    );
                }
                BarrierWait::Completed => {}
            }
        }

        if let Err(err) = serializer.load(wrapper) {
            tracing::error!(
                path = %wrapper.destination().display(),
                error = %err,
                "configuration reload failed; previous values retained"
            );
            return;
        }
        tracing::debug!(
            path = %wrapper.relative_path().display(),
            "configuration reloaded"
        );

        for handle in hooks.partition(ReloadPhase::After, HookAffinity::Async) {
            let handle = handle.clone();
            self.dispatcher
                .run_async(Box::new(move || handle.run_logged()));
        }
        for handle in hooks.partition(ReloadPhase::After, HookAffinity::Sync) {
            let handle = handle.clone();
            self.dispatcher
                .run_on_affinity(Box::new(move || handle.run_logged()));
        }
    }

    /// Dispatch one before-hook to its lane, guaranteeing exactly one barrier
    /// arrival whether the hook returns, errors, or panics.
    fn dispatch_before(&self, handle: HookHandle, barrier: &Arc<ReloadBarrier>) {
        let guard = ArrivalGuard::new(barrier.clone());
        let affinity = handle.affinity();
        let task = Box::new(move || {
            let _arrive_on_exit = guard;
            handle.run_logged();
        });

        match affinity {
            HookAffinity::Async => self.dispatcher.run_async(task),
            HookAffinity::Sync => self.dispatcher.run_on_affinity(task),
        }
    }

    fn track(&self, barrier: &Arc<ReloadBarrier>) {
        let mut pending = self.pending.lock();
        pending.retain(|weak| weak.strong_count() > 0);
        pending.push(Arc::downgrade(barrier));
    }
}

impl std::fmt::Debug for ReloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadOrchestrator")
            .field("options", &self.options)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ReloadOptions::default();
        assert_eq!(options.settle_delay, Duration::from_millis(200));
        assert_eq!(options.barrier_timeout, Duration::from_secs(4));
    }

    #[test]
    fn test_options_builders() {
        let options = ReloadOptions::default()
            .settle_delay(Duration::from_millis(1))
            .barrier_timeout(Duration::from_millis(50));
        assert_eq!(options.settle_delay, Duration::from_millis(1));
        assert_eq!(options.barrier_timeout, Duration::from_millis(50));
    }
}
