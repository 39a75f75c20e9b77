//! Callback-execution lanes.
//!
//! The engine dispatches work onto two logical lanes: an asynchronous
//! pool-backed lane and a synchronous affinity-bound lane (on a game host,
//! the main-loop tick; on a server, any single-threaded executor). The
//! [`Dispatcher`] trait is the boundary; hosts substitute their own
//! implementation, and [`ThreadDispatcher`] is the bundled default.
//!
//! Both lanes must eventually execute submitted tasks and must not silently
//! drop them. The affinity lane additionally runs tasks in submission order.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::WatchError;

/// A unit of work submitted to a lane.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Two-lane task execution boundary supplied by the host platform.
pub trait Dispatcher: Send + Sync {
    /// Run a task on the asynchronous pool lane.
    fn run_async(&self, task: Task);

    /// Run a task on the synchronous affinity-bound lane.
    ///
    /// Tasks submitted here execute in submission order. No relative ordering
    /// with the async lane is guaranteed.
    fn run_on_affinity(&self, task: Task);
}

/// Default [`Dispatcher`]: a small bounded worker pool for the async lane
/// and one dedicated thread for the affinity lane.
pub struct ThreadDispatcher {
    pool_tx: Option<Sender<Task>>,
    affinity_tx: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadDispatcher {
    /// Default async-lane worker count.
    pub const DEFAULT_WORKERS: usize = 2;

    /// Create a dispatcher with [`Self::DEFAULT_WORKERS`] pool workers.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InitFailed`] if a lane thread cannot be spawned.
    pub fn new() -> Result<Self, WatchError> {
        Self::with_workers(Self::DEFAULT_WORKERS)
    }

    /// Create a dispatcher with `workers` pool workers (at least one).
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InitFailed`] if a lane thread cannot be spawned.
    pub fn with_workers(workers: usize) -> Result<Self, WatchError> {
        let workers = workers.max(1);
        let (pool_tx, pool_rx) = unbounded::<Task>();
        let (affinity_tx, affinity_rx) = unbounded::<Task>();

        let mut handles = Vec::with_capacity(workers + 1);
        for index in 0..workers {
            let rx = pool_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("hotconf-worker-{index}"))
                .spawn(move || lane_loop(&rx))
                .map_err(|e| {
                    WatchError::init_failed(format!("failed to spawn worker thread: {e}"), None)
                })?;
            handles.push(handle);
        }

        let handle = thread::Builder::new()
            .name("hotconf-affinity".to_string())
            .spawn(move || lane_loop(&affinity_rx))
            .map_err(|e| {
                WatchError::init_failed(format!("failed to spawn affinity thread: {e}"), None)
            })?;
        handles.push(handle);

        Ok(Self {
            pool_tx: Some(pool_tx),
            affinity_tx: Some(affinity_tx),
            workers: handles,
        })
    }

    fn submit(sender: Option<&Sender<Task>>, lane: &str, task: Task) {
        let dropped = match sender {
            Some(tx) => tx.send(task).is_err(),
            None => true,
        };
        if dropped {
            tracing::warn!(lane, "dispatcher stopped; task dropped");
        }
    }
}

impl Dispatcher for ThreadDispatcher {
    fn run_async(&self, task: Task) {
        Self::submit(self.pool_tx.as_ref(), "async", task);
    }

    fn run_on_affinity(&self, task: Task) {
        Self::submit(self.affinity_tx.as_ref(), "affinity", task);
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        // Closing the channels lets each lane drain its backlog and exit.
        self.pool_tx.take();
        self.affinity_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for ThreadDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadDispatcher")
            .field("threads", &self.workers.len())
            .finish_non_exhaustive()
    }
}

/// Drain tasks until the channel closes. A panicking task is contained and
/// logged; the lane thread must survive indefinitely.
fn lane_loop(rx: &Receiver<Task>) {
    while let Ok(task) = rx.recv() {
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::warn!("dispatched task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn test_async_lane_runs_tasks() {
        let dispatcher = ThreadDispatcher::new().unwrap();
        let count = Arc::new(AtomicU32::new(0));
        for _ in 0..10 {
            let count = count.clone();
            dispatcher.run_async(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        drop(dispatcher); // joins lanes, draining the backlog
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_affinity_lane_preserves_submission_order() {
        let dispatcher = ThreadDispatcher::new().unwrap();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..20 {
            let order = order.clone();
            dispatcher.run_on_affinity(Box::new(move || {
                order.lock().push(i);
            }));
        }
        drop(dispatcher);
        assert_eq!(*order.lock(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_task_does_not_kill_lane() {
        let dispatcher = ThreadDispatcher::with_workers(1).unwrap();
        let ran_after = Arc::new(AtomicU32::new(0));

        dispatcher.run_async(Box::new(|| panic!("task exploded")));
        let ran = ran_after.clone();
        dispatcher.run_async(Box::new(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        }));

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(ran_after.load(Ordering::SeqCst), 1);
    }
}
