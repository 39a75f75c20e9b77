//! Reload hook handles and their phase/affinity partitions.
//!
//! Hooks are opaque zero-argument callables tagged at registration time with
//! the reload phase they run in and the lane they run on. The engine treats
//! them uniformly: invoke, log failures with the hook's identity, never
//! propagate.

use std::sync::Arc;

use crate::error::BoxError;

/// When a hook runs relative to the serializer's load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReloadPhase {
    /// Before the in-memory instance is replaced. Before-hooks are awaited
    /// with a best-effort barrier.
    Before,
    /// After the in-memory instance is replaced. After-hooks are
    /// fire-and-forget.
    After,
}

/// Which execution lane a hook runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookAffinity {
    /// The host's synchronous affinity-bound lane (e.g. a main-loop tick).
    Sync,
    /// The shared asynchronous worker pool.
    Async,
}

/// The callable behind a hook handle.
pub type ReloadHookFn = Arc<dyn Fn() -> Result<(), BoxError> + Send + Sync + 'static>;

/// Opaque handle to a user-supplied reload callback.
///
/// Immutable once captured at registration time.
#[derive(Clone)]
pub struct HookHandle {
    label: Arc<str>,
    phase: ReloadPhase,
    affinity: HookAffinity,
    hook: ReloadHookFn,
}

impl HookHandle {
    pub(crate) fn new(
        label: impl Into<Arc<str>>,
        phase: ReloadPhase,
        affinity: HookAffinity,
        hook: ReloadHookFn,
    ) -> Self {
        Self {
            label: label.into(),
            phase,
            affinity,
            hook,
        }
    }

    /// Identity of the owning callback, used in failure logs.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The hook's reload phase.
    #[must_use]
    pub const fn phase(&self) -> ReloadPhase {
        self.phase
    }

    /// The hook's execution lane.
    #[must_use]
    pub const fn affinity(&self) -> HookAffinity {
        self.affinity
    }

    /// Invoke the hook, logging a failure with the hook's identity.
    pub(crate) fn run_logged(&self) {
        if let Err(err) = (self.hook)() {
            tracing::warn!(hook = %self.label, error = %err, "reload hook failed");
        }
    }
}

impl std::fmt::Debug for HookHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookHandle")
            .field("label", &self.label)
            .field("phase", &self.phase)
            .field("affinity", &self.affinity)
            .finish_non_exhaustive()
    }
}

/// Hook handles partitioned by phase and affinity.
#[derive(Debug, Clone, Default)]
pub struct HookSet {
    before_sync: Vec<HookHandle>,
    before_async: Vec<HookHandle>,
    after_sync: Vec<HookHandle>,
    after_async: Vec<HookHandle>,
}

impl HookSet {
    pub(crate) fn insert(&mut self, handle: HookHandle) {
        match (handle.phase(), handle.affinity()) {
            (ReloadPhase::Before, HookAffinity::Sync) => self.before_sync.push(handle),
            (ReloadPhase::Before, HookAffinity::Async) => self.before_async.push(handle),
            (ReloadPhase::After, HookAffinity::Sync) => self.after_sync.push(handle),
            (ReloadPhase::After, HookAffinity::Async) => self.after_async.push(handle),
        }
    }

    /// Handles for one phase/affinity partition.
    #[must_use]
    pub fn partition(&self, phase: ReloadPhase, affinity: HookAffinity) -> &[HookHandle] {
        match (phase, affinity) {
            (ReloadPhase::Before, HookAffinity::Sync) => &self.before_sync,
            (ReloadPhase::Before, HookAffinity::Async) => &self.before_async,
            (ReloadPhase::After, HookAffinity::Sync) => &self.after_sync,
            (ReloadPhase::After, HookAffinity::Async) => &self.after_async,
        }
    }

    /// Total number of before-phase hooks (the barrier size).
    #[must_use]
    pub fn before_count(&self) -> usize {
        self.before_sync.len() + self.before_async.len()
    }

    /// Total number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.before_count() + self.after_sync.len() + self.after_async.len()
    }

    /// Returns `true` if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
