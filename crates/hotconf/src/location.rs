//! Per-logical-file view of the watched tree.
//!
//! A [`WatchedLocation`] represents one configuration path relative to a
//! [`DirectoryWatcher`](crate::DirectoryWatcher)'s base directory. It owns
//! the dedup window for that path and fans qualifying events out to its
//! registered listeners. Locations are created lazily, cached per relative
//! path, and live for the process's duration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::dedup::TimedDedupSet;
use crate::error::BoxError;
use crate::event::{ChangeEvent, ChangeKind};

/// Dedup window applied to repeated notifications for the same file.
///
/// One second balances "the OS emits multiple modify events per logical save"
/// against "an external edit landing right after our own write would be
/// wrongly swallowed."
pub const DEDUP_TTL: Duration = Duration::from_secs(1);

/// Listener invoked for accepted, non-deduplicated change events.
///
/// Listeners run inline on the watch thread and must be fast: enqueue work,
/// do not perform it. A returned error is logged and does not affect sibling
/// listeners or the watch thread.
pub type ChangeListener = Arc<dyn Fn(&ChangeEvent) -> Result<(), BoxError> + Send + Sync + 'static>;

#[derive(Clone)]
struct Listener {
    kinds: Vec<ChangeKind>,
    handler: ChangeListener,
}

/// One logical configuration path under a watched base directory.
pub struct WatchedLocation {
    relative_path: PathBuf,
    recent: TimedDedupSet,
    listeners: RwLock<Vec<Listener>>,
}

impl WatchedLocation {
    pub(crate) fn new(relative_path: PathBuf) -> Self {
        Self {
            relative_path,
            recent: TimedDedupSet::new(DEDUP_TTL),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The location's path relative to the watcher's base directory.
    #[must_use]
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Register a listener for the given change kinds.
    ///
    /// The listener list is append-only; configuration files are not expected
    /// to be unregistered at runtime.
    pub fn add_listener(&self, kinds: &[ChangeKind], handler: ChangeListener) {
        self.listeners.write().push(Listener {
            kinds: kinds.to_vec(),
            handler,
        });
    }

    /// Seed the dedup window for `file_name` without notifying listeners.
    ///
    /// This is the self-write suppression primitive: a serializer calls this
    /// around its own writes so the forthcoming OS notification for that
    /// write is treated as a duplicate.
    pub fn record_change(&self, file_name: &str) {
        self.recent.record(file_name);
    }

    /// Route one change event through dedup and on to matching listeners.
    pub(crate) fn on_event(&self, event: &ChangeEvent) {
        let name = self.event_name(event);
        if !self.recent.record(&name) {
            tracing::trace!(
                location = %self.relative_path.display(),
                file = %name,
                "change suppressed (duplicate within dedup window)"
            );
            return;
        }

        // Snapshot so a listener registering further listeners cannot
        // deadlock against the read guard.
        let listeners: Vec<Listener> = self.listeners.read().iter().cloned().collect();
        for listener in &listeners {
            if !listener.kinds.contains(&event.kind) {
                continue;
            }
            if let Err(err) = (listener.handler)(event) {
                tracing::warn!(
                    location = %self.relative_path.display(),
                    event = %event,
                    error = %err,
                    "change listener failed"
                );
            }
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// The event's file name relative to this location.
    ///
    /// For a file location this is the final path component; for a directory
    /// location it is the remainder below the location's own path.
    fn event_name(&self, event: &ChangeEvent) -> String {
        event
            .path
            .strip_prefix(&self.relative_path)
            .ok()
            .filter(|rest| !rest.as_os_str().is_empty())
            .map_or_else(
                || {
                    event
                        .file_name()
                        .map_or_else(|| event.path.to_string_lossy().into_owned(), str::to_owned)
                },
                |rest| rest.to_string_lossy().into_owned(),
            )
    }
}

impl std::fmt::Debug for WatchedLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchedLocation")
            .field("relative_path", &self.relative_path)
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}
