//! Live configuration wrapper.
//!
//! A [`ConfigWrapper`] ties one in-memory configuration value to its backing
//! file: the destination path, the [`WatchedLocation`] used for dedup and
//! self-write suppression, and the reload hooks partitioned by phase and
//! affinity. Serializers replace the value in place; readers see either the
//! old value or the new one, never a partial state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{BoxError, WatchError};
use crate::hooks::{HookAffinity, HookHandle, HookSet, ReloadPhase};
use crate::location::WatchedLocation;
use crate::watcher::DirectoryWatcher;

/// One configuration value bound to a watched file.
pub struct ConfigWrapper<T> {
    instance: RwLock<T>,
    relative_path: PathBuf,
    destination: PathBuf,
    location: Arc<WatchedLocation>,
    hooks: RwLock<HookSet>,
}

impl<T: Send + Sync + 'static> ConfigWrapper<T> {
    /// Bind `instance` to `relative_path` under the watcher's base directory.
    ///
    /// The wrapper's [`WatchedLocation`] is created (or reused) on the
    /// watcher; registration is valid for the process lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PathError`] if `relative_path` is empty or
    /// absolute, and [`WatchError::Closed`] if the watcher was closed.
    pub fn register(
        watcher: &DirectoryWatcher,
        relative_path: impl AsRef<Path>,
        instance: T,
    ) -> Result<Arc<Self>, WatchError> {
        let relative_path = relative_path.as_ref();
        if relative_path.as_os_str().is_empty() || relative_path.is_absolute() {
            return Err(WatchError::path_error(
                relative_path,
                "configuration paths must be non-empty and relative to the base directory",
            ));
        }
        if !watcher.is_running() {
            return Err(WatchError::Closed);
        }

        let location = watcher.get_or_create_location(relative_path);
        let destination = watcher.base_path().join(relative_path);

        Ok(Arc::new(Self {
            instance: RwLock::new(instance),
            relative_path: relative_path.to_path_buf(),
            destination,
            location,
            hooks: RwLock::new(HookSet::default()),
        }))
    }

    /// Read the current configuration via a closure.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.instance.read();
        f(&guard)
    }

    /// Replace the in-memory configuration, returning the previous value.
    ///
    /// Called by serializers once the file's new contents have been parsed.
    pub fn replace(&self, new: T) -> T {
        let mut guard = self.instance.write();
        std::mem::replace(&mut *guard, new)
    }

    /// Mutate the in-memory configuration in place.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut guard = self.instance.write();
        f(&mut guard);
    }

    /// The wrapper's path relative to the watcher's base directory.
    #[must_use]
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Absolute path of the backing file.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// The per-path view this wrapper is bound to.
    #[must_use]
    pub fn location(&self) -> &Arc<WatchedLocation> {
        &self.location
    }

    /// Seed the dedup window against this wrapper's own forthcoming write.
    ///
    /// Serializers must call this immediately before acquiring the file for
    /// writing and again immediately after the write completes, so the OS
    /// notification produced by the write never triggers a reload.
    pub fn mark_self_write(&self) {
        self.location.record_change(&self.own_file_name());
    }

    /// Register a reload hook.
    ///
    /// `label` identifies the callback in failure logs. Hooks are immutable
    /// once captured; the hook list is append-only.
    pub fn add_hook(
        &self,
        phase: ReloadPhase,
        affinity: HookAffinity,
        label: impl Into<Arc<str>>,
        hook: impl Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    ) {
        let handle = HookHandle::new(label, phase, affinity, Arc::new(hook));
        self.hooks.write().insert(handle);
    }

    /// Snapshot of the hook partitions, as seen at the start of a cycle.
    #[must_use]
    pub fn hooks(&self) -> HookSet {
        self.hooks.read().clone()
    }

    /// The dedup key this wrapper's file produces at its location.
    ///
    /// Must agree with how the location names events for this exact path,
    /// which is the final path component.
    fn own_file_name(&self) -> String {
        self.relative_path
            .file_name()
            .map_or_else(
                || self.relative_path.to_string_lossy().into_owned(),
                |name| name.to_string_lossy().into_owned(),
            )
    }
}

impl<T: Clone + Send + Sync + 'static> ConfigWrapper<T> {
    /// Get an owned copy of the current configuration.
    #[must_use]
    pub fn get(&self) -> T {
        self.instance.read().clone()
    }
}

// Manual Debug impl to avoid requiring T: Debug
impl<T> std::fmt::Debug for ConfigWrapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWrapper")
            .field("relative_path", &self.relative_path)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}
