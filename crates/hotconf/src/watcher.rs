//! Directory watching and event routing.
//!
//! A [`DirectoryWatcher`] owns one OS watch handle rooted at a base
//! directory, one dedicated background thread blocking on OS events, and the
//! registry of [`WatchedLocation`]s that events fan out to. Directories are
//! registered individually (non-recursive notify watches) so that subtrees
//! created after startup can be picked up and registered on the fly.
//!
//! Lifecycle is `Created → Running → Closed`: construction verifies the base
//! directory, registers the existing tree, and spawns the processing thread;
//! [`DirectoryWatcher::close`] stops the loop; dropping the watcher joins it.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender, bounded, select};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};

use crate::error::WatchError;
use crate::event::{ChangeEvent, ChangeKind};
use crate::location::WatchedLocation;

/// Commands sent to the processing thread.
#[derive(Debug, Clone, Copy)]
enum WatchCommand {
    Stop,
}

/// State shared between the watcher handle, arbitrary caller threads, and
/// the processing thread.
struct WatcherShared {
    /// Canonicalized base directory; all watched paths are relative to it.
    base: PathBuf,
    /// The OS watch handle. notify needs `&mut` for registration; `close()`
    /// takes it so the OS resources are released without waiting for Drop.
    watcher: Mutex<Option<RecommendedWatcher>>,
    /// Per-relative-path views, created lazily and cached forever.
    locations: RwLock<HashMap<PathBuf, Arc<WatchedLocation>>>,
    /// Directories currently registered with the OS handle.
    directories: Mutex<HashSet<PathBuf>>,
    /// Whether newly observed directories are registered automatically.
    auto_recurse: bool,
    /// Running flag; cleared by `close()` and when the loop exits.
    running: AtomicBool,
    /// Owner slot enforcing that only one thread runs the processing loop.
    loop_owner: Mutex<Option<ThreadId>>,
}

impl WatcherShared {
    /// Idempotently register `path` for create/modify/delete notifications.
    ///
    /// Safe to call concurrently with the processing thread.
    fn register_directory(&self, path: &Path) -> Result<(), WatchError> {
        if !path.is_dir() {
            return Err(WatchError::path_error(path, "not a directory"));
        }

        let mut directories = self.directories.lock();
        if directories.contains(path) {
            return Ok(());
        }

        let mut watcher = self.watcher.lock();
        let Some(watcher) = watcher.as_mut() else {
            return Err(WatchError::Closed);
        };
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::path_error(path, format!("failed to watch: {e}")))?;
        directories.insert(path.to_path_buf());
        tracing::debug!(path = %path.display(), "registered directory");
        Ok(())
    }

    /// Register `root` and every subdirectory below it.
    fn register_recursively(&self, root: &Path) -> Result<(), WatchError> {
        self.register_directory(root)?;

        let entries = fs::read_dir(root)
            .map_err(|e| WatchError::path_error(root, format!("failed to read directory: {e}")))?;
        for entry in entries {
            let entry = entry
                .map_err(|e| WatchError::path_error(root, format!("failed to read entry: {e}")))?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                self.register_recursively(&entry.path())?;
            }
        }
        Ok(())
    }

    /// The single processing loop. Blocks on the next OS event or command;
    /// exits on `Stop` or when the event channel closes.
    fn process_loop(
        &self,
        command_rx: Receiver<WatchCommand>,
        notify_rx: Receiver<notify::Result<notify::Event>>,
    ) {
        {
            let mut owner = self.loop_owner.lock();
            assert!(
                owner.is_none(),
                "DirectoryWatcher processing loop entered by a second thread"
            );
            *owner = Some(thread::current().id());
        }

        while self.running.load(Ordering::Acquire) {
            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(WatchCommand::Stop) | Err(_) => break,
                },
                recv(notify_rx) -> result => match result {
                    Ok(Ok(event)) => self.handle_event(&event),
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, "file watch error");
                    }
                    // The OS handle was dropped; the watcher is closing.
                    Err(_) => break,
                },
            }
        }

        self.running.store(false, Ordering::Release);
    }

    /// Resolve one raw OS event and route it. Nothing raised from here may
    /// terminate the loop.
    fn handle_event(&self, event: &notify::Event) {
        let Some(kind) = ChangeKind::from_notify(event) else {
            return;
        };

        for path in &event.paths {
            // Skip anomalies: zero-length paths and paths outside the base.
            let Ok(relative) = path.strip_prefix(&self.base) else {
                continue;
            };
            if relative.as_os_str().is_empty() {
                continue;
            }

            if path.is_dir() {
                if kind == ChangeKind::Created && self.auto_recurse {
                    // A config subfolder created after startup still gets
                    // watched, including anything already inside it.
                    if let Err(err) = self.register_recursively(path) {
                        tracing::warn!(
                            path = %path.display(),
                            error = %err,
                            "failed to watch new directory"
                        );
                    }
                }
                continue;
            }

            let change = ChangeEvent::new(relative.to_path_buf(), kind);
            self.route(&change);
        }
    }

    /// Notify every location whose relative path is a prefix of the event's.
    fn route(&self, event: &ChangeEvent) {
        let matches: Vec<Arc<WatchedLocation>> = self
            .locations
            .read()
            .values()
            .filter(|location| event.path.starts_with(location.relative_path()))
            .cloned()
            .collect();

        for location in matches {
            location.on_event(event);
        }
    }
}

/// One watched base directory tree with a single background processing
/// thread.
pub struct DirectoryWatcher {
    shared: Arc<WatcherShared>,
    command_tx: Sender<WatchCommand>,
    thread: Option<JoinHandle<()>>,
}

impl DirectoryWatcher {
    /// Start watching `base`, with auto-registration of new directories.
    ///
    /// The base directory is created if it does not exist. The existing tree
    /// is registered recursively and the processing thread is started before
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::BaseDirectory`] if the base directory cannot be
    /// created or verified, [`WatchError::InitFailed`] if the OS watch
    /// service is unavailable or the thread cannot be spawned, and
    /// [`WatchError::PathError`] if a subdirectory cannot be registered.
    pub fn new(base: impl AsRef<Path>) -> Result<Self, WatchError> {
        Self::with_auto_recurse(base, true)
    }

    /// Start watching `base`, controlling whether directories observed being
    /// created are registered automatically.
    ///
    /// # Errors
    ///
    /// Same as [`DirectoryWatcher::new`].
    pub fn with_auto_recurse(base: impl AsRef<Path>, auto_recurse: bool) -> Result<Self, WatchError> {
        let base = base.as_ref();
        fs::create_dir_all(base)
            .map_err(|e| WatchError::base_directory(base, format!("cannot create: {e}")))?;
        let base = base
            .canonicalize()
            .map_err(|e| WatchError::base_directory(base, format!("cannot resolve: {e}")))?;

        let (notify_tx, notify_rx) = bounded::<notify::Result<notify::Event>>(256);
        let watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })
        .map_err(|e| WatchError::init_failed(format!("failed to create file watcher: {e}"), Some(e)))?;

        let shared = Arc::new(WatcherShared {
            base,
            watcher: Mutex::new(Some(watcher)),
            locations: RwLock::new(HashMap::new()),
            directories: Mutex::new(HashSet::new()),
            auto_recurse,
            running: AtomicBool::new(true),
            loop_owner: Mutex::new(None),
        });

        shared.register_recursively(&shared.base)?;

        let (command_tx, command_rx) = bounded::<WatchCommand>(4);
        let loop_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("hotconf-watcher".to_string())
            .spawn(move || loop_shared.process_loop(command_rx, notify_rx))
            .map_err(|e| {
                WatchError::init_failed(format!("failed to spawn watcher thread: {e}"), None)
            })?;

        Ok(Self {
            shared,
            command_tx,
            thread: Some(thread),
        })
    }

    /// The canonicalized base directory.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.shared.base
    }

    /// Idempotently register a directory for notifications.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Closed`] after `close()`, or
    /// [`WatchError::PathError`] if the path is not a watchable directory.
    pub fn register_directory(&self, path: impl AsRef<Path>) -> Result<(), WatchError> {
        if !self.is_running() {
            return Err(WatchError::Closed);
        }
        self.shared.register_directory(path.as_ref())
    }

    /// Register a directory tree recursively.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Closed`] after `close()`, or
    /// [`WatchError::PathError`] if part of the tree cannot be registered.
    pub fn register_recursively(&self, root: impl AsRef<Path>) -> Result<(), WatchError> {
        if !self.is_running() {
            return Err(WatchError::Closed);
        }
        self.shared.register_recursively(root.as_ref())
    }

    /// Lazily create and memoize the per-path view for `relative_path`.
    ///
    /// A location is a singleton per relative path within this watcher and
    /// lives for the process's duration.
    #[must_use]
    pub fn get_or_create_location(&self, relative_path: impl AsRef<Path>) -> Arc<WatchedLocation> {
        let relative_path = relative_path.as_ref();
        if let Some(location) = self.shared.locations.read().get(relative_path) {
            return location.clone();
        }

        self.shared
            .locations
            .write()
            .entry(relative_path.to_path_buf())
            .or_insert_with(|| Arc::new(WatchedLocation::new(relative_path.to_path_buf())))
            .clone()
    }

    /// Whether the processing thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Stop watching and release the OS watch handle.
    ///
    /// The processing thread exits on its next wait; in-flight reload cycles
    /// are not cancelled and run to completion.
    pub fn close(&self) {
        self.shared.running.store(false, Ordering::Release);
        // Dropping the handle disarms the OS watches immediately and
        // disconnects the event channel, which is a second exit path for the
        // loop should the Stop command be missed.
        self.shared.watcher.lock().take();
        let _ = self.command_tx.send(WatchCommand::Stop);
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.close();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("base", &self.shared.base)
            .field("running", &self.is_running())
            .field("locations", &self.shared.locations.read().len())
            .finish_non_exhaustive()
    }
}
