//! Change events produced by the directory watcher.
//!
//! One [`ChangeEvent`] is produced per qualifying OS notification and routed
//! to every matching [`WatchedLocation`](crate::WatchedLocation). Events are
//! immutable and transient: they are created and consumed within a single
//! notification cycle.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind};

/// Classification of a filesystem notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ChangeKind {
    /// A file or directory was created.
    Created,
    /// A file's contents or metadata changed.
    Modified,
    /// A file or directory was removed.
    Deleted,
    /// The OS event queue overflowed; some notifications may have been lost.
    Overflow,
}

impl ChangeKind {
    /// Accepted kinds for configuration-reload listeners.
    ///
    /// `Deleted` and `Overflow` are defined but intentionally do not trigger
    /// a reload: a vanished or desynchronized file has nothing safe to parse.
    pub const RELOAD_DEFAULT: &'static [Self] = &[Self::Created, Self::Modified];

    /// Map a raw notify event to a change kind, or `None` if the event
    /// carries no classification we route (access, metadata-only, etc.).
    pub(crate) fn from_notify(event: &Event) -> Option<Self> {
        if event.need_rescan() {
            return Some(Self::Overflow);
        }

        match event.kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
            Self::Overflow => write!(f, "overflow"),
        }
    }
}

/// A single filesystem change, resolved relative to the watcher's base
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Path of the touched entry, relative to the base directory.
    pub path: PathBuf,

    /// What happened to the entry.
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Create a new change event.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// The touched entry's base-relative path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The final component of the touched path, if it has one.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.kind)
    }
}
