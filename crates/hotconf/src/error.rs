//! Error types for the hot-reload engine.
//!
//! All watcher and reload errors are reported through [`WatchError`], which
//! integrates with [`miette`] for rich terminal diagnostics. Failures inside
//! a running reload cycle (a throwing listener or hook) are never surfaced as
//! errors to callers; they are caught and logged so the watch thread and the
//! worker lanes survive indefinitely.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Boxed error type accepted from user-supplied listeners and reload hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for watcher construction and reload operations.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum WatchError {
    /// Failed to initialize the file watcher or one of its threads.
    #[error("failed to initialize file watcher: {message}")]
    #[diagnostic(
        code(hotconf::watch::init_failed),
        help("Check that the OS file-notification service is available")
    )]
    InitFailed {
        /// Human-readable error message.
        message: String,
        /// The underlying notify error, if available.
        #[source]
        source: Option<notify::Error>,
    },

    /// The base directory could not be created or verified.
    #[error("base directory '{}' is unusable: {message}", path.display())]
    #[diagnostic(
        code(hotconf::watch::base_directory),
        help("Ensure the base directory exists (or can be created) and is accessible")
    )]
    BaseDirectory {
        /// The offending base directory.
        path: PathBuf,
        /// Human-readable error message.
        message: String,
    },

    /// Failed to register a specific path for watching.
    #[error("failed to watch path '{}': {message}", path.display())]
    #[diagnostic(
        code(hotconf::watch::path_error),
        help("Ensure the path exists and you have read permissions")
    )]
    PathError {
        /// The path that could not be watched.
        path: PathBuf,
        /// Human-readable error message.
        message: String,
    },

    /// Reading or deserializing a configuration file failed.
    ///
    /// When this error occurs during a reload cycle, the previous in-memory
    /// configuration is retained and the cycle's after-hooks do not run.
    #[error("failed to load configuration from '{}': {message}", path.display())]
    #[diagnostic(
        code(hotconf::serializer::load_failed),
        help(
            "Fix the configuration file and save it again. The previous in-memory configuration remains active."
        )
    )]
    LoadFailed {
        /// The configuration file that failed to load.
        path: PathBuf,
        /// Human-readable error message.
        message: String,
    },

    /// Writing a configuration file failed.
    #[error("failed to save configuration to '{}': {message}", path.display())]
    #[diagnostic(
        code(hotconf::serializer::save_failed),
        help("Check free disk space and write permissions on the destination directory")
    )]
    SaveFailed {
        /// The destination file that failed to save.
        path: PathBuf,
        /// Human-readable error message.
        message: String,
    },

    /// The watcher has been closed.
    #[error("directory watcher has been closed")]
    #[diagnostic(
        code(hotconf::watch::closed),
        help("Create a new DirectoryWatcher if you need to continue watching for changes")
    )]
    Closed,
}

impl WatchError {
    /// Create a new `InitFailed` error.
    pub fn init_failed(message: impl Into<String>, source: Option<notify::Error>) -> Self {
        Self::InitFailed {
            message: message.into(),
            source,
        }
    }

    /// Create a new `BaseDirectory` error.
    pub fn base_directory(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::BaseDirectory {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new `PathError`.
    pub fn path_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::PathError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new `LoadFailed` error.
    pub fn load_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::LoadFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new `SaveFailed` error.
    pub fn save_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SaveFailed {
            path: path.into(),
            message: message.into(),
        }
    }
}
