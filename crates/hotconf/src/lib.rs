//! # hotconf
//!
//! Hot-reload engine for file-backed configuration: debounced directory
//! watching, self-write suppression, and phased reload hooks.
//!
//! An application binds a configuration value to a file under a watched base
//! directory. Whenever the backing file changes on disk, the in-memory value
//! is refreshed automatically, with no polling and no manual re-reading. The
//! engine coordinates the OS notification layer, a background watch thread,
//! two callback-execution lanes, a timed barrier between pre- and post-reload
//! callbacks, and a feedback-loop guard so the engine's own writes never
//! trigger its own reload.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │  notify  │──▶│ DirectoryWatcher │──▶│ WatchedLocation  │
//! │ (events) │   │  (watch thread)  │   │ (dedup + fanout) │
//! └──────────┘   └──────────────────┘   └──────────────────┘
//!                                                │
//!                                                ▼
//! ┌──────────────────┐   ┌────────────────────────┐
//! │ ConfigSerializer │◀──│   ReloadOrchestrator   │
//! │  (load / save)   │   │ (settle delay, phased  │
//! └──────────────────┘   │   barrier, two lanes)  │
//!          │             └────────────────────────┘
//!          ▼
//! ┌──────────────────┐
//! │ ConfigWrapper<T> │  in-memory value + hooks + mark_self_write
//! └──────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hotconf::{
//!     ConfigSerializer, ConfigWrapper, DirectoryWatcher, HookAffinity,
//!     JsonSerializer, ReloadOptions, ReloadOrchestrator, ReloadPhase,
//!     ThreadDispatcher,
//! };
//!
//! #[derive(Clone, serde::Serialize, serde::Deserialize)]
//! struct AppConfig {
//!     port: u16,
//! }
//!
//! fn main() -> hotconf::Result<()> {
//!     let watcher = DirectoryWatcher::new("config")?;
//!     let dispatcher = Arc::new(ThreadDispatcher::new()?);
//!     let orchestrator = ReloadOrchestrator::new(dispatcher, ReloadOptions::default());
//!
//!     let wrapper = ConfigWrapper::register(&watcher, "app.json", AppConfig { port: 8080 })?;
//!     wrapper.add_hook(ReloadPhase::After, HookAffinity::Async, "log-port", || {
//!         println!("config reloaded");
//!         Ok(())
//!     });
//!
//!     let serializer: Arc<dyn ConfigSerializer<AppConfig>> = Arc::new(JsonSerializer::new());
//!     serializer.save(&wrapper)?; // persists, and won't trigger a reload
//!     orchestrator.bind(&wrapper, &serializer);
//!
//!     // Edit config/app.json in another process: the wrapper refreshes
//!     // automatically after the settle delay.
//!     Ok(())
//! }
//! ```
//!
//! # Reload protocol
//!
//! Per accepted (non-deduplicated) change event:
//!
//! 1. the cycle is scheduled on the async lane after a 200 ms settle delay;
//! 2. before-hooks run on their lanes behind a countdown barrier;
//! 3. the cycle waits for the barrier up to 4 s; late hooks are tolerated,
//!    and a cancelled wait aborts the cycle;
//! 4. the serializer's `load` replaces the in-memory value;
//! 5. after-hooks run fire-and-forget.
//!
//! # Error Handling
//!
//! Construction-time failures (base directory unusable, OS watch service
//! unavailable) are returned as [`WatchError`]. Failures inside a running
//! cycle (a throwing listener or hook, an unparseable file) are caught and
//! logged via [`tracing`]; the watch thread and the worker lanes survive
//! indefinitely, and the previous in-memory value is retained on a failed
//! load.
//!
//! # Feature Flags
//!
//! | Feature | Description | Default |
//! |---------|-------------|---------|
//! | `json`  | Bundled [`JsonSerializer`] via `serde_json` | **Yes** |

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(unused, reason = "False warnings")]

mod barrier;
mod dedup;
mod dispatch;
mod error;
mod event;
mod hooks;
mod location;
mod orchestrator;
mod serializer;
mod watcher;
mod wrapper;

pub use barrier::{BarrierWait, ReloadBarrier};
pub use dedup::TimedDedupSet;
pub use dispatch::{Dispatcher, Task, ThreadDispatcher};
pub use error::{BoxError, WatchError};
pub use event::{ChangeEvent, ChangeKind};
pub use hooks::{HookAffinity, HookHandle, HookSet, ReloadPhase};
pub use location::{ChangeListener, DEDUP_TTL, WatchedLocation};
pub use orchestrator::{ReloadOptions, ReloadOrchestrator};
pub use serializer::ConfigSerializer;
pub use watcher::DirectoryWatcher;
pub use wrapper::ConfigWrapper;

#[cfg(feature = "json")]
pub use serializer::JsonSerializer;

/// A Result type that displays errors with miette's fancy formatting.
///
/// Use this as your main function return type for pretty error output:
///
/// ```rust,ignore
/// fn main() -> hotconf::Result<()> {
///     let watcher = hotconf::DirectoryWatcher::new("config")?;
///     Ok(())
/// }
/// ```
pub type Result<T> = miette::Result<T>;
