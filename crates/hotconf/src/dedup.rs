//! Time-bounded deduplication of change notifications.
//!
//! Desktop filesystems routinely emit several notifications per logical save
//! (truncate, write, metadata). [`TimedDedupSet`] collapses those into one
//! observation per key per TTL window. The writer side can also pre-record a
//! key so the eventual OS notification for its own write is recognized as a
//! duplicate and suppressed (see
//! [`WatchedLocation::record_change`](crate::WatchedLocation::record_change)).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A set of string keys with a per-entry time-to-live.
///
/// Expiry is lazy: stale entries are dropped when the set is next accessed.
/// No background sweep thread exists or is needed.
#[derive(Debug)]
pub struct TimedDedupSet {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl TimedDedupSet {
    /// Create a new set whose entries live for `ttl` after being recorded.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record an observation of `key`.
    ///
    /// Returns `true` if the key was not currently live (a new observation).
    /// The key's expiry is recorded or refreshed either way.
    pub fn record(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, seen| now.duration_since(*seen) < self.ttl);
        entries.insert(key.to_owned(), now).is_none()
    }

    /// Check whether `key` is currently live.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, seen| now.duration_since(*seen) < self.ttl);
        entries.contains_key(key)
    }

    /// The configured time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of currently live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, seen| now.duration_since(*seen) < self.ttl);
        entries.len()
    }

    /// Returns `true` if no keys are currently live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
