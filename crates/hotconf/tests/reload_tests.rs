//! Integration tests for the phased reload protocol.
//!
//! The orchestrator is exercised both end-to-end (real filesystem events
//! through `bind`) and directly via `schedule_reload` with a scripted
//! serializer, so barrier semantics can be tested without OS timing noise.
//! Timing knobs are shortened from their defaults to keep the suite fast;
//! the protocol is identical.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use hotconf::{
    ConfigSerializer, ConfigWrapper, DirectoryWatcher, HookAffinity, JsonSerializer,
    ReloadOptions, ReloadOrchestrator, ReloadPhase, ThreadDispatcher, WatchError,
};
use serde::{Deserialize, Serialize};
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AppConfig {
    port: u16,
}

/// Serializer that counts loads and optionally fails, instead of touching
/// the filesystem.
struct ScriptedSerializer {
    loads: Arc<AtomicU32>,
    fail: bool,
}

impl ScriptedSerializer {
    fn new(loads: Arc<AtomicU32>) -> Arc<dyn ConfigSerializer<AppConfig>> {
        Arc::new(Self { loads, fail: false })
    }

    fn failing(loads: Arc<AtomicU32>) -> Arc<dyn ConfigSerializer<AppConfig>> {
        Arc::new(Self { loads, fail: true })
    }
}

impl ConfigSerializer<AppConfig> for ScriptedSerializer {
    fn load(&self, wrapper: &ConfigWrapper<AppConfig>) -> Result<(), WatchError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(WatchError::load_failed(wrapper.destination(), "scripted failure"));
        }
        wrapper.update(|config| config.port += 1);
        Ok(())
    }

    fn save(&self, _wrapper: &ConfigWrapper<AppConfig>) -> Result<(), WatchError> {
        Ok(())
    }
}

fn fixture(options: ReloadOptions) -> (tempfile::TempDir, DirectoryWatcher, Arc<ReloadOrchestrator>) {
    let dir = tempdir().unwrap();
    let watcher = DirectoryWatcher::new(dir.path()).unwrap();
    let dispatcher = Arc::new(ThreadDispatcher::new().unwrap());
    let orchestrator = ReloadOrchestrator::new(dispatcher, options);
    (dir, watcher, orchestrator)
}

fn wait_for(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    predicate()
}

// ============================================================================
// End-to-End Reload
// ============================================================================

#[test]
fn test_external_edit_refreshes_wrapper() {
    let options = ReloadOptions::default().settle_delay(Duration::from_millis(50));
    let (_dir, watcher, orchestrator) = fixture(options);

    let wrapper =
        ConfigWrapper::register(&watcher, "app.json", AppConfig { port: 8080 }).unwrap();
    let serializer: Arc<dyn ConfigSerializer<AppConfig>> = Arc::new(JsonSerializer::new());
    orchestrator.bind(&wrapper, &serializer);

    fs::write(wrapper.destination(), "{\"port\":9090}").unwrap();

    assert!(wait_for(Duration::from_secs(3), || {
        wrapper.read(|c| c.port) == 9090
    }));
}

#[test]
fn test_own_save_does_not_schedule_reload() {
    let options = ReloadOptions::default().settle_delay(Duration::from_millis(50));
    let (_dir, watcher, orchestrator) = fixture(options);

    let wrapper =
        ConfigWrapper::register(&watcher, "app.json", AppConfig { port: 8080 }).unwrap();
    let loads = Arc::new(AtomicU32::new(0));
    let serializer = ScriptedSerializer::new(loads.clone());
    orchestrator.bind(&wrapper, &serializer);

    // save() seeds the dedup window; the forthcoming OS notification must
    // never reach the reload listener.
    JsonSerializer::new().save(&*wrapper).unwrap();

    thread::sleep(Duration::from_millis(800));
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Zero-Hook Fast Path
// ============================================================================

#[test]
fn test_no_before_hooks_skips_the_wait() {
    let options = ReloadOptions::default()
        .settle_delay(Duration::ZERO)
        .barrier_timeout(Duration::from_secs(4));
    let (_dir, watcher, orchestrator) = fixture(options);

    let wrapper =
        ConfigWrapper::register(&watcher, "app.json", AppConfig { port: 8080 }).unwrap();
    let loads = Arc::new(AtomicU32::new(0));
    let serializer = ScriptedSerializer::new(loads.clone());

    let started = Instant::now();
    orchestrator.schedule_reload(&wrapper, &serializer);

    assert!(wait_for(Duration::from_secs(1), || {
        loads.load(Ordering::SeqCst) == 1
    }));
    // Nowhere near the 4s barrier timeout.
    assert!(started.elapsed() < Duration::from_millis(500));
}

// ============================================================================
// Barrier Semantics
// ============================================================================

#[test]
fn test_before_hooks_complete_before_load() {
    let options = ReloadOptions::default()
        .settle_delay(Duration::ZERO)
        .barrier_timeout(Duration::from_secs(2));
    let (_dir, watcher, orchestrator) = fixture(options);

    let wrapper =
        ConfigWrapper::register(&watcher, "app.json", AppConfig { port: 8080 }).unwrap();

    let before_done = Arc::new(AtomicU32::new(0));
    for (label, affinity) in [
        ("flush-sync", HookAffinity::Sync),
        ("flush-async", HookAffinity::Async),
    ] {
        let done = before_done.clone();
        wrapper.add_hook(ReloadPhase::Before, affinity, label, move || {
            thread::sleep(Duration::from_millis(50));
            done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let loads = Arc::new(AtomicU32::new(0));
    let before_at_load = Arc::new(AtomicU32::new(u32::MAX));
    let observed = before_at_load.clone();
    let done = before_done.clone();
    let counter = loads.clone();

    struct ObservingSerializer {
        counter: Arc<AtomicU32>,
        done: Arc<AtomicU32>,
        observed: Arc<AtomicU32>,
    }
    impl ConfigSerializer<AppConfig> for ObservingSerializer {
        fn load(&self, _wrapper: &ConfigWrapper<AppConfig>) -> Result<(), WatchError> {
            self.observed.store(self.done.load(Ordering::SeqCst), Ordering::SeqCst);
            self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn save(&self, _wrapper: &ConfigWrapper<AppConfig>) -> Result<(), WatchError> {
            Ok(())
        }
    }

    let serializer: Arc<dyn ConfigSerializer<AppConfig>> = Arc::new(ObservingSerializer {
        counter,
        done,
        observed,
    });
    orchestrator.schedule_reload(&wrapper, &serializer);

    assert!(wait_for(Duration::from_secs(2), || {
        loads.load(Ordering::SeqCst) == 1
    }));
    // Both before-hooks had arrived when the load ran.
    assert_eq!(before_at_load.load(Ordering::SeqCst), 2);
}

#[test]
fn test_slow_hooks_time_out_and_reload_proceeds() {
    let options = ReloadOptions::default()
        .settle_delay(Duration::ZERO)
        .barrier_timeout(Duration::from_millis(200));
    let (_dir, watcher, orchestrator) = fixture(options);

    let wrapper =
        ConfigWrapper::register(&watcher, "app.json", AppConfig { port: 8080 }).unwrap();

    // Hooks that outlive the barrier timeout by a wide margin.
    for label in ["slow-1", "slow-2"] {
        wrapper.add_hook(ReloadPhase::Before, HookAffinity::Sync, label, || {
            thread::sleep(Duration::from_millis(900));
            Ok(())
        });
    }
    wrapper.add_hook(ReloadPhase::Before, HookAffinity::Async, "slow-3", || {
        thread::sleep(Duration::from_millis(900));
        Ok(())
    });

    let loads = Arc::new(AtomicU32::new(0));
    let serializer = ScriptedSerializer::new(loads.clone());

    let started = Instant::now();
    orchestrator.schedule_reload(&wrapper, &serializer);

    assert!(wait_for(Duration::from_secs(2), || {
        loads.load(Ordering::SeqCst) == 1
    }));
    let elapsed = started.elapsed();
    // Proceeded at the timeout, not after the hooks finished (2 sync hooks
    // would otherwise take ~1.8s).
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(900));
}

#[test]
fn test_cancelled_wait_aborts_the_cycle() {
    let options = ReloadOptions::default()
        .settle_delay(Duration::ZERO)
        .barrier_timeout(Duration::from_secs(4));
    let (_dir, watcher, orchestrator) = fixture(options);

    let wrapper =
        ConfigWrapper::register(&watcher, "app.json", AppConfig { port: 8080 }).unwrap();
    wrapper.add_hook(ReloadPhase::Before, HookAffinity::Async, "stall", || {
        thread::sleep(Duration::from_millis(600));
        Ok(())
    });

    let after_calls = Arc::new(AtomicU32::new(0));
    let after = after_calls.clone();
    wrapper.add_hook(ReloadPhase::After, HookAffinity::Async, "apply", move || {
        after.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let loads = Arc::new(AtomicU32::new(0));
    let serializer = ScriptedSerializer::new(loads.clone());
    orchestrator.schedule_reload(&wrapper, &serializer);

    // Interrupt the cycle while it waits on the before-hook barrier.
    thread::sleep(Duration::from_millis(100));
    orchestrator.shutdown();

    // Past the hook's completion and well past the cancel: no load, no
    // after-hooks.
    thread::sleep(Duration::from_millis(900));
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Failure Containment
// ============================================================================

#[test]
fn test_failing_before_hook_does_not_abort_reload() {
    let options = ReloadOptions::default()
        .settle_delay(Duration::ZERO)
        .barrier_timeout(Duration::from_secs(2));
    let (_dir, watcher, orchestrator) = fixture(options);

    let wrapper =
        ConfigWrapper::register(&watcher, "app.json", AppConfig { port: 8080 }).unwrap();
    wrapper.add_hook(ReloadPhase::Before, HookAffinity::Async, "flaky", || {
        Err("hook exploded".into())
    });

    let after_calls = Arc::new(AtomicU32::new(0));
    let after = after_calls.clone();
    wrapper.add_hook(ReloadPhase::After, HookAffinity::Async, "apply", move || {
        after.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let loads = Arc::new(AtomicU32::new(0));
    let serializer = ScriptedSerializer::new(loads.clone());
    orchestrator.schedule_reload(&wrapper, &serializer);

    assert!(wait_for(Duration::from_secs(2), || {
        loads.load(Ordering::SeqCst) == 1 && after_calls.load(Ordering::SeqCst) == 1
    }));
}

#[test]
fn test_load_failure_skips_after_hooks() {
    let options = ReloadOptions::default().settle_delay(Duration::ZERO);
    let (_dir, watcher, orchestrator) = fixture(options);

    let wrapper =
        ConfigWrapper::register(&watcher, "app.json", AppConfig { port: 8080 }).unwrap();

    let after_calls = Arc::new(AtomicU32::new(0));
    let after = after_calls.clone();
    wrapper.add_hook(ReloadPhase::After, HookAffinity::Async, "apply", move || {
        after.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let loads = Arc::new(AtomicU32::new(0));
    let serializer = ScriptedSerializer::failing(loads.clone());
    orchestrator.schedule_reload(&wrapper, &serializer);

    assert!(wait_for(Duration::from_secs(1), || {
        loads.load(Ordering::SeqCst) == 1
    }));
    thread::sleep(Duration::from_millis(300));
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    // The previous value survived the failed cycle.
    assert_eq!(wrapper.read(|c| c.port), 8080);
}

#[test]
fn test_after_hooks_run_on_both_lanes() {
    let options = ReloadOptions::default().settle_delay(Duration::ZERO);
    let (_dir, watcher, orchestrator) = fixture(options);

    let wrapper =
        ConfigWrapper::register(&watcher, "app.json", AppConfig { port: 8080 }).unwrap();

    let after_calls = Arc::new(AtomicU32::new(0));
    for (label, affinity) in [
        ("apply-sync", HookAffinity::Sync),
        ("apply-async", HookAffinity::Async),
    ] {
        let after = after_calls.clone();
        wrapper.add_hook(ReloadPhase::After, affinity, label, move || {
            after.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let loads = Arc::new(AtomicU32::new(0));
    let serializer = ScriptedSerializer::new(loads.clone());
    orchestrator.schedule_reload(&wrapper, &serializer);

    assert!(wait_for(Duration::from_secs(1), || {
        after_calls.load(Ordering::SeqCst) == 2
    }));
}

// ============================================================================
// Shutdown Semantics
// ============================================================================

#[test]
fn test_cycles_after_shutdown_are_refused() {
    let options = ReloadOptions::default().settle_delay(Duration::ZERO);
    let (_dir, watcher, orchestrator) = fixture(options);

    let wrapper =
        ConfigWrapper::register(&watcher, "app.json", AppConfig { port: 8080 }).unwrap();
    let loads = Arc::new(AtomicU32::new(0));
    let serializer = ScriptedSerializer::new(loads.clone());

    orchestrator.shutdown();
    assert!(orchestrator.is_shut_down());

    orchestrator.schedule_reload(&wrapper, &serializer);
    thread::sleep(Duration::from_millis(300));
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}
