//! Hot reload example demonstrating the full engine.
//!
//! # Running
//!
//! ```bash
//! cargo run --example hot_reload
//!
//! # In another terminal, modify the config
//! echo '{"port":9090,"host":"0.0.0.0"}' > /tmp/hotconf_example/app.json
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hotconf::{
    ConfigSerializer, ConfigWrapper, DirectoryWatcher, HookAffinity, JsonSerializer,
    ReloadOptions, ReloadOrchestrator, ReloadPhase, ThreadDispatcher,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AppConfig {
    port: u16,
    host: String,
}

fn main() -> hotconf::Result<()> {
    let base = std::env::temp_dir().join("hotconf_example");
    let watcher = DirectoryWatcher::new(&base)?;
    let dispatcher = Arc::new(ThreadDispatcher::new()?);
    let orchestrator = ReloadOrchestrator::new(dispatcher, ReloadOptions::default());

    let wrapper = ConfigWrapper::register(
        &watcher,
        "app.json",
        AppConfig {
            port: 8080,
            host: "localhost".to_string(),
        },
    )?;

    wrapper.add_hook(ReloadPhase::Before, HookAffinity::Async, "pre-warn", || {
        println!("[BEFORE] config is about to be reloaded");
        Ok(())
    });
    let announce = wrapper.clone();
    wrapper.add_hook(ReloadPhase::After, HookAffinity::Async, "announce", move || {
        println!("[AFTER] new config: {:?}", announce.get());
        Ok(())
    });

    let serializer: Arc<dyn ConfigSerializer<AppConfig>> = Arc::new(JsonSerializer::new());

    // Persist the initial config. This write seeds the dedup window, so it
    // does not trigger a reload of its own.
    serializer.save(&wrapper)?;
    orchestrator.bind(&wrapper, &serializer);

    println!("Config file: {}", wrapper.destination().display());
    println!("Modify this file to see hot reload in action!\n");

    loop {
        thread::sleep(Duration::from_secs(2));
        println!("current: {:?}", wrapper.get());
    }
}
