// src/bin/hello-action.rs

//! Demo action: greets `name` from the payload and counts pauses.
//!
//! Run it under the proxy:
//!
//! ```text
//! actionloop --listen 127.0.0.1:8080 -- target/debug/hello-action
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actionloop::{HookRegistry, Launcher, LauncherOptions, Payload};
use serde_json::{json, Value};

fn main() {
    let pauses = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&pauses);

    let hooks = HookRegistry::new()
        .on_pause(move |_params, out| {
            let paused = seen.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = write!(out, "{}", json!({ "signal": "pause", "paused": paused }));
        })
        .on_stop(|_params, out| {
            let _ = write!(out, "{}", json!({ "signal": "stop", "stopping": true }));
        });

    let launcher = Launcher::new(hello)
        .with_hooks(hooks)
        .with_options(LauncherOptions::from_env());

    if let Err(err) = launcher.run() {
        eprintln!("hello-action error: {err}");
        std::process::exit(1);
    }
}

fn hello(payload: Payload) -> Value {
    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("world");
    // stdout is free for the action's own output.
    println!("greeting {name}");
    json!({ "message": format!("Hello, {name}!") })
}
