// src/launcher/mod.rs

//! In-process side of the action protocol.
//!
//! An action binary wraps its entry function in a [`Launcher`] and calls
//! [`Launcher::run`]. The launcher then:
//!
//! 1. checks the execution environment (when one was baked in at build time),
//! 2. opens the side channel on descriptor 3,
//! 3. starts the signal listener for overridden hooks ([`listener`]),
//! 4. writes the capability handshake,
//! 5. serves one request per stdin line until stdin closes.
//!
//! The action's own stdout/stderr are never used by the protocol.

pub mod listener;
pub mod side_channel;

use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::hooks::HookRegistry;
use crate::protocol::{
    decode_envelope, encode_result, error_line, Capabilities, Payload, SIDE_CHANNEL_FD,
};

pub use listener::{spawn_signal_listener, SignalListener};
pub use side_channel::SideChannel;

/// Variable the platform uses to announce the execution environment.
pub const EXECUTION_ENV_VAR: &str = "__OW_EXECUTION_ENV";

/// Setting this (to anything non-empty) enables the launcher debug log.
pub const DEBUG_ENV_VAR: &str = "OW_DEBUG";

const DEFAULT_DEBUG_LOG: &str = "/tmp/action.log";

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("execution environment mismatch: expected {expected:?}, actual {actual:?}")]
    ExecutionEnvMismatch { expected: String, actual: String },

    #[error("cannot open side channel: {0}")]
    SideChannel(#[source] io::Error),

    #[error("cannot start signal listener: {0}")]
    SignalListener(#[source] io::Error),

    #[error("cannot acknowledge startup: {0}")]
    Handshake(#[source] io::Error),

    #[error("cannot write response: {0}")]
    Io(#[source] io::Error),
}

/// The user function invoked once per request.
///
/// Implemented for every `FnMut(Payload) -> R` where `R: Serialize`, so a
/// plain closure or function is enough.
pub trait Action: Send {
    type Output: Serialize;

    fn invoke(&mut self, payload: Payload) -> Self::Output;
}

impl<F, R> Action for F
where
    F: FnMut(Payload) -> R + Send,
    R: Serialize,
{
    type Output = R;

    fn invoke(&mut self, payload: Payload) -> R {
        self(payload)
    }
}

#[derive(Debug, Clone)]
pub struct LauncherOptions {
    /// Refuse to start unless `__OW_EXECUTION_ENV` equals this value.
    pub expected_execution_env: Option<String>,

    /// Where to write debug logs; `None` disables them.
    pub debug_log: Option<PathBuf>,

    /// Export string envelope parameters as `__OW_*` variables.
    pub inject_env: bool,
}

impl Default for LauncherOptions {
    fn default() -> Self {
        Self {
            expected_execution_env: None,
            debug_log: None,
            inject_env: true,
        }
    }
}

impl LauncherOptions {
    /// Options for a real action process.
    ///
    /// The expected execution environment comes from `OW_EXECUTION_ENV` at
    /// compile time; the debug log is enabled by `OW_DEBUG` at run time.
    pub fn from_env() -> Self {
        let expected_execution_env = option_env!("OW_EXECUTION_ENV")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let debug_log = env::var(DEBUG_ENV_VAR)
            .ok()
            .filter(|s| !s.is_empty())
            .map(|_| PathBuf::from(DEFAULT_DEBUG_LOG));

        Self {
            expected_execution_env,
            debug_log,
            inject_env: true,
        }
    }

    pub fn check_execution_env(&self, actual: Option<&str>) -> Result<(), LauncherError> {
        let Some(expected) = self.expected_execution_env.as_deref() else {
            return Ok(());
        };
        let actual = actual.unwrap_or_default();
        if actual == expected {
            return Ok(());
        }

        println!("Execution Environment Mismatch");
        println!("Expected: {expected}");
        println!("Actual: {actual}");
        Err(LauncherError::ExecutionEnvMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

pub struct Launcher<A> {
    action: A,
    hooks: HookRegistry,
    options: LauncherOptions,
    stopped: Arc<AtomicBool>,
}

impl<A: Action> Launcher<A> {
    pub fn new(action: A) -> Self {
        Self {
            action,
            hooks: HookRegistry::new(),
            options: LauncherOptions::default(),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_options(mut self, options: LauncherOptions) -> Self {
        self.options = options;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.hooks.capabilities()
    }

    /// Flag raised once Stop has been acknowledged.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }

    /// Run as the action process: side channel on descriptor 3, requests on
    /// stdin, OS signals dispatched to hooks.
    pub fn run(mut self) -> Result<(), LauncherError> {
        if let Some(path) = self.options.debug_log.clone() {
            crate::logging::init_action_logging(&path);
        }

        let actual = env::var(EXECUTION_ENV_VAR).ok();
        self.options.check_execution_env(actual.as_deref())?;

        let side = SideChannel::open_fd(SIDE_CHANNEL_FD).map_err(LauncherError::SideChannel)?;

        let _listener =
            spawn_signal_listener(self.hooks.clone(), side.clone(), Arc::clone(&self.stopped))
                .map_err(LauncherError::SignalListener)?;

        let stdin = io::stdin();
        self.serve(stdin.lock(), &side)
    }

    /// Write the handshake, then answer one line per input line until the
    /// input ends.
    ///
    /// A line that fails to decode is answered with an error line; the loop
    /// keeps going.
    pub fn serve<R: BufRead>(&mut self, mut input: R, side: &SideChannel) -> Result<(), LauncherError> {
        side.write_line(&self.hooks.capabilities().handshake_line())
            .map_err(LauncherError::Handshake)?;
        debug!("action started");

        let mut line = Vec::new();
        loop {
            line.clear();
            match input.read_until(b'\n', &mut line) {
                Ok(0) => {
                    debug!("input closed");
                    break;
                }
                Ok(_) if line.last() != Some(&b'\n') => {
                    debug!("input closed mid-line; dropping partial request");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "failed to read request");
                    break;
                }
            }

            if self.stopped.load(Ordering::SeqCst) {
                debug!("action was stopped; not serving further requests");
                break;
            }

            let response = self.handle_line(&line);
            side.write_line(&response).map_err(LauncherError::Io)?;
        }

        Ok(())
    }

    /// Answer a single request line. The returned line always ends in `\n`.
    pub fn handle_line(&mut self, line: &[u8]) -> Vec<u8> {
        debug!(request = %String::from_utf8_lossy(line).trim_end(), ">>>");

        let envelope = match decode_envelope(line) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "malformed request");
                return error_line(&err.to_string());
            }
        };

        if self.options.inject_env {
            apply_env(&envelope.env_assignments());
        }

        let result = self.action.invoke(envelope.into_payload());

        let response = match encode_result(&result) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "cannot encode action result");
                error_line(&err.to_string())
            }
        };
        debug!(response = %String::from_utf8_lossy(&response).trim_end(), "<<<");
        response
    }
}

/// Export envelope parameters into the process environment.
fn apply_env(vars: &[(String, String)]) {
    for (name, value) in vars {
        if name.contains(['=', '\0']) || value.contains('\0') {
            warn!(name = %name, "skipping parameter that cannot be an environment variable");
            continue;
        }
        // SAFETY: requests are served one at a time on this thread; the
        // signal listener never reads the environment.
        unsafe { env::set_var(name, value) };
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};
    use std::sync::Mutex;

    use serde_json::{json, Value};

    use super::*;
    use crate::test_support::serial_guard;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn lines(&self) -> Vec<Value> {
            let out = self.0.lock().unwrap().clone();
            String::from_utf8(out)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    fn serve_input<A: Action>(launcher: &mut Launcher<A>, input: &str) -> Vec<Value> {
        let out = Captured::default();
        let side = SideChannel::new(out.clone());
        launcher
            .serve(Cursor::new(input.as_bytes().to_vec()), &side)
            .unwrap();
        out.lines()
    }

    fn no_env() -> LauncherOptions {
        LauncherOptions {
            inject_env: false,
            ..LauncherOptions::default()
        }
    }

    #[test]
    fn handshake_comes_first_and_bad_lines_do_not_stop_the_loop() {
        let mut launcher = Launcher::new(|p: Payload| json!({ "echo": p })).with_options(no_env());

        let lines = serve_input(
            &mut launcher,
            "{\"value\":{\"a\":1}}\nnot json\n[1]\n{\"value\":{\"b\":2}}\n",
        );

        assert_eq!(lines.len(), 5);
        assert_eq!(
            lines[0],
            json!({"ok":true,"pause":false,"finish":false,"hint":false,"freshen":false})
        );
        assert_eq!(lines[1], json!({ "echo": { "a": 1 } }));
        assert!(lines[2]["error"].is_string());
        assert!(lines[3]["error"].is_string());
        assert_eq!(lines[4], json!({ "echo": { "b": 2 } }));
    }

    #[test]
    fn greeting_scenario_injects_parameters_and_extracts_payload() {
        let _guard = serial_guard();
        let mut launcher = Launcher::new(|p: Payload| {
            let name = p.get("name").and_then(Value::as_str).unwrap_or("world");
            json!({ "message": format!("Hello, {name}!") })
        });

        let response =
            launcher.handle_line(b"{\"name\":\"OpenWhisk\",\"__ignored\":123,\"value\":{\"name\":\"X\"}}\n");

        assert_eq!(response, b"{\"message\":\"Hello, X!\"}\n".to_vec());
        assert_eq!(env::var("__OW_NAME").as_deref(), Ok("OpenWhisk"));
        assert!(env::var("__OW___IGNORED").is_err());

        // SAFETY: serialized by `serial_guard`.
        unsafe { env::remove_var("__OW_NAME") };
    }

    #[test]
    fn missing_result_is_an_empty_object() {
        let mut launcher = Launcher::new(|_p: Payload| ()).with_options(no_env());
        assert_eq!(launcher.handle_line(b"{}\n"), b"{}\n".to_vec());

        let mut launcher = Launcher::new(|_p: Payload| Option::<Value>::None).with_options(no_env());
        assert_eq!(launcher.handle_line(b"{}\n"), b"{}\n".to_vec());
    }

    #[test]
    fn multi_line_results_are_collapsed() {
        let mut launcher =
            Launcher::new(|_p: Payload| json!({ "text": "a\nb" })).with_options(no_env());
        let response = launcher.handle_line(b"{}\n");
        assert_eq!(response.iter().filter(|b| **b == b'\n').count(), 1);
        assert!(response.ends_with(b"\n"));
    }

    #[test]
    fn partial_last_line_is_dropped() {
        let mut launcher = Launcher::new(|_p: Payload| json!({ "ran": true })).with_options(no_env());
        let lines = serve_input(&mut launcher, "{}\n{\"value\":");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], json!({ "ran": true }));
    }

    #[test]
    fn stopped_launcher_serves_nothing_more() {
        let mut launcher = Launcher::new(|_p: Payload| json!({ "ran": true })).with_options(no_env());
        launcher.stop_flag().store(true, Ordering::SeqCst);

        let lines = serve_input(&mut launcher, "{}\n{}\n");
        assert_eq!(lines.len(), 1, "only the handshake is written");
    }

    #[test]
    fn handshake_advertises_overridden_hooks() {
        let hooks = HookRegistry::new().on_pause(|_, _| {}).on_stop(|_, _| {});
        let mut launcher = Launcher::new(|_p: Payload| ()).with_hooks(hooks).with_options(no_env());

        let lines = serve_input(&mut launcher, "");
        assert_eq!(
            lines,
            vec![json!({"ok":true,"pause":true,"finish":true,"hint":false,"freshen":false})]
        );
    }

    #[test]
    fn execution_env_must_match_when_expected() {
        let opts = LauncherOptions {
            expected_execution_env: Some("rust:1".to_string()),
            ..LauncherOptions::default()
        };
        assert!(opts.check_execution_env(Some("rust:1")).is_ok());
        assert!(matches!(
            opts.check_execution_env(Some("go:1")),
            Err(LauncherError::ExecutionEnvMismatch { .. })
        ));
        assert!(opts.check_execution_env(None).is_err());

        assert!(LauncherOptions::default().check_execution_env(Some("anything")).is_ok());
    }

    #[test]
    fn unrepresentable_variables_are_skipped() {
        let _guard = serial_guard();
        apply_env(&[
            ("__OW_BAD=NAME".to_string(), "x".to_string()),
            ("__OW_NUL".to_string(), "a\0b".to_string()),
        ]);
        assert!(env::var("__OW_NUL").is_err());
    }
}
