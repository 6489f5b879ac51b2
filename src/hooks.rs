// src/hooks.rs

//! Lifecycle hook registry.
//!
//! An action opts into lifecycle events by filling slots in a
//! [`HookRegistry`]. An empty slot is the default no-op and means
//! "unsupported": it is never advertised in the startup [`Capabilities`] and
//! its OS signal is not listened for.
//!
//! ```ignore
//! let hooks = HookRegistry::new().on_pause(|_params, out| {
//!     let _ = writeln!(out, r#"{{"paused":true}}"#);
//! });
//! assert!(hooks.capabilities().pause);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::json;
use tracing::error;

use crate::protocol::{error_line, strip_newlines, Capabilities, LifecycleSignal};

/// Optional string parameters passed to a hook.
pub type HookParams = HashMap<String, String>;

/// A lifecycle callback: parameters in, acknowledgement bytes out.
pub type Hook = Arc<dyn Fn(Option<&HookParams>, &mut dyn Write) + Send + Sync>;

#[derive(Clone, Default)]
pub struct HookRegistry {
    pause: Option<Hook>,
    stop: Option<Hook>,
    hint: Option<Hook>,
    freshen: Option<Hook>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("pause", &self.pause.is_some())
            .field("stop", &self.stop.is_some())
            .field("hint", &self.hint.is_some())
            .field("freshen", &self.freshen.is_some())
            .finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `hook` for `signal`, replacing any previous one.
    pub fn with_hook<F>(mut self, signal: LifecycleSignal, hook: F) -> Self
    where
        F: Fn(Option<&HookParams>, &mut dyn Write) + Send + Sync + 'static,
    {
        *self.slot_mut(signal) = Some(Arc::new(hook));
        self
    }

    pub fn on_pause<F>(self, hook: F) -> Self
    where
        F: Fn(Option<&HookParams>, &mut dyn Write) + Send + Sync + 'static,
    {
        self.with_hook(LifecycleSignal::Pause, hook)
    }

    pub fn on_stop<F>(self, hook: F) -> Self
    where
        F: Fn(Option<&HookParams>, &mut dyn Write) + Send + Sync + 'static,
    {
        self.with_hook(LifecycleSignal::Stop, hook)
    }

    pub fn on_hint<F>(self, hook: F) -> Self
    where
        F: Fn(Option<&HookParams>, &mut dyn Write) + Send + Sync + 'static,
    {
        self.with_hook(LifecycleSignal::Hint, hook)
    }

    pub fn on_freshen<F>(self, hook: F) -> Self
    where
        F: Fn(Option<&HookParams>, &mut dyn Write) + Send + Sync + 'static,
    {
        self.with_hook(LifecycleSignal::Freshen, hook)
    }

    fn slot(&self, signal: LifecycleSignal) -> Option<&Hook> {
        match signal {
            LifecycleSignal::Pause => self.pause.as_ref(),
            LifecycleSignal::Stop => self.stop.as_ref(),
            LifecycleSignal::Hint => self.hint.as_ref(),
            LifecycleSignal::Freshen => self.freshen.as_ref(),
        }
    }

    fn slot_mut(&mut self, signal: LifecycleSignal) -> &mut Option<Hook> {
        match signal {
            LifecycleSignal::Pause => &mut self.pause,
            LifecycleSignal::Stop => &mut self.stop,
            LifecycleSignal::Hint => &mut self.hint,
            LifecycleSignal::Freshen => &mut self.freshen,
        }
    }

    /// True if `signal` has a non-default hook.
    pub fn is_overridden(&self, signal: LifecycleSignal) -> bool {
        self.slot(signal).is_some()
    }

    /// Handshake record: a flag is set iff its slot was overridden.
    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::default();
        for signal in LifecycleSignal::ALL {
            caps.set(signal, self.is_overridden(signal));
        }
        caps
    }

    /// Run the hook for `signal` and return its acknowledgement line.
    ///
    /// The result is always exactly one `\n`-terminated line: the hook's
    /// output with newlines removed, or `{"signal":"<name>"}` if the hook
    /// (or the default no-op) wrote nothing. A hook that panics is answered
    /// with `{"error":"<name> hook panicked"}` and its partial output dropped.
    pub fn acknowledge(&self, signal: LifecycleSignal, params: Option<&HookParams>) -> Vec<u8> {
        let mut captured = Vec::new();
        if let Some(hook) = self.slot(signal) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (**hook)(params, &mut captured)));
            if outcome.is_err() {
                error!(signal = %signal, "lifecycle hook panicked");
                return error_line(&format!("{} hook panicked", signal.name()));
            }
        }

        let mut line = strip_newlines(&captured);
        if line.iter().all(u8::is_ascii_whitespace) {
            line = serde_json::to_vec(&json!({ "signal": signal.name() }))
                .unwrap_or_else(|_| br#"{"signal":"unknown"}"#.to_vec());
        }
        line.push(b'\n');
        line
    }

    /// Run the hook for `signal` and write its acknowledgement to `out`.
    pub fn dispatch<W: Write + ?Sized>(
        &self,
        signal: LifecycleSignal,
        params: Option<&HookParams>,
        out: &mut W,
    ) -> io::Result<()> {
        out.write_all(&self.acknowledge(signal, params))?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn default_registry_advertises_nothing() {
        let caps = HookRegistry::new().capabilities();
        assert!(caps.ok);
        assert!(caps.supported_signals().is_empty());
    }

    #[test]
    fn capabilities_follow_overridden_slots_exactly() {
        for signal in LifecycleSignal::ALL {
            let hooks = HookRegistry::new().with_hook(signal, |_, _| {});
            let caps = hooks.capabilities();
            for other in LifecycleSignal::ALL {
                assert_eq!(caps.supports(other), other == signal, "{signal} vs {other}");
            }
        }

        let all = HookRegistry::new()
            .on_pause(|_, _| {})
            .on_stop(|_, _| {})
            .on_hint(|_, _| {})
            .on_freshen(|_, _| {});
        assert_eq!(all.capabilities().supported_signals(), LifecycleSignal::ALL.to_vec());
    }

    #[test]
    fn default_pause_still_acknowledges_with_one_line() {
        let mut out = Vec::new();
        HookRegistry::new()
            .dispatch(LifecycleSignal::Pause, None, &mut out)
            .unwrap();
        assert_eq!(out, b"{\"signal\":\"pause\"}\n".to_vec());
    }

    #[test]
    fn hook_output_is_collapsed_into_one_line() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let hooks = HookRegistry::new().on_pause(move |_, out| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = writeln!(out, "{{\"paused\":");
            let _ = writeln!(out, "true}}");
        });

        let line = hooks.acknowledge(LifecycleSignal::Pause, None);

        assert_eq!(line, b"{\"paused\":true}\n".to_vec());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_hook_is_answered_and_can_run_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let hooks = HookRegistry::new().on_hint(move |_, out| {
            let _ = write!(out, "{{\"partial\":");
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("hint hook failed");
            }
            let _ = write!(out, "true}}");
        });

        assert_eq!(
            hooks.acknowledge(LifecycleSignal::Hint, None),
            b"{\"error\":\"hint hook panicked\"}\n".to_vec()
        );
        assert_eq!(
            hooks.acknowledge(LifecycleSignal::Hint, None),
            b"{\"partial\":true}\n".to_vec()
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn hook_receives_params() {
        let hooks = HookRegistry::new().on_hint(|params, out| {
            let level = params
                .and_then(|p| p.get("level"))
                .map(String::as_str)
                .unwrap_or("none");
            let _ = write!(out, "{{\"level\":\"{level}\"}}");
        });

        let mut params = HookParams::new();
        params.insert("level".to_string(), "high".to_string());

        assert_eq!(
            hooks.acknowledge(LifecycleSignal::Hint, Some(&params)),
            b"{\"level\":\"high\"}\n".to_vec()
        );
        assert_eq!(
            hooks.acknowledge(LifecycleSignal::Hint, None),
            b"{\"level\":\"none\"}\n".to_vec()
        );
    }
}
