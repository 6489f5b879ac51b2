// src/protocol/signals.rs

use std::fmt;
use std::str::FromStr;

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};

use super::ProtocolError;

/// Lifecycle event relayed from the orchestrator to the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleSignal {
    Pause,
    Stop,
    Hint,
    Freshen,
}

impl LifecycleSignal {
    pub const ALL: [LifecycleSignal; 4] = [
        LifecycleSignal::Pause,
        LifecycleSignal::Stop,
        LifecycleSignal::Hint,
        LifecycleSignal::Freshen,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LifecycleSignal::Pause => "pause",
            LifecycleSignal::Stop => "stop",
            LifecycleSignal::Hint => "hint",
            LifecycleSignal::Freshen => "freshen",
        }
    }

    /// Fixed OS signal used to deliver this event.
    pub fn os_signal(self) -> Signal {
        match self {
            LifecycleSignal::Pause => Signal::SIGINT,
            LifecycleSignal::Stop => Signal::SIGABRT,
            LifecycleSignal::Hint => Signal::SIGUSR1,
            LifecycleSignal::Freshen => Signal::SIGUSR2,
        }
    }

    pub fn from_os_signal(signal: Signal) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.os_signal() == signal)
    }

    /// Stop ends signal handling inside the action.
    pub fn is_terminal(self) -> bool {
        self == LifecycleSignal::Stop
    }
}

impl fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LifecycleSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pause" => Ok(LifecycleSignal::Pause),
            "stop" => Ok(LifecycleSignal::Stop),
            "hint" => Ok(LifecycleSignal::Hint),
            "freshen" => Ok(LifecycleSignal::Freshen),
            other => Err(format!(
                "invalid lifecycle signal: {other} (expected pause, stop, hint or freshen)"
            )),
        }
    }
}

/// Startup handshake: which lifecycle signals the action handles.
///
/// `finish` is the flag for [`LifecycleSignal::Stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub ok: bool,
    #[serde(default)]
    pub pause: bool,
    #[serde(default)]
    pub finish: bool,
    #[serde(default)]
    pub hint: bool,
    #[serde(default)]
    pub freshen: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            ok: true,
            pause: false,
            finish: false,
            hint: false,
            freshen: false,
        }
    }
}

impl Capabilities {
    pub fn supports(&self, signal: LifecycleSignal) -> bool {
        match signal {
            LifecycleSignal::Pause => self.pause,
            LifecycleSignal::Stop => self.finish,
            LifecycleSignal::Hint => self.hint,
            LifecycleSignal::Freshen => self.freshen,
        }
    }

    pub fn set(&mut self, signal: LifecycleSignal, supported: bool) {
        match signal {
            LifecycleSignal::Pause => self.pause = supported,
            LifecycleSignal::Stop => self.finish = supported,
            LifecycleSignal::Hint => self.hint = supported,
            LifecycleSignal::Freshen => self.freshen = supported,
        }
    }

    /// Signals whose flag is set, in [`LifecycleSignal::ALL`] order.
    pub fn supported_signals(&self) -> Vec<LifecycleSignal> {
        LifecycleSignal::ALL
            .into_iter()
            .filter(|s| self.supports(*s))
            .collect()
    }

    /// The first side-channel line, newline included.
    ///
    /// Falls back to `{"ok":false}` if the record cannot be serialized.
    pub fn handshake_line(&self) -> Vec<u8> {
        let mut line = serde_json::to_vec(self).unwrap_or_else(|_| br#"{"ok":false}"#.to_vec());
        line.push(b'\n');
        line
    }

    pub fn parse_handshake(line: &[u8]) -> Result<Self, ProtocolError> {
        let caps: Capabilities = serde_json::from_slice(line)
            .map_err(|e| ProtocolError::Handshake(e.to_string()))?;
        if !caps.ok {
            return Err(ProtocolError::Handshake(
                "action reported ok=false at startup".to_string(),
            ));
        }
        Ok(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_mapping_is_fixed_and_reversible() {
        assert_eq!(LifecycleSignal::Pause.os_signal(), Signal::SIGINT);
        assert_eq!(LifecycleSignal::Stop.os_signal(), Signal::SIGABRT);
        assert_eq!(LifecycleSignal::Hint.os_signal(), Signal::SIGUSR1);
        assert_eq!(LifecycleSignal::Freshen.os_signal(), Signal::SIGUSR2);
        for s in LifecycleSignal::ALL {
            assert_eq!(LifecycleSignal::from_os_signal(s.os_signal()), Some(s));
            assert_eq!(s.name().parse::<LifecycleSignal>(), Ok(s));
        }
        assert_eq!(LifecycleSignal::from_os_signal(Signal::SIGTERM), None);
    }

    #[test]
    fn handshake_line_lists_every_flag() {
        let mut caps = Capabilities::default();
        caps.set(LifecycleSignal::Pause, true);
        assert_eq!(
            caps.handshake_line(),
            b"{\"ok\":true,\"pause\":true,\"finish\":false,\"hint\":false,\"freshen\":false}\n"
                .to_vec()
        );
    }

    #[test]
    fn handshake_tolerates_omitted_flags() {
        let caps = Capabilities::parse_handshake(b"{\"ok\":true,\"hint\":true}\n").unwrap();
        assert!(caps.hint);
        assert!(!caps.pause);
        assert_eq!(caps.supported_signals(), vec![LifecycleSignal::Hint]);
    }

    #[test]
    fn handshake_rejects_not_ok_and_garbage() {
        assert!(Capabilities::parse_handshake(b"{\"ok\":false}").is_err());
        assert!(Capabilities::parse_handshake(b"hello").is_err());
    }
}
