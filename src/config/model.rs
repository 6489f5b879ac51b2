// src/config/model.rs

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Listen address used when neither the CLI nor the file names one.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [proxy]
/// listen = "0.0.0.0:8080"
///
/// [action]
/// command = "/action/exec"
/// args = []
/// cwd = "/action"
/// env = { KEY = "value" }
/// capture_output = false
/// handshake_timeout = "10s"
/// ```
///
/// Both sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub proxy: ProxySection,

    #[serde(default)]
    pub action: ActionSection,
}

/// `[proxy]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySection {
    /// `host:port` for the HTTP surface.
    #[serde(default)]
    pub listen: Option<String>,
}

/// `[action]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionSection {
    /// Executable started on `/init`.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra environment for the action process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Log the action's stdout/stderr instead of inheriting them.
    #[serde(default)]
    pub capture_output: bool,

    /// Duration string such as `"10s"` or `"500ms"`.
    #[serde(default)]
    pub handshake_timeout: Option<String>,
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub listen: Option<SocketAddr>,
    pub action: ActionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub capture_output: bool,
    pub handshake_timeout: Option<Duration>,
}

impl ConfigFile {
    /// Build without validation. Prefer `ConfigFile::try_from(raw)`.
    pub(crate) fn new_unchecked(listen: Option<SocketAddr>, action: ActionConfig) -> Self {
        Self { listen, action }
    }
}
