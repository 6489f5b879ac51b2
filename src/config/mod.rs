// src/config/mod.rs

//! Configuration for the `actionloop` supervisor.
//!
//! - The TOML-backed data model (`model.rs`).
//! - Loading a config file from disk (`loader.rs`).
//! - Validation into [`ConfigFile`] (`validate.rs`).
//! - Merging the file with CLI flags into [`Settings`].

pub mod loader;
pub mod model;
pub mod validate;

use std::net::SocketAddr;
use std::path::Path;

use tracing::debug;

use crate::cli::CliArgs;
use crate::errors::{ActionLoopError, Result};
use crate::executor::ExecutorConfig;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ActionConfig, ConfigFile, RawConfigFile, DEFAULT_LISTEN};
pub use validate::{parse_duration, parse_listen};

/// Everything the supervisor needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub listen: SocketAddr,
    pub executor: ExecutorConfig,
}

impl Settings {
    /// Load the config file named by `args` (or the default one if it exists)
    /// and apply CLI overrides.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => Some(load_and_validate(path)?),
            None => {
                let path = default_config_path();
                if Path::new(&path).exists() {
                    debug!(path = %path.display(), "using default config file");
                    Some(load_and_validate(&path)?)
                } else {
                    None
                }
            }
        };
        Self::merge(args, file)
    }

    /// CLI values win over file values.
    pub fn merge(args: &CliArgs, file: Option<ConfigFile>) -> Result<Self> {
        let file = file.unwrap_or_else(|| ConfigFile::new_unchecked(None, ActionConfig::default()));
        let action = file.action;

        let listen = match args.listen.as_deref() {
            Some(listen) => parse_listen(listen)?,
            None => match file.listen {
                Some(listen) => listen,
                None => parse_listen(DEFAULT_LISTEN)?,
            },
        };

        let (command, args_list) = match args.command.split_first() {
            Some((command, rest)) => (command.clone(), rest.to_vec()),
            None => match action.command {
                Some(command) => (command, action.args),
                None => {
                    return Err(ActionLoopError::ConfigError(
                        "no action command given (pass it after `--` or set [action].command)"
                            .to_string(),
                    ));
                }
            },
        };

        let executor = ExecutorConfig {
            command,
            args: args_list,
            env: action.env,
            cwd: action.cwd,
            capture_output: args.capture_output || action.capture_output,
            handshake_timeout: action.handshake_timeout,
        };

        Ok(Self { listen, executor })
    }
}
