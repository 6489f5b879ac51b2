// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Each layer owns a focused error enum (`ProtocolError`, `ExecutorError`,
//! `LauncherError`, `ProxyError`); `ActionLoopError` covers configuration and
//! the supervisor entry point.

use thiserror::Error;

pub use crate::executor::ExecutorError;
pub use crate::launcher::LauncherError;
pub use crate::protocol::ProtocolError;
pub use crate::proxy::ProxyError;

#[derive(Error, Debug)]
pub enum ActionLoopError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

pub type Result<T> = std::result::Result<T, ActionLoopError>;
