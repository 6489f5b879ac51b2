// src/executor/mod.rs

//! Supervisor-side ownership of the action process.
//!
//! - [`process`] holds [`ProcessExecutor`], which owns the child, its stdin
//!   and the read end of the side channel.
//! - [`spawn`] starts the child with the side channel on descriptor 3 and
//!   waits for its capability handshake; [`ProcessSpawner`] packages that
//!   for the proxy's `/init`.
//!
//! The proxy talks to an [`ActionExecutor`] instead of a concrete process so
//! tests can drive it with a fake.

pub mod process;
pub mod spawn;

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::pin::Pin;

use thiserror::Error;

use crate::protocol::{Capabilities, LifecycleSignal, ProtocolError};

pub use process::ProcessExecutor;
pub use spawn::{spawn_executor, ExecutorConfig, ProcessSpawner};

/// Boxed future returned by executor operations.
pub type ExecutorFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ExecutorError>> + Send + 'a>>;

/// Lifecycle of one action process. `Exited` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// Started, handshake not read yet.
    Spawned,
    /// Handshake received; requests and signals are accepted.
    Running,
    /// The process is gone; every operation fails fast.
    Exited,
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("command exited")]
    CommandExited,

    #[error("action was stopped; no further signals are accepted")]
    Stopped,

    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("action handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Operations the proxy performs on the action process.
///
/// Every call is one request/response exchange: a line (or signal) goes out
/// and exactly one line comes back. Callers must not run two exchanges at
/// once on the same executor.
pub trait ActionExecutor: Send {
    /// Write `request` as one stdin line and read one side-channel line.
    fn forward_request(&mut self, request: Vec<u8>) -> ExecutorFuture<'_, Vec<u8>>;

    /// Deliver `signal` and read its one-line acknowledgement.
    fn forward_signal(&mut self, signal: LifecycleSignal) -> ExecutorFuture<'_, Vec<u8>>;

    /// True once the process is known to be gone.
    fn exited(&mut self) -> bool;

    /// Capabilities advertised in the startup handshake.
    fn capabilities(&self) -> Capabilities;

    /// Close stdin, kill and reap the process.
    fn terminate(&mut self) -> ExecutorFuture<'_, ()>;
}

/// Creates executors on `/init`.
pub trait Spawner: Send + Sync {
    /// Start a new action process with `extra_env` added to its environment.
    fn spawn(
        &self,
        extra_env: BTreeMap<String, String>,
    ) -> ExecutorFuture<'_, Box<dyn ActionExecutor>>;
}
