// src/executor/spawn.rs

//! Starting the action process.

use std::collections::BTreeMap;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::unix::pipe;
use tokio::process::Command;
use tracing::{debug, info};

use crate::protocol::SIDE_CHANNEL_FD;

use super::{ActionExecutor, ExecutorError, ExecutorFuture, ProcessExecutor, Spawner};

/// How to start the action process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Added to the inherited environment.
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Pipe the action's stdout/stderr into the supervisor log instead of
    /// inheriting them.
    pub capture_output: bool,
    /// Give up waiting for the startup handshake after this long.
    pub handshake_timeout: Option<Duration>,
}

impl ExecutorConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            capture_output: false,
            handshake_timeout: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Start the action and wait for its capability handshake.
///
/// `extra_env` is applied after `config.env`, so it wins on conflicts.
pub async fn spawn_executor(
    config: &ExecutorConfig,
    extra_env: &BTreeMap<String, String>,
) -> Result<ProcessExecutor, ExecutorError> {
    let spawn_err = |source: io::Error| ExecutorError::Spawn {
        command: config.command.clone(),
        source,
    };

    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC).map_err(|e| spawn_err(e.into()))?;

    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args)
        .envs(&config.env)
        .envs(extra_env)
        .stdin(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &config.cwd {
        cmd.current_dir(cwd);
    }
    if config.capture_output {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    }
    attach_side_channel(&mut cmd, &write_end);

    let mut child = cmd.spawn().map_err(spawn_err)?;
    // The child holds its own copy; keeping ours would hide its exit as EOF.
    drop(write_end);

    let pid = child.id();
    info!(command = %config.command, pid, "action process started");

    if config.capture_output {
        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, "stdout", pid);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, "stderr", pid);
        }
    }

    let receiver = pipe::Receiver::from_owned_fd(read_end).map_err(spawn_err)?;
    let mut executor = ProcessExecutor::new(config.command.clone(), child, BufReader::new(receiver));

    let handshake = match config.handshake_timeout {
        Some(limit) => tokio::time::timeout(limit, executor.accept_handshake())
            .await
            .unwrap_or_else(|_| {
                Err(ExecutorError::Handshake(format!(
                    "no handshake within {}ms",
                    limit.as_millis()
                )))
            }),
        None => executor.accept_handshake().await,
    };
    if let Err(err) = handshake {
        // Do not leave a half-started action behind.
        if let Err(e) = executor.terminate().await {
            debug!(pid, error = %e, "failed to reap action after handshake error");
        }
        return Err(err);
    }

    Ok(executor)
}

/// Starts a fresh [`ProcessExecutor`] from a fixed config on every `/init`.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    config: ExecutorConfig,
}

impl ProcessSpawner {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

impl Spawner for ProcessSpawner {
    fn spawn(
        &self,
        extra_env: BTreeMap<String, String>,
    ) -> ExecutorFuture<'_, Box<dyn ActionExecutor>> {
        Box::pin(async move {
            let executor = spawn_executor(&self.config, &extra_env).await?;
            Ok(Box::new(executor) as Box<dyn ActionExecutor>)
        })
    }
}

/// Place the pipe's write end on [`SIDE_CHANNEL_FD`] in the child.
fn attach_side_channel(cmd: &mut Command, write_end: &OwnedFd) {
    let fd = write_end.as_raw_fd();
    // SAFETY: the hook only calls dup2/fcntl, which are async-signal-safe.
    unsafe {
        cmd.pre_exec(move || {
            if fd == SIDE_CHANNEL_FD {
                // Already in place; just keep it open across exec.
                if libc::fcntl(fd, libc::F_SETFD, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
            } else if libc::dup2(fd, SIDE_CHANNEL_FD) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// Copy a captured stream into the log, one event per line.
///
/// Drains until EOF; bytes that are not UTF-8 are logged lossily.
fn forward_output<R>(stream: R, stream_name: &'static str, pid: Option<u32>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                    }
                    info!(pid, stream = stream_name, "{}", String::from_utf8_lossy(&buf));
                }
                Err(e) => {
                    debug!(pid, stream = stream_name, error = %e, "stopped reading action output");
                    break;
                }
            }
        }
    });
}
