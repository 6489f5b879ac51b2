// src/executor/process.rs

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, ChildStdin};
use tracing::{debug, info, warn};

use crate::protocol::{strip_newlines, Capabilities, LifecycleSignal};

use super::{ActionExecutor, ExecutorError, ExecutorFuture, ExecutorState};

/// A running action process and both ends of its protocol.
pub struct ProcessExecutor {
    command: String,
    child: Child,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    side_channel: BufReader<pipe::Receiver>,
    capabilities: Capabilities,
    state: ExecutorState,
    stopped: bool,
}

impl ProcessExecutor {
    /// Wrap a freshly started child; it stays `Spawned` until
    /// [`accept_handshake`](Self::accept_handshake).
    pub(crate) fn new(command: String, mut child: Child, side_channel: BufReader<pipe::Receiver>) -> Self {
        let pid = child.id();
        let stdin = child.stdin.take();
        Self {
            command,
            child,
            pid,
            stdin,
            side_channel,
            capabilities: Capabilities::default(),
            state: ExecutorState::Spawned,
            stopped: false,
        }
    }

    /// Read the startup handshake and move to `Running`.
    pub(crate) async fn accept_handshake(&mut self) -> Result<(), ExecutorError> {
        let mut line = Vec::new();
        let n = self.side_channel.read_until(b'\n', &mut line).await?;
        if n == 0 {
            self.mark_exited();
            return Err(ExecutorError::Handshake(
                "action exited before acknowledging startup".to_string(),
            ));
        }
        self.capabilities = Capabilities::parse_handshake(&line)
            .map_err(|e| ExecutorError::Handshake(e.to_string()))?;
        self.state = ExecutorState::Running;
        debug!(pid = self.pid, capabilities = ?self.capabilities, "handshake received");
        Ok(())
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    fn ensure_running(&self) -> Result<(), ExecutorError> {
        match self.state {
            ExecutorState::Exited => Err(ExecutorError::CommandExited),
            _ => Ok(()),
        }
    }

    /// One-way transition; also closes stdin.
    fn mark_exited(&mut self) -> ExecutorError {
        if self.state != ExecutorState::Exited {
            info!(command = %self.command, pid = self.pid, "action process exited");
        }
        self.state = ExecutorState::Exited;
        self.stdin = None;
        ExecutorError::CommandExited
    }

    /// Read exactly one `\n`-terminated line, returned without the newline.
    ///
    /// EOF or a final line with no terminator means the action is gone.
    async fn read_response(&mut self) -> Result<Vec<u8>, ExecutorError> {
        let mut line = Vec::new();
        match self.side_channel.read_until(b'\n', &mut line).await {
            Ok(_) if line.last() == Some(&b'\n') => {
                line.pop();
                Ok(line)
            }
            Ok(n) => {
                debug!(pid = self.pid, partial_bytes = n, "side channel closed");
                Err(self.mark_exited())
            }
            Err(e) => {
                warn!(pid = self.pid, error = %e, "failed to read side channel");
                Err(self.mark_exited())
            }
        }
    }
}

impl ActionExecutor for ProcessExecutor {
    fn forward_request(&mut self, request: Vec<u8>) -> ExecutorFuture<'_, Vec<u8>> {
        Box::pin(async move {
            self.ensure_running()?;

            let mut line = strip_newlines(&request);
            line.push(b'\n');

            let Some(stdin) = self.stdin.as_mut() else {
                return Err(self.mark_exited());
            };
            let written = async {
                stdin.write_all(&line).await?;
                stdin.flush().await
            }
            .await;
            if let Err(e) = written {
                debug!(pid = self.pid, error = %e, "failed to write request");
                return Err(self.mark_exited());
            }

            self.read_response().await
        })
    }

    fn forward_signal(&mut self, signal: LifecycleSignal) -> ExecutorFuture<'_, Vec<u8>> {
        Box::pin(async move {
            self.ensure_running()?;
            if self.stopped {
                return Err(ExecutorError::Stopped);
            }

            let Some(pid) = self.pid else {
                return Err(self.mark_exited());
            };
            let pid = Pid::from_raw(pid as i32);

            debug!(%pid, %signal, os_signal = ?signal.os_signal(), "forwarding signal");
            match kill(pid, signal.os_signal()) {
                Ok(()) => {}
                Err(Errno::ESRCH) => return Err(self.mark_exited()),
                Err(e) => return Err(ExecutorError::Io(e.into())),
            }

            let ack = self.read_response().await?;
            if signal.is_terminal() {
                self.stopped = true;
            }
            Ok(ack)
        })
    }

    fn exited(&mut self) -> bool {
        if self.state == ExecutorState::Exited {
            return true;
        }
        match self.child.try_wait() {
            Ok(None) => false,
            Ok(Some(status)) => {
                debug!(pid = self.pid, code = status.code(), "action exit observed");
                self.mark_exited();
                true
            }
            Err(e) => {
                warn!(pid = self.pid, error = %e, "cannot poll action process");
                self.mark_exited();
                true
            }
        }
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn terminate(&mut self) -> ExecutorFuture<'_, ()> {
        Box::pin(async move {
            self.stdin = None;
            if let Err(e) = self.child.start_kill() {
                debug!(pid = self.pid, error = %e, "kill failed; process already gone");
            }
            let status = self.child.wait().await?;
            info!(
                command = %self.command,
                pid = self.pid,
                code = status.code(),
                "action process terminated"
            );
            self.state = ExecutorState::Exited;
            Ok(())
        })
    }
}
