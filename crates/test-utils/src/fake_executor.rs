use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actionloop::executor::{ActionExecutor, ExecutorError, ExecutorFuture, Spawner};
use actionloop::protocol::{Capabilities, LifecycleSignal};

/// What the fake action does on its next exchange.
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// Answer with this line (no trailing newline).
    Line(Vec<u8>),
    /// Die instead of answering.
    Exit,
}

/// Everything a [`FakeExecutor`] was asked to do.
#[derive(Debug, Default)]
pub struct FakeLog {
    pub requests: Vec<Vec<u8>>,
    pub signals: Vec<LifecycleSignal>,
    pub terminated: bool,
}

/// A scripted action:
/// - records every request and signal in a shared [`FakeLog`]
/// - answers from a queue of [`FakeReply`]s, and "exits" when it runs dry
/// - exits on the first request after an acknowledged Stop.
pub struct FakeExecutor {
    capabilities: Capabilities,
    replies: VecDeque<FakeReply>,
    exited: bool,
    stopped: bool,
    delay: Option<Duration>,
    log: Arc<Mutex<FakeLog>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities::default(),
            replies: VecDeque::new(),
            exited: false,
            stopped: false,
            delay: None,
            log: Arc::new(Mutex::new(FakeLog::default())),
        }
    }

    pub fn supporting(mut self, signal: LifecycleSignal) -> Self {
        self.capabilities.set(signal, true);
        self
    }

    pub fn reply(mut self, line: impl Into<Vec<u8>>) -> Self {
        self.replies.push_back(FakeReply::Line(line.into()));
        self
    }

    pub fn reply_json(self, value: serde_json::Value) -> Self {
        self.reply(value.to_string())
    }

    pub fn then_exit(mut self) -> Self {
        self.replies.push_back(FakeReply::Exit);
        self
    }

    /// Report the process as already gone.
    pub fn exited_already(mut self) -> Self {
        self.exited = true;
        self
    }

    /// Hold every exchange for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn log(&self) -> Arc<Mutex<FakeLog>> {
        Arc::clone(&self.log)
    }

    fn next_reply(&mut self) -> Result<Vec<u8>, ExecutorError> {
        match self.replies.pop_front() {
            Some(FakeReply::Line(line)) => Ok(line),
            Some(FakeReply::Exit) | None => {
                self.exited = true;
                Err(ExecutorError::CommandExited)
            }
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionExecutor for FakeExecutor {
    fn forward_request(&mut self, request: Vec<u8>) -> ExecutorFuture<'_, Vec<u8>> {
        Box::pin(async move {
            if self.exited {
                return Err(ExecutorError::CommandExited);
            }
            if self.stopped {
                // A stopped launcher leaves its loop at the next input line.
                self.exited = true;
                return Err(ExecutorError::CommandExited);
            }
            self.log.lock().unwrap().requests.push(request);
            self.pause().await;
            self.next_reply()
        })
    }

    fn forward_signal(&mut self, signal: LifecycleSignal) -> ExecutorFuture<'_, Vec<u8>> {
        Box::pin(async move {
            if self.exited {
                return Err(ExecutorError::CommandExited);
            }
            if self.stopped {
                return Err(ExecutorError::Stopped);
            }
            self.log.lock().unwrap().signals.push(signal);
            self.pause().await;
            let ack = self.next_reply()?;
            if signal.is_terminal() {
                self.stopped = true;
            }
            Ok(ack)
        })
    }

    fn exited(&mut self) -> bool {
        self.exited
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn terminate(&mut self) -> ExecutorFuture<'_, ()> {
        Box::pin(async move {
            self.exited = true;
            self.log.lock().unwrap().terminated = true;
            Ok(())
        })
    }
}

/// Hands out pre-scripted [`FakeExecutor`]s, one per spawn, and records the
/// environment each spawn was asked for.
#[derive(Default)]
pub struct FakeSpawner {
    queue: Mutex<VecDeque<FakeExecutor>>,
    envs: Arc<Mutex<Vec<BTreeMap<String, String>>>>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, executor: FakeExecutor) -> Self {
        self.queue.lock().unwrap().push_back(executor);
        self
    }

    pub fn envs(&self) -> Arc<Mutex<Vec<BTreeMap<String, String>>>> {
        Arc::clone(&self.envs)
    }
}

impl Spawner for FakeSpawner {
    fn spawn(
        &self,
        extra_env: BTreeMap<String, String>,
    ) -> ExecutorFuture<'_, Box<dyn ActionExecutor>> {
        Box::pin(async move {
            self.envs.lock().unwrap().push(extra_env);
            match self.queue.lock().unwrap().pop_front() {
                Some(executor) => Ok(Box::new(executor) as Box<dyn ActionExecutor>),
                None => Err(ExecutorError::Handshake(
                    "action exited before acknowledging startup".to_string(),
                )),
            }
        })
    }
}
