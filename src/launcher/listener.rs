// src/launcher/listener.rs

//! Background OS-signal listener inside the action process.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hooks::HookRegistry;
use crate::protocol::LifecycleSignal;

use super::side_channel::SideChannel;

/// Handle to the listener thread.
#[derive(Debug)]
pub struct SignalListener {
    handle: JoinHandle<()>,
}

impl SignalListener {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Install handlers for every overridden hook and start dispatching.
///
/// Handlers are installed before this returns, so a signal sent right after
/// the startup handshake is never lost. Returns `None` when no hook is
/// overridden: no signal is intercepted at all.
///
/// After Stop is acknowledged the listener exits and `stopped` is set.
pub fn spawn_signal_listener(
    hooks: HookRegistry,
    side: SideChannel,
    stopped: Arc<AtomicBool>,
) -> io::Result<Option<SignalListener>> {
    let wanted = hooks.capabilities().supported_signals();
    if wanted.is_empty() {
        return Ok(None);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let mut streams = Vec::with_capacity(wanted.len());
    {
        let _guard = runtime.enter();
        for lifecycle in wanted {
            let kind = SignalKind::from_raw(lifecycle.os_signal() as libc::c_int);
            streams.push((lifecycle, signal(kind)?));
        }
    }

    let handle = thread::Builder::new()
        .name("signal-listener".to_string())
        .spawn(move || runtime.block_on(listen(streams, hooks, side, stopped)))?;

    Ok(Some(SignalListener { handle }))
}

async fn listen(
    streams: Vec<(LifecycleSignal, Signal)>,
    hooks: HookRegistry,
    side: SideChannel,
    stopped: Arc<AtomicBool>,
) {
    let (tx, mut rx) = mpsc::channel::<LifecycleSignal>(4);

    for (lifecycle, mut stream) in streams {
        let tx = tx.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if tx.send(lifecycle).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    while let Some(lifecycle) = rx.recv().await {
        debug!(signal = %lifecycle, "lifecycle signal received");

        let ack = hooks.acknowledge(lifecycle, None);
        if let Err(e) = side.write_line(&ack) {
            warn!(signal = %lifecycle, error = %e, "failed to acknowledge signal");
        }

        if lifecycle.is_terminal() {
            stopped.store(true, Ordering::SeqCst);
            info!("stop acknowledged; signal listener exiting");
            break;
        }
    }
}
