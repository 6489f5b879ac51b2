// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod executor;
pub mod hooks;
pub mod launcher;
pub mod logging;
pub mod protocol;
pub mod proxy;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::Settings;
use crate::errors::Result;
use crate::executor::ProcessSpawner;
use crate::proxy::{ActionProxy, ProxyError};

pub use crate::hooks::HookRegistry;
pub use crate::launcher::{Launcher, LauncherOptions};
pub use crate::protocol::{LifecycleSignal, Payload};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - the process spawner used by `/init`
/// - the HTTP proxy
/// - Ctrl-C / SIGTERM handling
pub async fn run(args: CliArgs) -> Result<()> {
    let settings = Settings::from_args(&args)?;

    if args.dry_run {
        print_dry_run(&settings);
        return Ok(());
    }

    let listener = TcpListener::bind(settings.listen)
        .await
        .map_err(|source| ProxyError::Bind {
            addr: settings.listen.to_string(),
            source,
        })?;

    info!(
        command = %settings.executor.command,
        args = ?settings.executor.args,
        "action will start on /init"
    );
    let action_proxy = Arc::new(ActionProxy::new(ProcessSpawner::new(settings.executor)));

    proxy::serve(listener, action_proxy, shutdown_signal()).await?;
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received; shutting down"),
        _ = terminate => info!("SIGTERM received; shutting down"),
    }
}

/// Print the resolved settings.
fn print_dry_run(settings: &Settings) {
    let exec = &settings.executor;
    println!("actionloop dry-run");
    println!("  listen = {}", settings.listen);
    println!("  command = {}", exec.command);
    if !exec.args.is_empty() {
        println!("  args = {:?}", exec.args);
    }
    if let Some(cwd) = &exec.cwd {
        println!("  cwd = {}", cwd.display());
    }
    for (key, value) in &exec.env {
        println!("  env.{key} = {value}");
    }
    println!("  capture_output = {}", exec.capture_output);
    if let Some(timeout) = exec.handshake_timeout {
        println!("  handshake_timeout = {}ms", timeout.as_millis());
    }

    debug!("dry-run complete (no action started)");
}
