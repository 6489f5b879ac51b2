// src/proxy/mod.rs

//! HTTP control surface in front of a single action process.
//!
//! [`ActionProxy`] holds the request logic and returns a [`ProxyResponse`];
//! [`routes`] maps it onto axum. Access to the executor is serialized by an
//! async mutex, so concurrent requests queue instead of interleaving on the
//! action's pipes.

pub mod body;
pub mod routes;

use std::collections::BTreeMap;
use std::io;

use axum::http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::executor::{ActionExecutor, ExecutorError, Spawner};
use crate::protocol::{is_json_object, strip_newlines, LifecycleSignal, VALUE_KEY};

pub use body::CheckedBody;
pub use routes::{render, router, serve, SharedProxy};

pub const NO_ACTION_MSG: &str = "no action defined yet";
pub const COMMAND_EXITED_MSG: &str = "command exited";
pub const NOT_A_DICTIONARY_MSG: &str = "The action did not return a dictionary.";
pub const ALREADY_INITIALIZED_MSG: &str = "Cannot initialize the action more than once.";

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] io::Error),
}

/// Status and JSON body of one proxy reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ProxyResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    /// `{"error":"<message>"}` with the given status.
    pub fn error(status: StatusCode, message: impl AsRef<str>) -> Self {
        Self {
            status,
            body: json!({ "error": message.as_ref() }).to_string().into_bytes(),
        }
    }

    /// 200 with `bytes` verbatim if they are a JSON object, 502 otherwise.
    fn from_action_output(bytes: Vec<u8>) -> Self {
        if is_json_object(&bytes) {
            Self::ok(bytes)
        } else {
            warn!(response = %String::from_utf8_lossy(&bytes), "action returned a non-object");
            Self::error(StatusCode::BAD_GATEWAY, NOT_A_DICTIONARY_MSG)
        }
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

pub struct ActionProxy {
    executor: Mutex<Option<Box<dyn ActionExecutor>>>,
    spawner: Option<Box<dyn Spawner>>,
}

impl ActionProxy {
    /// A proxy that starts its action on `/init`.
    pub fn new(spawner: impl Spawner + 'static) -> Self {
        Self {
            executor: Mutex::new(None),
            spawner: Some(Box::new(spawner)),
        }
    }

    /// A proxy around an already running action; `/init` is refused.
    pub fn with_executor(executor: Box<dyn ActionExecutor>) -> Self {
        Self {
            executor: Mutex::new(Some(executor)),
            spawner: None,
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.executor.lock().await.is_some()
    }

    /// Start the action, adding `value.env` string entries to its environment.
    pub async fn init(&self, body: &[u8]) -> ProxyResponse {
        let extra_env = match init_env(body) {
            Ok(env) => env,
            Err(msg) => return ProxyResponse::error(StatusCode::BAD_REQUEST, msg),
        };

        let mut guard = self.executor.lock().await;
        if let Some(existing) = guard.as_mut() {
            if !existing.exited() {
                return ProxyResponse::error(StatusCode::FORBIDDEN, ALREADY_INITIALIZED_MSG);
            }
            debug!("replacing exited action");
            if let Err(e) = existing.terminate().await {
                debug!(error = %e, "failed to reap exited action");
            }
            *guard = None;
        }

        let Some(spawner) = self.spawner.as_ref() else {
            return ProxyResponse::error(StatusCode::FORBIDDEN, ALREADY_INITIALIZED_MSG);
        };

        match spawner.spawn(extra_env).await {
            Ok(executor) => {
                info!(capabilities = ?executor.capabilities(), "action initialized");
                *guard = Some(executor);
                ProxyResponse::ok(json!({ "ok": true }).to_string().into_bytes())
            }
            Err(e) => {
                error!(error = %e, "failed to start action");
                ProxyResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }

    /// Forward one request body to the action and relay its reply.
    pub async fn run(&self, body: &[u8]) -> ProxyResponse {
        let mut guard = self.executor.lock().await;
        let Some(executor) = guard.as_mut() else {
            return ProxyResponse::error(StatusCode::INTERNAL_SERVER_ERROR, NO_ACTION_MSG);
        };
        if executor.exited() {
            return ProxyResponse::error(StatusCode::INTERNAL_SERVER_ERROR, COMMAND_EXITED_MSG);
        }

        match executor.forward_request(strip_newlines(body)).await {
            Ok(response) => ProxyResponse::from_action_output(response),
            Err(e) => {
                warn!(error = %e, "run failed; dropping action");
                *guard = None;
                ProxyResponse::error(StatusCode::BAD_REQUEST, COMMAND_EXITED_MSG)
            }
        }
    }

    /// Deliver a lifecycle signal and relay its acknowledgement.
    pub async fn signal(&self, signal: LifecycleSignal) -> ProxyResponse {
        let mut guard = self.executor.lock().await;
        let Some(executor) = guard.as_mut() else {
            return ProxyResponse::error(StatusCode::INTERNAL_SERVER_ERROR, NO_ACTION_MSG);
        };
        if executor.exited() {
            return ProxyResponse::error(StatusCode::INTERNAL_SERVER_ERROR, COMMAND_EXITED_MSG);
        }
        if !executor.capabilities().supports(signal) {
            return ProxyResponse::error(
                StatusCode::BAD_REQUEST,
                format!("action does not support {signal}"),
            );
        }

        match executor.forward_signal(signal).await {
            Ok(ack) => ProxyResponse::from_action_output(ack),
            Err(e @ ExecutorError::Stopped) => {
                ProxyResponse::error(StatusCode::BAD_REQUEST, e.to_string())
            }
            Err(e) => {
                warn!(%signal, error = %e, "signal failed; dropping action");
                *guard = None;
                ProxyResponse::error(StatusCode::BAD_REQUEST, COMMAND_EXITED_MSG)
            }
        }
    }

    /// Terminate the action, if any.
    pub async fn shutdown(&self) {
        let mut guard = self.executor.lock().await;
        if let Some(mut executor) = guard.take() {
            if let Err(e) = executor.terminate().await {
                warn!(error = %e, "failed to terminate action");
            }
        }
    }
}

/// Environment additions carried by an `/init` body.
///
/// An empty body means none. Otherwise the body must be a JSON object;
/// string entries of `value.env` are taken and anything else is ignored.
fn init_env(body: &[u8]) -> Result<BTreeMap<String, String>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    let request: Value =
        serde_json::from_slice(body).map_err(|e| format!("invalid init request: {e}"))?;
    if !request.is_object() {
        return Err("invalid init request: expected a JSON object".to_string());
    }

    let env = request
        .get(VALUE_KEY)
        .and_then(|value| value.get("env"))
        .and_then(Value::as_object)
        .map(|env| {
            env.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    Ok(env)
}
