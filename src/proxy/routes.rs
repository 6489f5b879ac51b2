// src/proxy/routes.rs

use std::future::Future;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{post, MethodRouter};
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::protocol::LifecycleSignal;

use super::{ActionProxy, CheckedBody, ProxyError, ProxyResponse};

pub type SharedProxy = Arc<ActionProxy>;

/// `POST /init`, `POST /run` and one route per lifecycle signal.
pub fn router(proxy: SharedProxy) -> Router {
    let mut router = Router::new()
        .route("/init", post(init_handler))
        .route("/run", post(run_handler));
    for signal in LifecycleSignal::ALL {
        router = router.route(&format!("/{signal}"), signal_route(signal));
    }
    router.layer(DefaultBodyLimit::disable()).with_state(proxy)
}

/// Serve until `shutdown` resolves, then terminate the action.
pub async fn serve<F>(listener: TcpListener, proxy: SharedProxy, shutdown: F) -> Result<(), ProxyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "action proxy listening");
    }

    axum::serve(listener, router(Arc::clone(&proxy)))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ProxyError::Serve)?;

    info!("action proxy stopped; terminating action");
    proxy.shutdown().await;
    Ok(())
}

/// Turn a [`ProxyResponse`] into an HTTP response with explicit
/// `Content-Type` and `Content-Length`.
///
/// The 500 fallback only covers a response that cannot be assembled; once
/// headers are sent, delivery problems are logged by [`CheckedBody`].
pub fn render(response: ProxyResponse) -> Response {
    let ProxyResponse { status, body } = response;
    let len = body.len();

    let built = axum::http::Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .header(CONTENT_LENGTH, len)
        .body(Body::new(CheckedBody::new(body)));

    match built {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "failed to build response");
            let body = json!({ "error": format!("Error writing response: {e}") }).to_string();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response()
        }
    }
}

fn signal_route(signal: LifecycleSignal) -> MethodRouter<SharedProxy> {
    post(move |State(proxy): State<SharedProxy>| async move {
        render(proxy.signal(signal).await)
    })
}

async fn init_handler(
    State(proxy): State<SharedProxy>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match body {
        Ok(body) => render(proxy.init(&body).await),
        Err(e) => unreadable_body(e),
    }
}

async fn run_handler(
    State(proxy): State<SharedProxy>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match body {
        Ok(body) => render(proxy.run(&body).await),
        Err(e) => unreadable_body(e),
    }
}

fn unreadable_body(rejection: BytesRejection) -> Response {
    warn!(error = %rejection, "failed to read request body");
    render(ProxyResponse::error(
        StatusCode::BAD_REQUEST,
        "Error reading request body",
    ))
}
