//! HTTP adapter: `POST /` carries one JSON-RPC request

use crate::dispatch::Dispatcher;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use base64::Engine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct HttpState {
    dispatcher: Arc<Dispatcher>,
    authorization: Option<Arc<str>>,
}

/// Router without authentication
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    build(dispatcher, None)
}

/// Router that requires `Authorization: Basic` with these credentials
pub fn router_with_auth(dispatcher: Arc<Dispatcher>, username: &str, password: &str) -> Router {
    let credentials = format!("{}:{}", username, password);
    let expected = format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(credentials)
    );
    build(dispatcher, Some(expected.into()))
}

fn build(dispatcher: Arc<Dispatcher>, authorization: Option<Arc<str>>) -> Router {
    Router::new().route("/", post(handle)).with_state(HttpState {
        dispatcher,
        authorization,
    })
}

async fn handle(State(state): State<HttpState>, headers: HeaderMap, body: String) -> Response {
    if let Some(ref expected) = state.authorization {
        let supplied = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if supplied != Some(expected.as_ref()) {
            tracing::warn!("Rejected HTTP request with missing or bad credentials");
            return (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, "Basic realm=\"jsonrpc\"")],
            )
                .into_response();
        }
    }

    let response = state.dispatcher.handle_raw(&body).await;
    ([(CONTENT_TYPE, "application/json")], response).into_response()
}

/// Serve `router` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("HTTP server listening on {}", addr);
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
