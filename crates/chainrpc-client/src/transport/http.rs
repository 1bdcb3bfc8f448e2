//! HTTP transport
//!
//! One POST per call with `Connection: close`, so calls never share a socket.

use super::Transport;
use crate::error::TransportError;
use async_trait::async_trait;
use base64::Engine;
use chainrpc_core::{Request, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONNECTION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    authorization: Option<String>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            authorization: None,
        })
    }

    /// Send `Authorization: Basic` with every request
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.authorization = Some(basic_auth(username, password));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

pub fn basic_auth(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(credentials)
    )
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Http(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let body = serde_json::to_vec(&request)?;
        debug!(method = %request.method, id = %request.id, url = %self.url, "Sending request");

        let mut builder = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .header(ACCEPT, "application/json")
            .header(CONNECTION, "close")
            .body(body);
        if let Some(ref auth) = self.authorization {
            builder = builder.header(AUTHORIZATION, auth);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        if status == StatusCode::OK {
            return serde_json::from_slice(&bytes)
                .map_err(|e| TransportError::Decode(e.to_string()));
        }

        warn!(%status, method = %request.method, "Server returned non-200 status");

        // Bitcoin Core answers RPC errors with 404/500 and a JSON-RPC body
        if let Ok(rpc_response) = serde_json::from_slice::<Response>(&bytes) {
            if rpc_response.error.is_some() {
                return Ok(rpc_response);
            }
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::Unauthorized(status.as_u16()));
        }

        let text = String::from_utf8_lossy(&bytes).trim().to_string();
        let message = if text.is_empty() {
            status.canonical_reason().unwrap_or_default().to_string()
        } else {
            text
        };

        Err(TransportError::Status {
            status: status.as_u16(),
            message,
        })
    }
}
