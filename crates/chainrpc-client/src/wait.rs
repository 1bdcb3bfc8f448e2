//! Waiting for a server that is starting up

use crate::error::{ClientError, Result, TransportError};
use crate::RpcClient;
use chainrpc_core::{ErrorCode, RpcError};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Bitcoin Core's "still loading" error code
pub const RPC_IN_WARMUP: i32 = -28;

#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Method called to see whether the server answers
    pub ready_method: String,
    /// Delay between attempts
    pub retry_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            ready_method: "getblockcount".to_string(),
            retry_interval: Duration::from_secs(1),
        }
    }
}

enum Attempt {
    Ready,
    Waiting(RpcError),
    Failed(ClientError),
}

/// Unreachable servers get a synthetic -20000 status so they log like warm-up errors.
fn classify(outcome: Result<chainrpc_core::Response>) -> Attempt {
    match outcome {
        Ok(response) => match response.error {
            None => Attempt::Ready,
            Some(e) if e.code == RPC_IN_WARMUP || e.code == ErrorCode::ServerUnavailable.code() => {
                Attempt::Waiting(e)
            }
            Some(e) => Attempt::Failed(ClientError::Rpc(e)),
        },
        Err(ClientError::Transport(
            e @ (TransportError::Connect(_)
            | TransportError::Closed
            | TransportError::Timeout
            | TransportError::Io(_)),
        )) => Attempt::Waiting(
            RpcError::of(ErrorCode::ServerUnavailable).with_data(Value::String(e.to_string())),
        ),
        Err(e) => Attempt::Failed(e),
    }
}

fn status_text(status: &RpcError) -> String {
    match status.data {
        Some(Value::String(ref detail)) => format!("{}: {}", status.message, detail),
        _ => status.message.clone(),
    }
}

impl RpcClient {
    /// Poll the server with `getblockcount` once a second until it answers.
    ///
    /// Returns `Ok(true)` once it does and `Ok(false)` if `timeout` elapses
    /// first. Errors other than "unreachable" or "warming up" are returned.
    pub async fn wait_for_server(&self, timeout: Duration) -> Result<bool> {
        self.wait_for_server_with(timeout, &WaitOptions::default())
            .await
    }

    pub async fn wait_for_server_with(
        &self,
        timeout: Duration,
        options: &WaitOptions,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut last_status: Option<String> = None;
        debug!(method = %options.ready_method, "Waiting for server RPC ready");

        loop {
            let attempt =
                tokio::time::timeout_at(deadline, self.call(&options.ready_method, vec![])).await;
            let Ok(outcome) = attempt else {
                break;
            };

            match classify(outcome) {
                Attempt::Ready => {
                    info!("Server is ready");
                    return Ok(true);
                }
                Attempt::Failed(e) => return Err(e),
                Attempt::Waiting(status) => {
                    let text = status_text(&status);
                    if last_status.as_deref() != Some(text.as_str()) {
                        info!("Waiting for server: {}", text);
                        last_status = Some(text);
                    }
                }
            }

            let next = Instant::now() + options.retry_interval;
            if next >= deadline {
                tokio::time::sleep_until(deadline).await;
                break;
            }
            tokio::time::sleep_until(next).await;
        }

        warn!("Timed out after {:?} waiting for server", timeout);
        Ok(false)
    }
}
