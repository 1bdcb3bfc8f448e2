//! In-process transport
//!
//! Hands requests straight to a [`JsonRpcService`]. Messages still pass through
//! their JSON encoding in both directions so the wire contract is exercised.

use super::Transport;
use crate::error::TransportError;
use async_trait::async_trait;
use chainrpc_core::{JsonRpcService, Request, Response};
use std::sync::Arc;

pub struct LocalTransport {
    service: Arc<dyn JsonRpcService>,
}

impl LocalTransport {
    pub fn new(service: Arc<dyn JsonRpcService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let encoded = serde_json::to_string(&request)?;
        let request: Request =
            serde_json::from_str(&encoded).map_err(|e| TransportError::Decode(e.to_string()))?;

        let response = self.service.call(request).await;

        let encoded = serde_json::to_string(&response)?;
        serde_json::from_str(&encoded).map_err(|e| TransportError::Decode(e.to_string()))
    }
}
