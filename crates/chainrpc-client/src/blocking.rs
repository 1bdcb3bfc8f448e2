//! Synchronous client surface
//!
//! Wraps an [`RpcClient`] in a private current-thread runtime and blocks the
//! calling thread until each call completes. Must not be used from inside an
//! async context.

use crate::error::{ClientError, Result};
use crate::wait::WaitOptions;
use crate::RpcClient;
use chainrpc_core::models::ServerConfig;
use chainrpc_core::Response;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

pub struct BlockingRpcClient {
    runtime: Runtime,
    client: RpcClient,
}

impl BlockingRpcClient {
    /// `make_client` runs inside the private runtime, so transports that spawn
    /// tasks find one.
    pub fn new<F>(make_client: F) -> Result<Self>
    where
        F: FnOnce() -> Result<RpcClient>,
    {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ClientError::Transport(e.into()))?;
        let client = {
            let _guard = runtime.enter();
            make_client()?
        };
        Ok(Self { runtime, client })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new(|| RpcClient::from_config(config))
    }

    pub fn call(&self, method: &str, params: Vec<Value>) -> Result<Response> {
        self.runtime.block_on(self.client.call(method, params))
    }

    pub fn send<R: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<R> {
        self.runtime.block_on(self.client.send(method, params))
    }

    pub fn wait_for_server(&self, timeout: Duration) -> Result<bool> {
        self.runtime.block_on(self.client.wait_for_server(timeout))
    }

    pub fn wait_for_server_with(&self, timeout: Duration, options: &WaitOptions) -> Result<bool> {
        self.runtime
            .block_on(self.client.wait_for_server_with(timeout, options))
    }

    /// The async client sharing this client's transport and id counter
    pub fn async_client(&self) -> &RpcClient {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use chainrpc_core::Request;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Transport for Echo {
        async fn send(&self, request: Request) -> std::result::Result<Response, TransportError> {
            Ok(Response::result_for(
                &request,
                Value::Array(request.params.clone()),
            ))
        }
    }

    #[test]
    fn test_blocking_call() {
        let client = BlockingRpcClient::new(|| Ok(RpcClient::new(Echo))).unwrap();

        let echoed: Vec<String> = client.send("echo", vec![json!("hi")]).unwrap();
        assert_eq!(echoed, vec!["hi".to_string()]);

        let response = client.call("echo", vec![]).unwrap();
        assert_eq!(response.result, Some(json!([])));
        assert!(client.wait_for_server(Duration::from_secs(1)).unwrap());
    }
}
