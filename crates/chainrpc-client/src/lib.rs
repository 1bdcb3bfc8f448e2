//! chainrpc Client Library
//!
//! Sends JSON-RPC requests over a pluggable [`Transport`] and correlates the
//! responses. Use [`RpcClient`] from async code and [`BlockingRpcClient`] from
//! synchronous code.

pub mod blocking;
pub mod error;
pub mod transport;
mod wait;

pub use blocking::BlockingRpcClient;
pub use error::{ClientError, Result, TransportError};
pub use transport::{HttpTransport, LocalTransport, Transport, UnixSocketTransport};
pub use wait::WaitOptions;

use chainrpc_core::models::{ServerConfig, TransportKind};
use chainrpc_core::{Request, RequestId, Response, Version};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::debug;

/// Build a positional parameter list from anything `Serialize`.
///
/// ```
/// use chainrpc_client::params;
/// let params = params!["getblock", 2, Option::<bool>::None];
/// assert_eq!(params.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => { ::std::vec::Vec::<::serde_json::Value>::new() };
    ($($param:expr),+ $(,)?) => {
        vec![$(::serde_json::json!($param)),+]
    };
}

struct Inner {
    transport: Box<dyn Transport>,
    version: Version,
    next_id: AtomicU64,
}

/// Async JSON-RPC client
///
/// Cheap to clone; clones share the transport and the id counter, so ids stay
/// unique across every clone of one client.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

impl RpcClient {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_version(transport, Version::V2)
    }

    /// Client that labels its requests with `version`
    pub fn with_version(transport: impl Transport + 'static, version: Version) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport: Box::new(transport),
                version,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Client for a configured server entry
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ClientError::Protocol(format!("Invalid server config: {}", e)))?;

        match config.transport {
            TransportKind::Http => {
                let url = config.url.as_deref().unwrap_or_default();
                let mut transport = HttpTransport::with_timeout(url, config.timeout())?;
                if let (Some(user), Some(pass)) = (&config.username, &config.password) {
                    transport = transport.with_basic_auth(user, pass);
                }
                Ok(Self::new(transport))
            }
            TransportKind::Unix => {
                let path = config.socket_path.as_deref().unwrap_or_default();
                Ok(Self::new(
                    UnixSocketTransport::new(path).with_timeout(config.timeout()),
                ))
            }
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId::from(self.inner.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Send a request and return the raw response.
    ///
    /// A server-reported error is a successful call here; inspect
    /// [`Response::error`] or use [`RpcClient::send`].
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Response> {
        let request = Request::with_version(self.inner.version, method, params, self.next_id());
        let expected = request.id.clone();

        debug!(method, id = %expected, "Calling");
        let response = self.inner.transport.send(request).await?;

        // Servers that fail before reading the id answer errors with a null id
        let null_id_error = response.is_error() && response.id == RequestId::Null;
        if response.id != expected && !null_id_error {
            return Err(ClientError::Protocol(format!(
                "Response id {} does not match request id {}",
                response.id, expected
            )));
        }
        if !response.has_outcome() {
            return Err(ClientError::Protocol(
                "Response has neither result nor error".to_string(),
            ));
        }

        Ok(response)
    }

    /// Start a call on the runtime and return a handle that resolves with its
    /// response.
    pub fn call_async(&self, method: &str, params: Vec<Value>) -> CallHandle {
        let client = self.clone();
        let method = method.to_string();
        CallHandle {
            handle: tokio::spawn(async move { client.call(&method, params).await }),
        }
    }

    /// Call and deserialize the result, turning a server error into
    /// [`ClientError::Rpc`].
    pub async fn send<R: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<R> {
        let result = self.call(method, params).await?.into_result()?;
        Ok(serde_json::from_value(result)?)
    }
}

/// Completion of a call started with [`RpcClient::call_async`]
pub struct CallHandle {
    handle: JoinHandle<Result<Response>>,
}

impl CallHandle {
    /// Abandon the call; awaiting the handle afterwards yields `Closed`.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Future for CallHandle {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(ClientError::Transport(TransportError::Closed)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chainrpc_core::RpcError;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers every request with a canned response and records what it saw
    struct Scripted {
        seen: Mutex<Vec<Request>>,
        reply: fn(&Request) -> Response,
    }

    impl Scripted {
        fn new(reply: fn(&Request) -> Response) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                reply,
            })
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, request: Request) -> std::result::Result<Response, TransportError> {
            let response = (self.reply)(&request);
            self.seen.lock().unwrap().push(request);
            Ok(response)
        }
    }

    #[test]
    fn test_params_macro() {
        let empty = params![];
        assert!(empty.is_empty());

        let params = params![1, "two", Option::<u32>::None];
        assert_eq!(params, vec![json!(1), json!("two"), Value::Null]);
    }

    #[tokio::test]
    async fn test_ids_start_at_one_and_increase() {
        let transport = Scripted::new(|req| Response::result_for(req, json!(0)));
        let client = RpcClient::new(transport.clone());

        client.call("a", vec![]).await.unwrap();
        client.clone().call("b", vec![]).await.unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].id, RequestId::Number(1));
        assert_eq!(seen[1].id, RequestId::Number(2));
    }

    #[tokio::test]
    async fn test_trailing_nulls_never_reach_transport() {
        let transport = Scripted::new(|req| Response::result_for(req, Value::Null));
        let client = RpcClient::new(transport.clone());

        client
            .call("getblock", params!["abc", Value::Null, Value::Null])
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].params, vec![json!("abc")]);
    }

    #[tokio::test]
    async fn test_id_mismatch_is_protocol_error() {
        let transport = Scripted::new(|_| Response::success(json!(1), RequestId::Number(999)));
        let client = RpcClient::new(transport);

        let err = client.call("x", vec![]).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_missing_outcome_is_protocol_error() {
        let transport = Scripted::new(|req| Response {
            jsonrpc: "2.0".to_string(),
            id: req.id.clone(),
            result: None,
            error: None,
        });
        let client = RpcClient::new(transport);

        let err = client.call("x", vec![]).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_send_maps_server_error() {
        let transport =
            Scripted::new(|req| Response::error_for(req, RpcError::new(-8, "out of range")));
        let client = RpcClient::new(transport);

        let err = client
            .send::<u64>("getblockhash", params![-1])
            .await
            .unwrap_err();
        assert_eq!(err.rpc_code(), Some(-8));

        let response = client.call("getblockhash", params![-1]).await.unwrap();
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn test_null_id_error_is_accepted() {
        let transport =
            Scripted::new(|_| Response::error(RpcError::parse_error("bad json"), RequestId::Null));
        let client = RpcClient::new(transport);

        let response = client.call("x", vec![]).await.unwrap();
        assert_eq!(response.error.unwrap().code, -32700);
    }

    #[tokio::test]
    async fn test_call_async_resolves() {
        let transport = Scripted::new(|req| Response::result_for(req, json!(req.method)));
        let client = RpcClient::new(transport);

        let first = client.call_async("one", vec![]);
        let second = client.call_async("two", vec![]);

        assert_eq!(second.await.unwrap().result, Some(json!("two")));
        assert_eq!(first.await.unwrap().result, Some(json!("one")));
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = ServerConfig::http("localhost");
        assert!(RpcClient::from_config(&config).is_err());
    }
}
