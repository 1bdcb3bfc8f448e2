//! Method dispatch
//!
//! Turns a decoded [`Request`] into a [`Response`] by looking the method up in
//! a [`MethodRegistry`], binding its positional params and mapping whatever the
//! handler does (returns, fails, panics) onto a JSON-RPC outcome.

pub mod params;
pub mod registry;

pub use params::FromParams;
pub use registry::{MethodHelp, MethodRegistry};

use async_trait::async_trait;
use chainrpc_core::{JsonRpcService, Request, RequestId, Response, RpcError};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

/// Failure reported by a method handler
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Sent to the caller as-is
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::Other(e.into())
    }
}

impl HandlerError {
    pub fn other(cause: impl std::fmt::Display) -> Self {
        HandlerError::Other(anyhow::anyhow!("{}", cause))
    }

    pub fn into_rpc_error(self) -> RpcError {
        match self {
            HandlerError::Rpc(e) => e,
            HandlerError::InvalidParams(detail) => RpcError::invalid_params(detail),
            HandlerError::Other(cause) => RpcError::server_exception(cause),
        }
    }
}

pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// A service object that exposes its methods through a registry
pub trait RpcService: Send + Sync + 'static {
    fn register(self: Arc<Self>, registry: &mut MethodRegistry);
}

pub struct Dispatcher {
    registry: MethodRegistry,
}

impl Dispatcher {
    /// Wrap a registry. If any method carries help text and the registry has no
    /// `help` of its own, a built-in `help([method])` is added.
    pub fn new(mut registry: MethodRegistry) -> Self {
        let texts = registry.help_texts();
        if !texts.is_empty() && !registry.contains("help") {
            registry.register("help", move |(method,): (Option<String>,)| {
                let texts = texts.clone();
                async move {
                    let help = match method {
                        None => registry::all_methods_help(&texts),
                        Some(name) => match texts.get(&name) {
                            Some(help) => help.detail.clone(),
                            None => {
                                return Err(HandlerError::from(RpcError::method_not_found(&name)))
                            }
                        },
                    };
                    Ok(help)
                }
            });
        }
        Self { registry }
    }

    pub fn for_service<S: RpcService>(service: Arc<S>) -> Self {
        let mut registry = MethodRegistry::new();
        service.register(&mut registry);
        Self::new(registry)
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Decode a raw request body, dispatch it and encode the response.
    pub async fn handle_raw(&self, body: &str) -> String {
        let value: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(e) => {
                debug!("Unparseable request: {}", e);
                return encode(&Response::error(RpcError::parse_error(e), RequestId::Null));
            }
        };

        let request: Request = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = value
                    .get("id")
                    .and_then(|id| serde_json::from_value(id.clone()).ok())
                    .unwrap_or_default();
                return encode(&Response::error(RpcError::invalid_request(e), id));
            }
        };

        encode(&self.call(request).await)
    }
}

pub(crate) fn encode(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!("Failed to encode response: {}", e);
        format!(
            r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"Internal error"}}}}"#,
            chainrpc_core::ErrorCode::InternalError.code()
        )
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[async_trait]
impl JsonRpcService for Dispatcher {
    async fn call(&self, mut request: Request) -> Response {
        if let Err(e) = request.validate() {
            return Response::error_for(&request, e);
        }

        let Some(handler) = self.registry.get(&request.method) else {
            debug!(method = %request.method, "Method not found");
            return Response::error_for(&request, RpcError::method_not_found(&request.method));
        };

        debug!(method = %request.method, id = %request.id, "Dispatching");
        let params = std::mem::take(&mut request.params);

        match AssertUnwindSafe(handler(params)).catch_unwind().await {
            Ok(Ok(result)) => Response::result_for(&request, result),
            Ok(Err(e)) => Response::error_for(&request, e),
            Err(panic) => {
                let cause = panic_message(panic.as_ref());
                error!(method = %request.method, "Handler panicked: {}", cause);
                Response::error_for(&request, RpcError::server_exception(cause))
            }
        }
    }
}
