//! Server-side service contract

use crate::protocol::{Request, Response};
use async_trait::async_trait;

/// Something that answers JSON-RPC requests.
///
/// Implementations never fail: every error condition is reported inside the
/// returned [`Response`], which echoes the request's version and id.
#[async_trait]
pub trait JsonRpcService: Send + Sync {
    async fn call(&self, request: Request) -> Response;
}

#[async_trait]
impl<T: JsonRpcService + ?Sized> JsonRpcService for std::sync::Arc<T> {
    async fn call(&self, request: Request) -> Response {
        (**self).call(request).await
    }
}
