//! Message transports
//!
//! A transport moves one encoded [`Request`] to the server and brings back the
//! matching [`Response`]. It knows nothing about ids or error codes; the
//! [`RpcClient`](crate::RpcClient) checks those.

pub mod http;
pub mod local;
pub mod unix;

pub use http::HttpTransport;
pub use local::LocalTransport;
pub use unix::UnixSocketTransport;

use crate::error::TransportError;
use async_trait::async_trait;
use chainrpc_core::{Request, Response};
use std::sync::Arc;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        (**self).send(request).await
    }
}
