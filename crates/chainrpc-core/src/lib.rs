//! chainrpc core types
//!
//! JSON-RPC message model, chain-tip and pub/sub topic models, configuration,
//! and the server-side service contract shared by the client and server crates.

pub mod error;
pub mod models;
pub mod protocol;
pub mod service;
pub mod storage;

pub use error::{Error, Result};
pub use protocol::{ErrorCode, Request, RequestId, Response, RpcError, Version};
pub use service::JsonRpcService;
