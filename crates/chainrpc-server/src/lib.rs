//! chainrpc Server Library
//!
//! Method dispatch for JSON-RPC services plus the Unix-socket and HTTP
//! front ends used by `chainrpcd`.

pub mod dispatch;
pub mod echo;
pub mod http;
pub mod ipc;

pub use dispatch::{Dispatcher, HandlerError, HandlerResult, MethodRegistry, RpcService};
pub use echo::{EchoService, NoopShutdown, ShutdownService, TokenShutdown};
pub use ipc::IpcServer;
