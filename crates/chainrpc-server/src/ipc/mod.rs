//! Unix socket transport for the dispatcher

pub mod server;

pub use server::{IpcServer, IpcServerError};
