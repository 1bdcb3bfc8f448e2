//! Client error types

use chainrpc_core::RpcError;
use thiserror::Error;

/// Failure to exchange a message with the server
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Could not connect to server: {0}")]
    Connect(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Server rejected credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("Connection closed")]
    Closed,

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("JSON encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl TransportError {
    /// The server could not be reached at all
    pub fn is_connect(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Transport(TransportError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(#[from] RpcError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Decode(msg) => ClientError::Protocol(msg),
            other => ClientError::Transport(other),
        }
    }
}

impl ClientError {
    /// Retrying cannot help: the server refused our credentials
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(TransportError::Unauthorized(_))
        )
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, ClientError::Transport(e) if e.is_connect())
    }

    /// Server-reported error code, if any
    pub fn rpc_code(&self) -> Option<i32> {
        match self {
            ClientError::Rpc(e) => Some(e.code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_becomes_protocol_error() {
        let err: ClientError = TransportError::Decode("eof".to_string()).into();
        assert!(matches!(err, ClientError::Protocol(_)));

        let err: ClientError = TransportError::Connect("refused".to_string()).into();
        assert!(err.is_connect());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_unauthorized_is_fatal() {
        let err: ClientError = TransportError::Unauthorized(401).into();
        assert!(err.is_fatal());
        assert!(!err.is_connect());
    }
}
