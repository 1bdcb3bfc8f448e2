//! Notification error types

use chainrpc_core::models::Topic;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a push feed. Cloneable so one error can reach every topic.
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Feed source failed: {0}")]
    Source(String),

    #[error("Malformed frame: {0}")]
    Frame(String),

    #[error("Topic {0} is not subscribed")]
    NotSubscribed(Topic),

    #[error("Feed is closed")]
    Closed,
}

impl From<std::io::Error> for FeedError {
    fn from(e: std::io::Error) -> Self {
        FeedError::Io(Arc::new(e))
    }
}

/// Why a chain-tip subscription ended abnormally
#[derive(Error, Debug, Clone)]
pub enum TipStreamError {
    #[error("Subscriber fell behind and its queue overflowed")]
    Overflow,

    #[error("Chain tip service is closed")]
    Closed,

    #[error("Chain tip query failed: {0}")]
    Upstream(String),

    #[error(transparent)]
    Feed(#[from] FeedError),
}

pub type Result<T> = std::result::Result<T, TipStreamError>;
