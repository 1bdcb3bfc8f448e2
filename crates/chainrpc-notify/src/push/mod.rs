//! Push event source
//!
//! A [`FrameSource`] yields multipart frames from a publisher; a
//! [`TopicDemux`] reads it on a dedicated thread and fans each decoded
//! message out to the stream for its topic.

mod demux;
pub mod frame;

pub use demux::{TopicDemux, TopicStream, RECV_POLL_INTERVAL};
pub use frame::{decode_message, encode_frame, encode_message, split_frame};

use crate::error::FeedError;
use chainrpc_core::models::Topic;
use std::time::Duration;

/// Outcome of one blocking receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// One multipart frame
    Frame(Vec<Vec<u8>>),
    /// Nothing arrived within the timeout
    Idle,
    /// The publisher went away cleanly
    End,
}

/// Blocking source of multipart frames, owned by a single receive thread.
pub trait FrameSource: Send {
    /// Register interest in `topics`. Called once before the first receive.
    fn subscribe(&mut self, topics: &[Topic]) -> Result<(), FeedError>;

    /// Wait up to `timeout` for the next frame.
    fn recv(&mut self, timeout: Duration) -> Result<Received, FeedError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn subscribe(&mut self, topics: &[Topic]) -> Result<(), FeedError> {
        (**self).subscribe(topics)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Received, FeedError> {
        (**self).recv(timeout)
    }
}
