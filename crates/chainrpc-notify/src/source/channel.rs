//! In-process frame source

use crate::error::FeedError;
use crate::push::{FrameSource, Received};
use chainrpc_core::models::Topic;
use std::sync::mpsc;
use std::time::Duration;

type Item = Result<Vec<Vec<u8>>, FeedError>;

/// Frame source fed from the same process through a [`ChannelFeed`].
/// Dropping every feed handle ends the source.
pub struct ChannelFrameSource {
    rx: mpsc::Receiver<Item>,
    topics: Vec<Topic>,
}

/// Sending half of a [`ChannelFrameSource`]
#[derive(Clone)]
pub struct ChannelFeed {
    tx: mpsc::Sender<Item>,
}

impl ChannelFrameSource {
    pub fn new() -> (Self, ChannelFeed) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                rx,
                topics: Vec::new(),
            },
            ChannelFeed { tx },
        )
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }
}

impl FrameSource for ChannelFrameSource {
    fn subscribe(&mut self, topics: &[Topic]) -> Result<(), FeedError> {
        self.topics = topics.to_vec();
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Received, FeedError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(parts)) => Ok(Received::Frame(parts)),
            Ok(Err(e)) => Err(e),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(Received::Idle),
            Err(mpsc::RecvTimeoutError::Disconnected) => Ok(Received::End),
        }
    }
}

impl ChannelFeed {
    pub fn send_frame(&self, parts: Vec<Vec<u8>>) -> Result<(), FeedError> {
        self.tx.send(Ok(parts)).map_err(|_| FeedError::Closed)
    }

    /// Make the source fail with `error` after the frames already queued.
    pub fn fail(&self, error: FeedError) -> Result<(), FeedError> {
        self.tx.send(Err(error)).map_err(|_| FeedError::Closed)
    }
}
