//! ZeroMQ SUB socket frame source

use crate::error::FeedError;
use crate::push::{FrameSource, Received};
use chainrpc_core::models::Topic;
use std::time::Duration;
use tracing::debug;

pub struct ZmqFrameSource {
    endpoint: String,
    socket: zmq::Socket,
    timeout_ms: Option<i32>,
    // The socket must be dropped before its context
    _context: zmq::Context,
}

impl ZmqFrameSource {
    /// Connect a SUB socket to `endpoint`, e.g. `tcp://127.0.0.1:28332`.
    pub fn connect(endpoint: &str) -> Result<Self, FeedError> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::SUB).map_err(zmq_error)?;
        socket.connect(endpoint).map_err(zmq_error)?;
        debug!("Connected SUB socket to {}", endpoint);

        Ok(Self {
            endpoint: endpoint.to_string(),
            socket,
            timeout_ms: None,
            _context: context,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl FrameSource for ZmqFrameSource {
    fn subscribe(&mut self, topics: &[Topic]) -> Result<(), FeedError> {
        for topic in topics {
            self.socket
                .set_subscribe(topic.as_str().as_bytes())
                .map_err(zmq_error)?;
        }
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Received, FeedError> {
        let timeout_ms = i32::try_from(timeout.as_millis())
            .unwrap_or(i32::MAX)
            .max(1);
        if self.timeout_ms != Some(timeout_ms) {
            self.socket.set_rcvtimeo(timeout_ms).map_err(zmq_error)?;
            self.timeout_ms = Some(timeout_ms);
        }

        match self.socket.recv_multipart(0) {
            Ok(parts) => Ok(Received::Frame(parts)),
            Err(zmq::Error::EAGAIN) | Err(zmq::Error::EINTR) => Ok(Received::Idle),
            Err(zmq::Error::ETERM) => Ok(Received::End),
            Err(e) => Err(zmq_error(e)),
        }
    }
}

fn zmq_error(e: zmq::Error) -> FeedError {
    FeedError::Source(format!("zmq: {}", e))
}
