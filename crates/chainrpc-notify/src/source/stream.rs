//! Frame source over a byte stream

use crate::error::FeedError;
use crate::push::{split_frame, FrameSource, Received};
use chainrpc_core::models::Topic;
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const READ_CHUNK: usize = 16 * 1024;

/// A blocking stream whose reads can be bounded in time
pub trait TimedRead: Read + Send {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;
}

impl TimedRead for UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }
}

impl TimedRead for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
}

/// Reads length-prefixed multipart frames (see [`crate::push::encode_frame`]).
/// The stream carries whatever the publisher sends; topic filtering happens
/// in the demultiplexer.
pub struct StreamFrameSource<T> {
    stream: T,
    buf: Vec<u8>,
    topics: Vec<Topic>,
}

impl StreamFrameSource<UnixStream> {
    pub fn connect_unix(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        debug!("Connecting to push feed at {}", path.display());
        Ok(Self::new(UnixStream::connect(path)?))
    }
}

impl StreamFrameSource<TcpStream> {
    pub fn connect_tcp(addr: impl ToSocketAddrs) -> Result<Self, FeedError> {
        Ok(Self::new(TcpStream::connect(addr)?))
    }
}

impl<T: TimedRead> StreamFrameSource<T> {
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            topics: Vec::new(),
        }
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    fn take_frame(&mut self) -> Result<Option<Vec<Vec<u8>>>, FeedError> {
        match split_frame(&self.buf)? {
            Some((parts, consumed)) => {
                self.buf.drain(..consumed);
                Ok(Some(parts))
            }
            None => Ok(None),
        }
    }
}

impl<T: TimedRead> FrameSource for StreamFrameSource<T> {
    fn subscribe(&mut self, topics: &[Topic]) -> Result<(), FeedError> {
        self.topics = topics.to_vec();
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Received, FeedError> {
        if let Some(parts) = self.take_frame()? {
            return Ok(Received::Frame(parts));
        }

        // A zero timeout means "block forever" to the OS
        let timeout = timeout.max(Duration::from_millis(1));
        self.stream.set_read_timeout(Some(timeout))?;

        let mut chunk = [0u8; READ_CHUNK];
        match self.stream.read(&mut chunk) {
            Ok(0) if self.buf.is_empty() => Ok(Received::End),
            Ok(0) => Err(FeedError::Frame(format!(
                "stream ended inside a frame ({} bytes pending)",
                self.buf.len()
            ))),
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(match self.take_frame()? {
                    Some(parts) => Received::Frame(parts),
                    None => Received::Idle,
                })
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(Received::Idle)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::{encode_frame, encode_message};
    use chainrpc_core::models::TopicMessage;
    use std::io::Write;

    fn frame(topic: Topic, payload: &[u8], sequence: u64) -> Vec<u8> {
        let message = TopicMessage::new(topic, payload.to_vec(), sequence);
        encode_frame(&encode_message(&message)).unwrap()
    }

    fn next_frame(source: &mut StreamFrameSource<UnixStream>) -> Received {
        loop {
            match source.recv(Duration::from_millis(50)).unwrap() {
                Received::Idle => continue,
                other => return other,
            }
        }
    }

    #[test]
    fn test_frames_split_across_writes() {
        let (mut writer, reader) = UnixStream::pair().unwrap();
        let mut source = StreamFrameSource::new(reader);
        source.subscribe(&[Topic::HashBlock]).unwrap();

        let mut bytes = frame(Topic::HashBlock, b"first", 1);
        bytes.extend(frame(Topic::HashBlock, b"second", 2));
        let (head, tail) = bytes.split_at(7);
        writer.write_all(head).unwrap();
        assert_eq!(
            source.recv(Duration::from_millis(20)).unwrap(),
            Received::Idle
        );
        writer.write_all(tail).unwrap();

        let Received::Frame(first) = next_frame(&mut source) else {
            panic!("expected a frame");
        };
        assert_eq!(first[1], b"first");
        let Received::Frame(second) = next_frame(&mut source) else {
            panic!("expected a frame");
        };
        assert_eq!(second[1], b"second");

        drop(writer);
        assert_eq!(next_frame(&mut source), Received::End);
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let (mut writer, reader) = UnixStream::pair().unwrap();
        let mut source = StreamFrameSource::new(reader);

        let bytes = frame(Topic::RawTx, b"payload", 0);
        writer.write_all(&bytes[..bytes.len() - 2]).unwrap();
        drop(writer);

        let err = loop {
            match source.recv(Duration::from_millis(50)) {
                Ok(Received::Idle) => continue,
                Ok(other) => panic!("unexpected {:?}", other),
                Err(e) => break e,
            }
        };
        assert!(matches!(err, FeedError::Frame(_)));
    }
}
