//! Frame source implementations

mod channel;
mod stream;
#[cfg(feature = "zmq")]
mod zmq;

pub use channel::{ChannelFeed, ChannelFrameSource};
pub use stream::{StreamFrameSource, TimedRead};
#[cfg(feature = "zmq")]
pub use self::zmq::ZmqFrameSource;
