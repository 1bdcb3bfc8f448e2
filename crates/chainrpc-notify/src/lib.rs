//! chainrpc notification services
//!
//! Event adapters over a full node (timed polling and pub/sub push feeds) and
//! the chain tip service built on top of them.

pub mod chain_tip;
pub mod distinct;
pub mod error;
pub mod poll;
pub mod push;
pub mod source;

pub use chain_tip::{ChainTipQuery, ChainTipService, TipSubscription};
pub use distinct::DistinctUntilChanged;
pub use error::{FeedError, Result, TipStreamError};
pub use poll::{PollConfig, PollFailure, PollingSource};
pub use push::{FrameSource, Received, TopicDemux, TopicStream};
pub use source::{ChannelFeed, ChannelFrameSource, StreamFrameSource};
#[cfg(feature = "zmq")]
pub use source::ZmqFrameSource;
