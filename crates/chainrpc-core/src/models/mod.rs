pub mod chain_tip;
pub mod config;
pub mod topic;

pub use chain_tip::{BlockHash, ChainTip, ChainTipStatus};
pub use config::{Config, DaemonConfig, NotifyConfig, ServerConfig, TransportKind};
pub use topic::{Topic, TopicMessage};
