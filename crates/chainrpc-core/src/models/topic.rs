//! Pub/sub topics published by a full node

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    HashBlock,
    HashTx,
    RawBlock,
    RawTx,
    Sequence,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::HashBlock,
        Topic::HashTx,
        Topic::RawBlock,
        Topic::RawTx,
        Topic::Sequence,
    ];

    /// Name as it appears in the first frame of a notification
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::HashBlock => "hashblock",
            Topic::HashTx => "hashtx",
            Topic::RawBlock => "rawblock",
            Topic::RawTx => "rawtx",
            Topic::Sequence => "sequence",
        }
    }

    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str().as_bytes() == bytes)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_wire(s.as_bytes())
            .ok_or_else(|| Error::Validation(format!("Unknown topic '{}'", s)))
    }
}

/// A decoded notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessage {
    pub topic: Topic,
    pub payload: Vec<u8>,
    pub sequence: u64,
}

impl TopicMessage {
    pub fn new(topic: Topic, payload: Vec<u8>, sequence: u64) -> Self {
        Self {
            topic,
            payload,
            sequence,
        }
    }
}
