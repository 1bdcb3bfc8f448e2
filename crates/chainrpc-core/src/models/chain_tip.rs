//! Chain tip snapshot as reported by `getchaintips`

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 32-byte block hash, kept in display (RPC) byte order
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a raw 32-byte slice, as carried by a `hashblock` notification.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::Validation(format!("Block hash must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(array))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self)
    }
}

impl FromStr for BlockHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::Validation(format!("Invalid block hash '{}': {}", s, e)))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainTipStatus {
    Active,
    ValidFork,
    ValidHeaders,
    HeadersOnly,
    Invalid,
}

/// One element of the `getchaintips` result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainTip {
    pub height: u64,
    pub hash: BlockHash,
    pub branchlen: u64,
    pub status: ChainTipStatus,
}

impl ChainTip {
    /// The tip of the main chain
    pub fn active(height: u64, hash: BlockHash) -> Self {
        Self {
            height,
            hash,
            branchlen: 0,
            status: ChainTipStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ChainTipStatus::Active
    }

    pub fn find_active(tips: &[ChainTip]) -> Option<&ChainTip> {
        tips.iter().find(|tip| tip.is_active())
    }
}

impl fmt::Display for ChainTip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.hash, self.height)
    }
}
