//! Multipart notification frames
//!
//! A notification arrives as `[topic, payload, sequence]`. On byte streams
//! each frame is written as a `u8` part count followed by every part as a
//! big-endian `u32` length and its bytes.

use crate::error::FeedError;
use chainrpc_core::models::{Topic, TopicMessage};

/// Largest single part accepted from a byte stream (a raw block fits easily)
pub const MAX_PART_LEN: usize = 32 * 1024 * 1024;

/// Decode the parts of one notification.
///
/// The sequence number is little-endian, 4 bytes as Bitcoin Core sends it or
/// 8 bytes. A missing sequence part reads as 0.
pub fn decode_message(parts: &[Vec<u8>]) -> Result<TopicMessage, FeedError> {
    let (topic, rest) = parts
        .split_first()
        .ok_or_else(|| FeedError::Frame("empty frame".to_string()))?;

    let topic = Topic::from_wire(topic).ok_or_else(|| {
        FeedError::Frame(format!(
            "unknown topic '{}'",
            String::from_utf8_lossy(topic)
        ))
    })?;

    let payload = rest
        .first()
        .cloned()
        .ok_or_else(|| FeedError::Frame(format!("{} frame has no payload", topic)))?;

    let sequence = match rest.get(1) {
        None => 0,
        Some(bytes) => decode_sequence(bytes)?,
    };

    if rest.len() > 2 {
        return Err(FeedError::Frame(format!(
            "{} frame has {} parts, expected at most 3",
            topic,
            parts.len()
        )));
    }

    Ok(TopicMessage::new(topic, payload, sequence))
}

fn decode_sequence(bytes: &[u8]) -> Result<u64, FeedError> {
    match bytes.len() {
        4 => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(bytes);
            Ok(u32::from_le_bytes(buf) as u64)
        }
        8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            Ok(u64::from_le_bytes(buf))
        }
        n => Err(FeedError::Frame(format!("sequence is {} bytes", n))),
    }
}

/// Encode a message the way a publisher sends it. The sequence takes 4 bytes
/// while it fits a `u32` and 8 bytes after that.
pub fn encode_message(message: &TopicMessage) -> Vec<Vec<u8>> {
    let sequence = match u32::try_from(message.sequence) {
        Ok(short) => short.to_le_bytes().to_vec(),
        Err(_) => message.sequence.to_le_bytes().to_vec(),
    };
    vec![
        message.topic.as_str().as_bytes().to_vec(),
        message.payload.clone(),
        sequence,
    ]
}

/// Serialize parts with stream framing.
pub fn encode_frame<P: AsRef<[u8]>>(parts: &[P]) -> Result<Vec<u8>, FeedError> {
    let count = u8::try_from(parts.len())
        .map_err(|_| FeedError::Frame(format!("{} parts do not fit a frame", parts.len())))?;

    let total: usize = parts.iter().map(|p| p.as_ref().len() + 4).sum();
    let mut out = Vec::with_capacity(1 + total);
    out.push(count);
    for part in parts {
        let part = part.as_ref();
        let len = u32::try_from(part.len())
            .map_err(|_| FeedError::Frame(format!("part of {} bytes is too long", part.len())))?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(part);
    }
    Ok(out)
}

/// Try to split one frame off the front of `buf`.
///
/// Returns the parts and the number of bytes consumed, or `None` when `buf`
/// does not yet hold a whole frame.
pub fn split_frame(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>, FeedError> {
    let Some((&count, mut rest)) = buf.split_first() else {
        return Ok(None);
    };

    let mut parts = Vec::with_capacity(count as usize);
    let mut consumed = 1;
    for _ in 0..count {
        if rest.len() < 4 {
            return Ok(None);
        }
        let (len_bytes, tail) = rest.split_at(4);
        let mut len_buf = [0u8; 4];
        len_buf.copy_from_slice(len_bytes);
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_PART_LEN {
            return Err(FeedError::Frame(format!(
                "part of {} bytes exceeds limit",
                len
            )));
        }
        if tail.len() < len {
            return Ok(None);
        }
        let (part, tail) = tail.split_at(len);
        parts.push(part.to_vec());
        consumed += 4 + len;
        rest = tail;
    }

    Ok(Some((parts, consumed)))
}
