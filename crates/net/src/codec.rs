//! Message encoding and decoding.
//!
//! One [`WireMessage`] maps to one JSON text payload; WebSocket framing keeps
//! message boundaries, so no length prefix is added here.

use crate::protocol::{WireMessage, MAX_MESSAGE_LEN};
use thiserror::Error;

/// Failure to turn text into a valid [`WireMessage`] (or back).
#[derive(Debug, Error)]
pub enum CodecError {
    /// Not JSON, or not one of the known message shapes.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Payload larger than [`MAX_MESSAGE_LEN`].
    #[error("message of {len} bytes exceeds limit of {limit}")]
    TooLarge {
        /// Payload size.
        len: usize,
        /// Configured limit.
        limit: usize,
    },
    /// Well-formed but violates a protocol limit.
    #[error("invalid message: {0}")]
    Invalid(&'static str),
}

/// Serialize a message to its wire text.
pub fn encode_message(msg: &WireMessage) -> Result<String, CodecError> {
    let text = serde_json::to_string(msg)?;
    if text.len() > MAX_MESSAGE_LEN {
        return Err(CodecError::TooLarge {
            len: text.len(),
            limit: MAX_MESSAGE_LEN,
        });
    }
    Ok(text)
}

/// Parse and verify a message received from a peer.
pub fn decode_message(text: &str) -> Result<WireMessage, CodecError> {
    if text.len() > MAX_MESSAGE_LEN {
        return Err(CodecError::TooLarge {
            len: text.len(),
            limit: MAX_MESSAGE_LEN,
        });
    }
    let msg: WireMessage = serde_json::from_str(text)?;
    msg.verify().map_err(CodecError::Invalid)?;
    Ok(msg)
}
