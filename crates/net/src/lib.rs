#![warn(missing_docs)]
//! Frame/control relay plumbing shared by the simulation client, the relay
//! server and viewers.
//!
//! - [`protocol`]: JSON message types exchanged over the WebSocket.
//! - [`codec`]: text encoding/decoding with size and content checks.
//! - [`frame_encoder`]: camera frame → JPEG → base64.
//! - [`queue`]: unbounded FIFO of inbound control messages.
//! - [`transport`]: async WebSocket session with a background receive loop.

pub mod codec;
pub mod connection;
pub mod frame_encoder;
pub mod protocol;
pub mod queue;
pub mod transport;

pub use codec::{decode_message, encode_message, CodecError};
pub use connection::{ConnectionState, SharedConnectionState};
pub use frame_encoder::{decode_frame, decode_frame_bytes, FrameEncoder, DEFAULT_JPEG_QUALITY};
pub use protocol::{ControlAction, ControlMessage, FrameMessage, FrameTimestamps, WireMessage};
pub use queue::ControlQueue;
pub use transport::{SessionConfig, TransportSession};
