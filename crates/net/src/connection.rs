//! Connection lifecycle state.
//!
//! Only the transport session (and its receive task) changes the state;
//! everyone else gets a read-only view through [`SharedConnectionState`].

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Where a transport session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Never connected, or closed cleanly.
    Disconnected = 0,
    /// Handshake in progress.
    Connecting = 1,
    /// Handshake done, receive loop running.
    Connected = 2,
    /// Connect, read or write failed; the session needs a new `connect()`.
    Failed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Canonical label used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only, cloneable view of a session's connection state.
#[derive(Debug, Clone)]
pub struct SharedConnectionState {
    cell: Arc<AtomicU8>,
}

impl SharedConnectionState {
    pub(crate) fn new() -> Self {
        Self {
            cell: Arc::new(AtomicU8::new(ConnectionState::Disconnected as u8)),
        }
    }

    /// Current state.
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.cell.load(Ordering::Acquire))
    }

    /// Whether frames may be sent right now.
    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.cell.store(state as u8, Ordering::Release);
    }

    /// Move `from` → `to` only if the state is still `from`.
    ///
    /// Returns whether the transition happened.
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.cell
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
