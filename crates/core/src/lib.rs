#![warn(missing_docs)]
//! Core primitives shared across the workspace.

pub mod frame;
pub mod pattern;
pub mod teleop;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use frame::{FrameError, ImageFrame};
pub use pattern::test_pattern;
pub use teleop::{TeleopCommand, TeleopController, TeleopKey};

/// Fixed simulation step counter (100 Hz => 10 ms per tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTick(pub u64);

impl SimTick {
    /// First tick in any timeline.
    pub const ZERO: Self = Self(0);

    /// Advance by `delta` ticks.
    pub fn advance(self, delta: u64) -> Self {
        Self(self.0 + delta)
    }

    /// Whether this tick falls on a cadence of `every` ticks.
    ///
    /// A cadence of zero never fires.
    pub fn is_multiple_of(self, every: u64) -> bool {
        every != 0 && self.0 % every == 0
    }
}
