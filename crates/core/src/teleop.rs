//! Keyboard teleoperation command state.
//!
//! Every key press replaces the whole command: all components are zeroed and
//! then at most one directional component is set to `±speed_scale`.

use serde::{Deserialize, Serialize};

/// Default velocity magnitude applied per key.
pub const DEFAULT_SPEED_SCALE: f32 = 0.5;

/// Directional teleop keys understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeleopKey {
    /// +linear_x
    Forward,
    /// -linear_x
    Backward,
    /// +linear_y
    Left,
    /// -linear_y
    Right,
    /// +angular_z
    TurnLeft,
    /// -angular_z
    TurnRight,
}

impl TeleopKey {
    /// Parse the key name carried in a keyboard control message.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "forward" => Some(Self::Forward),
            "backward" => Some(Self::Backward),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "turn_left" => Some(Self::TurnLeft),
            "turn_right" => Some(Self::TurnRight),
            _ => None,
        }
    }

    /// Wire name of the key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::TurnLeft => "turn_left",
            Self::TurnRight => "turn_right",
        }
    }
}

/// Commanded base velocities.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TeleopCommand {
    /// Forward velocity (m/s).
    pub linear_x: f32,
    /// Lateral velocity (m/s), positive to the left.
    pub linear_y: f32,
    /// Yaw rate (rad/s), positive counter-clockwise.
    pub angular_z: f32,
    /// Body height offset; keyboard updates always zero it.
    pub body_height: f32,
}

impl TeleopCommand {
    /// All-zero command.
    pub const ZERO: Self = Self {
        linear_x: 0.0,
        linear_y: 0.0,
        angular_z: 0.0,
        body_height: 0.0,
    };

    /// `(linear_x, linear_y, angular_z)` triple fed to the controller.
    pub fn velocity(&self) -> (f32, f32, f32) {
        (self.linear_x, self.linear_y, self.angular_z)
    }
}

/// Keyboard-driven teleop state.
#[derive(Debug, Clone)]
pub struct TeleopController {
    command: TeleopCommand,
    speed_scale: f32,
}

impl TeleopController {
    /// Controller with an explicit velocity magnitude.
    pub fn new(speed_scale: f32) -> Self {
        Self {
            command: TeleopCommand::ZERO,
            speed_scale,
        }
    }

    /// Apply a key by wire name.
    ///
    /// Unknown names still reset the command to zero.
    pub fn update_from_keyboard(&mut self, key: &str) {
        self.apply(TeleopKey::parse(key));
    }

    /// Reset the command, then set the component driven by `key`.
    pub fn apply(&mut self, key: Option<TeleopKey>) {
        self.command = TeleopCommand::ZERO;
        let s = self.speed_scale;
        match key {
            Some(TeleopKey::Forward) => self.command.linear_x = s,
            Some(TeleopKey::Backward) => self.command.linear_x = -s,
            Some(TeleopKey::Left) => self.command.linear_y = s,
            Some(TeleopKey::Right) => self.command.linear_y = -s,
            Some(TeleopKey::TurnLeft) => self.command.angular_z = s,
            Some(TeleopKey::TurnRight) => self.command.angular_z = -s,
            None => {}
        }
    }

    /// Zero the command without applying a key.
    pub fn stop(&mut self) {
        self.command = TeleopCommand::ZERO;
    }

    /// Current command.
    pub fn command(&self) -> TeleopCommand {
        self.command
    }

    /// Velocity magnitude per key.
    pub fn speed_scale(&self) -> f32 {
        self.speed_scale
    }
}

impl Default for TeleopController {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED_SCALE)
    }
}
