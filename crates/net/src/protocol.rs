//! Protocol message definitions for simulation ↔ relay ↔ viewer traffic.
//!
//! Every message is one JSON object in one WebSocket text frame, tagged by
//! its `"type"` field.

use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum size of one encoded message (bytes).
/// 16MB covers a 4K JPEG at high quality after base64 expansion.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Maximum length of a teleop key name.
pub const MAX_KEY_LEN: usize = 64;

/// Maximum number of auxiliary fields in a control message.
pub const MAX_CONTROL_FIELDS: usize = 16;

/// Messages carried over the relay connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Identification sent once by the simulation after connecting.
    Simulation,

    /// Identification sent by a viewer after connecting.
    Viewer,

    /// Compressed camera frame from the simulation.
    Frame(FrameMessage),

    /// Command from a viewer to the simulation.
    Control(ControlMessage),
}

impl WireMessage {
    /// Value of the `"type"` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Simulation => "simulation",
            WireMessage::Viewer => "viewer",
            WireMessage::Frame(_) => "frame",
            WireMessage::Control(_) => "control",
        }
    }

    /// Verify message limits and validity.
    ///
    /// Called on every decoded message; peers are not trusted.
    pub fn verify(&self) -> Result<(), &'static str> {
        match self {
            WireMessage::Frame(frame) => frame.verify(),
            WireMessage::Control(control) => control.verify(),
            WireMessage::Simulation | WireMessage::Viewer => Ok(()),
        }
    }
}

/// One streamed frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameMessage {
    /// Base64 text of the JPEG bytes.
    pub frame: String,
    /// ISO-8601 capture time.
    pub timestamp: String,
}

impl FrameMessage {
    /// Parse the timestamp, if it is valid RFC 3339.
    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }

    fn verify(&self) -> Result<(), &'static str> {
        if self.frame.is_empty() {
            return Err("Frame payload is empty");
        }
        if self.timestamp.is_empty() {
            return Err("Frame timestamp is empty");
        }
        Ok(())
    }
}

/// Discrete viewer commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Reset the scene and the simulation clock.
    Reset,
    /// Toggle pause.
    Pause,
    /// Return the robot to its standing pose.
    Stand,
    /// Teleop key press; `data.key` names the key.
    Keyboard,
}

impl ControlAction {
    /// Wire name of the action.
    pub const fn as_str(self) -> &'static str {
        match self {
            ControlAction::Reset => "reset",
            ControlAction::Pause => "pause",
            ControlAction::Stand => "stand",
            ControlAction::Keyboard => "keyboard",
        }
    }

    /// Parse a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "reset" => Some(ControlAction::Reset),
            "pause" => Some(ControlAction::Pause),
            "stand" => Some(ControlAction::Stand),
            "keyboard" => Some(ControlAction::Keyboard),
            _ => None,
        }
    }
}

/// Control command as received from the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlMessage {
    /// What to do.
    pub action: ControlAction,
    /// Action-specific fields.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl ControlMessage {
    /// Control without auxiliary data.
    pub fn new(action: ControlAction) -> Self {
        Self {
            action,
            data: Map::new(),
        }
    }

    /// Keyboard control carrying `key`.
    pub fn keyboard(key: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("key".to_string(), Value::String(key.into()));
        Self {
            action: ControlAction::Keyboard,
            data,
        }
    }

    /// The `data.key` field, if present and a string.
    pub fn key(&self) -> Option<&str> {
        self.data.get("key").and_then(Value::as_str)
    }

    fn verify(&self) -> Result<(), &'static str> {
        if self.data.len() > MAX_CONTROL_FIELDS {
            return Err("Too many control fields");
        }
        if let Some(key) = self.key() {
            if key.len() > MAX_KEY_LEN {
                return Err("Control key too long");
            }
        }
        Ok(())
    }
}

/// Issues strictly increasing frame timestamps.
///
/// Wall-clock reads can repeat (or step backwards) between two frames sent in
/// quick succession; the stamp is bumped by one microsecond past the previous
/// one whenever that happens.
#[derive(Debug, Default)]
pub struct FrameTimestamps {
    last: Option<DateTime<Utc>>,
}

impl FrameTimestamps {
    /// Fresh clock with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp as RFC 3339 text with microsecond precision.
    pub fn next(&mut self) -> String {
        self.next_from(Utc::now())
    }

    fn next_from(&mut self, now: DateTime<Utc>) -> String {
        let mut stamp = now.trunc_subsecs(6);
        if let Some(last) = self.last {
            if stamp <= last {
                stamp = last + Duration::microseconds(1);
            }
        }
        self.last = Some(stamp);
        stamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}
