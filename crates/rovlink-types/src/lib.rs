use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Duration applied to a `move` command that omits one, in seconds.
pub const DEFAULT_MOVE_DURATION_SECS: f64 = 2.0;

/// Longest `move` or `animate` duration accepted, in seconds.
pub const MAX_COMMAND_DURATION_SECS: f64 = 3600.0;

fn default_move_duration() -> f64 {
    DEFAULT_MOVE_DURATION_SECS
}

/// Drive direction of the differential base.
///
/// On the wire a direction is a lowercase string.  The short aliases used by
/// operator tooling (`f`, `b`, `back`, `l`, `r`) are accepted when decoding and
/// always normalised to the long form when encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = RovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f" | "forward" => Ok(Direction::Forward),
            "b" | "back" | "backward" => Ok(Direction::Backward),
            "l" | "left" => Ok(Direction::Left),
            "r" | "right" => Ok(Direction::Right),
            other => Err(RovError::InvalidCommand(format!(
                "unrecognized direction '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = RovError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Direction> for String {
    fn from(d: Direction) -> Self {
        d.as_str().to_string()
    }
}

/// Viseme drawn by the face display for one keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouthShape {
    A,
    E,
    I,
    O,
    U,
    M,
    F,
    #[serde(rename = "closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EyeState {
    Open,
    Closed,
    Half,
}

/// One step of a face animation, `time` seconds after the animation starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub mouth_shape: MouthShape,
    pub eye_state: EyeState,
}

/// Commands sent from the controller to the actuator host.
///
/// Commands carry no identity; the actuator applies them strictly in arrival
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Command {
    /// Drive in `direction` for `duration` seconds, replacing any motion in
    /// flight.
    Move {
        direction: Direction,
        #[serde(default = "default_move_duration")]
        duration: f64,
    },
    /// Idempotent immediate stop.
    Stop,
    /// Play encoded audio on the speaker (latest wins).
    Speak {
        #[serde(with = "base64_bytes")]
        audio: Vec<u8>,
    },
    /// Render a face animation on the local display.
    Animate {
        keyframes: Vec<Keyframe>,
        duration: f64,
    },
}

impl Command {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Move { .. } => "move",
            Command::Stop => "stop",
            Command::Speak { .. } => "speak",
            Command::Animate { .. } => "animate",
        }
    }

    /// Check the semantic constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`RovError::InvalidCommand`] for a negative or non-finite
    /// duration, or one above [`MAX_COMMAND_DURATION_SECS`].
    pub fn validate(&self) -> Result<(), RovError> {
        match self {
            Command::Move { duration, .. } | Command::Animate { duration, .. } => {
                if !duration.is_finite() || *duration < 0.0 {
                    return Err(RovError::InvalidCommand(format!(
                        "{} duration must be a non-negative number of seconds, got {duration}",
                        self.kind()
                    )));
                }
                if *duration > MAX_COMMAND_DURATION_SECS {
                    return Err(RovError::InvalidCommand(format!(
                        "{} duration {duration} s exceeds the {MAX_COMMAND_DURATION_SECS} s limit",
                        self.kind()
                    )));
                }
                Ok(())
            }
            Command::Stop | Command::Speak { .. } => Ok(()),
        }
    }
}

/// A single best-effort sensor sample, timestamped at capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum TelemetrySample {
    /// Encoded camera frame.
    Frame {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        width: u32,
        height: u32,
        captured_at: DateTime<Utc>,
    },
    /// One ranging sweep: distances in millimetres, angles in degrees.
    RangeScan {
        distances: Vec<f32>,
        angles: Vec<f32>,
        captured_at: DateTime<Utc>,
    },
    /// Forward proximity reading in centimetres.
    Proximity {
        distance_cm: f32,
        captured_at: DateTime<Utc>,
    },
}

impl TelemetrySample {
    pub fn captured_at(&self) -> DateTime<Utc> {
        match self {
            TelemetrySample::Frame { captured_at, .. }
            | TelemetrySample::RangeScan { captured_at, .. }
            | TelemetrySample::Proximity { captured_at, .. } => *captured_at,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TelemetrySample::Frame { .. } => "frame",
            TelemetrySample::RangeScan { .. } => "range_scan",
            TelemetrySample::Proximity { .. } => "proximity",
        }
    }
}

/// Notice that the proximity interlock forced a stop.
///
/// `distance_cm` is `None` when the trip came from an unreadable sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAlert {
    pub distance_cm: Option<f32>,
    pub triggered_at: DateTime<Utc>,
}

impl SafetyAlert {
    pub fn new(distance_cm: Option<f32>) -> Self {
        Self {
            distance_cm,
            triggered_at: Utc::now(),
        }
    }
}

/// Messages sent from the actuator host to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ActuatorMessage {
    /// Handshake: the first frame of every connection.
    Ready { actuator_id: String },
    /// A motion ran to its deadline without being preempted.
    MovementComplete {
        direction: Direction,
        actual_duration: f64,
    },
    /// A stop transition finished (explicit, idempotent or safety-triggered).
    StopComplete,
    ObstacleAlert(SafetyAlert),
    Telemetry(TelemetrySample),
    /// A command failed validation and was not applied.
    CommandRejected { reason: String },
    /// A hardware fault the actuator could not absorb locally.
    HardwareFault { component: String, details: String },
}

impl ActuatorMessage {
    /// `true` for terminal acknowledgements, which travel on the reliable
    /// outbound lane instead of the lossy telemetry lane.
    pub fn is_acknowledgement(&self) -> bool {
        !matches!(
            self,
            ActuatorMessage::Ready { .. } | ActuatorMessage::Telemetry(_)
        )
    }
}

impl From<TelemetrySample> for ActuatorMessage {
    fn from(sample: TelemetrySample) -> Self {
        ActuatorMessage::Telemetry(sample)
    }
}

/// Event published upward by the controller, tagged with receipt time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub actuator_id: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(actuator_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            actuator_id: actuator_id.into(),
            payload,
        }
    }
}

/// Variants of data routed to upward consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Telemetry(TelemetrySample),
    MovementComplete {
        direction: Direction,
        actual_duration: f64,
    },
    StopComplete,
    ObstacleAlert(SafetyAlert),
    CommandRejected {
        reason: String,
    },
    HardwareFault {
        component: String,
        details: String,
    },
    /// The actuator's session went up (handshake) or down (link loss).
    SessionChanged {
        connected: bool,
    },
}

impl EventPayload {
    /// Map an inbound actuator message to its upward payload.
    ///
    /// Returns `None` for the `Ready` handshake, which the controller turns
    /// into a [`EventPayload::SessionChanged`] itself.
    pub fn from_actuator(msg: ActuatorMessage) -> Option<Self> {
        Some(match msg {
            ActuatorMessage::Ready { .. } => return None,
            ActuatorMessage::MovementComplete {
                direction,
                actual_duration,
            } => EventPayload::MovementComplete {
                direction,
                actual_duration,
            },
            ActuatorMessage::StopComplete => EventPayload::StopComplete,
            ActuatorMessage::ObstacleAlert(alert) => EventPayload::ObstacleAlert(alert),
            ActuatorMessage::Telemetry(sample) => EventPayload::Telemetry(sample),
            ActuatorMessage::CommandRejected { reason } => {
                EventPayload::CommandRejected { reason }
            }
            ActuatorMessage::HardwareFault { component, details } => {
                EventPayload::HardwareFault { component, details }
            }
        })
    }
}

/// Error type shared by both hosts.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RovError {
    #[error("Connection to '{0}' lost")]
    ConnectionLost(String),

    #[error("Actuator '{0}' is not connected")]
    NotConnected(String),

    #[error("Hardware init failed on {component}: {details}")]
    HardwareInit { component: String, details: String },

    #[error("Motor fault: {0}")]
    MotorFault(String),

    #[error("Hardware read failed on {component}: {details}")]
    HardwareRead { component: String, details: String },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Config error: {0}")]
    Config(String),
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
