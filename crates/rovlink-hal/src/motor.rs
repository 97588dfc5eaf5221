//! Drive-base motor outputs.
//!
//! The base is a pair of DC motors behind an H-bridge with four logic lines.
//! A [`MotorDriver`] only ever receives a complete [`MotorOutputs`] value, so
//! switching from one direction to another is a single write with no
//! intermediate all-off state.

use rovlink_types::{Direction, RovError};

/// Logic levels of the four H-bridge lines (`true` = driven high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorOutputs {
    pub left_forward: bool,
    pub left_reverse: bool,
    pub right_forward: bool,
    pub right_reverse: bool,
}

impl MotorOutputs {
    /// Every line low: the motors are de-energised.
    pub const OFF: MotorOutputs = MotorOutputs {
        left_forward: false,
        left_reverse: false,
        right_forward: false,
        right_reverse: false,
    };

    /// Line pattern for driving in `direction`.
    ///
    /// Turning spins the wheels in opposite senses (pivot turn).
    pub fn for_direction(direction: Direction) -> Self {
        let (left_forward, left_reverse, right_forward, right_reverse) = match direction {
            Direction::Forward => (true, false, true, false),
            Direction::Backward => (false, true, false, true),
            Direction::Left => (false, true, true, false),
            Direction::Right => (true, false, false, true),
        };
        Self {
            left_forward,
            left_reverse,
            right_forward,
            right_reverse,
        }
    }

    /// `true` if any line is driven.
    pub fn is_energized(&self) -> bool {
        self.left_forward || self.left_reverse || self.right_forward || self.right_reverse
    }
}

/// The drive-base motor controller.
///
/// Exactly one owner (the command-ingress loop) holds the driver, so the trait
/// takes `&mut self` and needs no interior locking.
pub trait MotorDriver: Send {
    /// Stable identifier, e.g. `"drive_base"`.
    fn id(&self) -> &str;

    /// Drive the four lines to `outputs` in one write.
    ///
    /// # Errors
    ///
    /// Returns [`RovError::MotorFault`] if the write cannot be applied.
    fn apply(&mut self, outputs: MotorOutputs) -> Result<(), RovError>;

    /// The most recently applied line pattern.
    fn outputs(&self) -> MotorOutputs;

    /// Pull every line low.
    fn deactivate(&mut self) -> Result<(), RovError> {
        self.apply(MotorOutputs::OFF)
    }
}
