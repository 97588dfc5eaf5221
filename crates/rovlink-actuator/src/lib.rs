//! The actuator host: everything that runs next to the motors.
//!
//! * [`motion`] – the motor drive state machine, sole owner of the motor.
//! * [`interlock`] – proximity safety interlock that can stop any motion.
//! * [`producers`] – periodic camera / range-scan telemetry tasks.
//! * [`mailbox`] – single-slot latest-wins hand-off for audio and display.
//! * [`host`] – wires the above to the channel and owns their lifetimes.

pub mod host;
pub mod interlock;
pub mod mailbox;
pub mod motion;
pub mod producers;

pub use host::{ActuatorHost, HostConfig, ShutdownHandle};
pub use interlock::{InterlockConfig, SafetyInterlock};
pub use motion::{MotionSnapshot, MotionState, MotorDrive};
