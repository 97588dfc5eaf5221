//! `rovlink-hal` – hardware abstraction for the actuator host.
//!
//! Every piece of hardware the actuator host touches sits behind a small
//! trait so the runtime never depends on a concrete driver:
//!
//! - [`motor`] – [`MotorDriver`]: the H-bridge outputs of the drive base.
//! - [`camera`] – [`Camera`]: frame capture.
//! - [`ranging`] – [`RangeSensor`]: 360° ranging sweeps.
//! - [`proximity`] – [`ProximitySensor`]: the forward proximity reading that
//!   feeds the safety interlock.
//! - [`sinks`] – [`AudioSink`] and [`DisplaySink`]: speaker and face display.
//! - [`hardware`] – [`HardwareSet`]: the owned bundle of handles built once at
//!   startup.
//! - [`sim`] – in-process simulated drivers for CI and bench runs.

pub mod camera;
pub mod hardware;
pub mod motor;
pub mod proximity;
pub mod ranging;
pub mod sim;
pub mod sinks;

pub use camera::{Camera, CameraFrame};
pub use hardware::HardwareSet;
pub use motor::{MotorDriver, MotorOutputs};
pub use proximity::{EchoWindow, ProximitySensor};
pub use ranging::{RangeSensor, ScanPoint, ScanWindow};
pub use sinks::{AudioSink, DisplaySink};
