//! In-process simulated hardware for CI and bench runs.
//!
//! [`SimHardware`] builds a [`HardwareSet`] out of stub drivers and hands back
//! a [`SimProbes`] bundle of shared handles so tests can watch the motor
//! lines, script the proximity sensor, and inspect what reached the speaker
//! and the display, all without any physical hardware.
//!
//! # Example
//!
//! ```rust
//! use rovlink_hal::sim::SimHardware;
//!
//! let (hardware, probes) = SimHardware::new()
//!     .with_camera()
//!     .with_proximity(120.0)
//!     .build();
//!
//! assert!(hardware.camera.is_ok());
//! assert!(hardware.ranging.is_err()); // not fitted
//! assert!(!probes.motor.current().is_energized());
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rovlink_types::{Keyframe, RovError};

use crate::camera::{Camera, CameraFrame};
use crate::hardware::HardwareSet;
use crate::motor::{MotorDriver, MotorOutputs};
use crate::proximity::ProximitySensor;
use crate::ranging::{RangeSensor, ScanPoint};
use crate::sinks::{AudioSink, DisplaySink};

// ────────────────────────────────────────────────────────────────────────────
// Motor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MotorLog {
    writes: Vec<MotorOutputs>,
    faulty: bool,
}

/// Shared view of a [`SimMotor`]'s write history.
#[derive(Clone, Default)]
pub struct MotorProbe {
    inner: Arc<Mutex<MotorLog>>,
}

impl MotorProbe {
    /// Every successful write, oldest first.
    pub fn writes(&self) -> Vec<MotorOutputs> {
        self.inner.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().writes.len()
    }

    /// The line pattern currently on the hardware.
    pub fn current(&self) -> MotorOutputs {
        self.inner
            .lock()
            .writes
            .last()
            .copied()
            .unwrap_or(MotorOutputs::OFF)
    }

    /// While faulty, every write that would energise a line fails.  All-off
    /// writes still succeed, like a driver that trips on over-current.
    pub fn set_faulty(&self, faulty: bool) {
        self.inner.lock().faulty = faulty;
    }
}

/// A simulated H-bridge that records every write.
pub struct SimMotor {
    id: String,
    probe: MotorProbe,
}

impl SimMotor {
    pub fn new(id: impl Into<String>, probe: MotorProbe) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            probe,
        })
    }
}

impl MotorDriver for SimMotor {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, outputs: MotorOutputs) -> Result<(), RovError> {
        let mut log = self.probe.inner.lock();
        if log.faulty && outputs.is_energized() {
            return Err(RovError::MotorFault(format!(
                "{}: simulated driver fault",
                self.id
            )));
        }
        log.writes.push(outputs);
        Ok(())
    }

    fn outputs(&self) -> MotorOutputs {
        self.probe.current()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Proximity
// ────────────────────────────────────────────────────────────────────────────

/// Script handle for a [`SimProximity`] sensor.  `None` makes reads fail.
#[derive(Clone)]
pub struct ProximityFeed {
    distance_cm: Arc<Mutex<Option<f32>>>,
}

impl ProximityFeed {
    pub fn new(initial_cm: f32) -> Self {
        Self {
            distance_cm: Arc::new(Mutex::new(Some(initial_cm))),
        }
    }

    pub fn set_distance(&self, cm: f32) {
        *self.distance_cm.lock() = Some(cm);
    }

    /// Make every subsequent read fail until the next `set_distance`.
    pub fn fail(&self) {
        *self.distance_cm.lock() = None;
    }
}

pub struct SimProximity {
    id: String,
    feed: ProximityFeed,
}

impl SimProximity {
    pub fn new(id: impl Into<String>, feed: ProximityFeed) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            feed,
        })
    }
}

impl ProximitySensor for SimProximity {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_cm(&mut self) -> Result<f32, RovError> {
        (*self.feed.distance_cm.lock()).ok_or_else(|| RovError::HardwareRead {
            component: self.id.clone(),
            details: "echo timeout".to_string(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Camera & ranging
// ────────────────────────────────────────────────────────────────────────────

/// Returns a tiny fixed JPEG-framed payload.
pub struct SimCamera {
    id: String,
}

impl SimCamera {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self { id: id.into() })
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, RovError> {
        Ok(CameraFrame {
            width: 4,
            height: 4,
            data: vec![0xff, 0xd8, 0x00, 0x00, 0xff, 0xd9],
        })
    }
}

/// Reports a circular room: one point per degree at a fixed range.
pub struct SimRangeSensor {
    id: String,
    range_mm: f32,
}

impl SimRangeSensor {
    pub fn new(id: impl Into<String>, range_mm: f32) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            range_mm,
        })
    }
}

impl RangeSensor for SimRangeSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn scan(&mut self) -> Result<Vec<ScanPoint>, RovError> {
        Ok((0..360)
            .map(|deg| ScanPoint {
                quality: 15,
                angle_deg: deg as f32,
                distance_mm: self.range_mm,
            })
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sinks
// ────────────────────────────────────────────────────────────────────────────

/// Clips handed to a [`SimAudio`], in playback order.
#[derive(Clone, Default)]
pub struct AudioProbe {
    played: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl AudioProbe {
    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.lock().clone()
    }
}

/// Speaker stub: records the clip, then "plays" it for a fixed time.
pub struct SimAudio {
    probe: AudioProbe,
    clip_duration: Duration,
}

impl SimAudio {
    pub fn new(probe: AudioProbe, clip_duration: Duration) -> Box<Self> {
        Box::new(Self {
            probe,
            clip_duration,
        })
    }
}

#[async_trait]
impl AudioSink for SimAudio {
    async fn play(&mut self, audio: &[u8]) -> Result<(), RovError> {
        self.probe.played.lock().push(audio.to_vec());
        tokio::time::sleep(self.clip_duration).await;
        Ok(())
    }
}

/// Animations handed to a [`SimDisplay`]: `(keyframe count, duration)`.
#[derive(Clone, Default)]
pub struct DisplayProbe {
    rendered: Arc<Mutex<Vec<(usize, Duration)>>>,
}

impl DisplayProbe {
    pub fn rendered(&self) -> Vec<(usize, Duration)> {
        self.rendered.lock().clone()
    }
}

pub struct SimDisplay {
    probe: DisplayProbe,
}

impl SimDisplay {
    pub fn new(probe: DisplayProbe) -> Box<Self> {
        Box::new(Self { probe })
    }
}

#[async_trait]
impl DisplaySink for SimDisplay {
    async fn render(
        &mut self,
        keyframes: &[Keyframe],
        duration: Duration,
    ) -> Result<(), RovError> {
        self.probe.rendered.lock().push((keyframes.len(), duration));
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimHardware builder
// ────────────────────────────────────────────────────────────────────────────

/// Shared handles into the simulated drivers of a built [`HardwareSet`].
#[derive(Clone)]
pub struct SimProbes {
    pub motor: MotorProbe,
    pub proximity: ProximityFeed,
    pub audio: AudioProbe,
    pub display: DisplayProbe,
}

/// Builder for a [`HardwareSet`] made of simulated drivers.
pub struct SimHardware {
    camera: bool,
    ranging: bool,
    proximity_cm: Option<f32>,
    failing: Vec<&'static str>,
    clip_duration: Duration,
}

impl Default for SimHardware {
    fn default() -> Self {
        Self {
            camera: false,
            ranging: false,
            proximity_cm: None,
            failing: Vec::new(),
            clip_duration: Duration::from_secs(1),
        }
    }
}

impl SimHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sensor fitted, proximity reading a clear 200 cm.
    pub fn full() -> Self {
        Self::new()
            .with_camera()
            .with_ranging()
            .with_proximity(200.0)
    }

    pub fn with_camera(mut self) -> Self {
        self.camera = true;
        self
    }

    pub fn with_ranging(mut self) -> Self {
        self.ranging = true;
        self
    }

    pub fn with_proximity(mut self, initial_cm: f32) -> Self {
        self.proximity_cm = Some(initial_cm);
        self
    }

    /// Make `component` (`"camera"`, `"ranging"` or `"proximity"`) fail its
    /// initialisation.
    pub fn with_init_failure(mut self, component: &'static str) -> Self {
        self.failing.push(component);
        self
    }

    /// How long each simulated speaker clip takes to play.
    pub fn with_clip_duration(mut self, clip_duration: Duration) -> Self {
        self.clip_duration = clip_duration;
        self
    }

    pub fn build(self) -> (HardwareSet, SimProbes) {
        let probes = SimProbes {
            motor: MotorProbe::default(),
            proximity: ProximityFeed::new(self.proximity_cm.unwrap_or(200.0)),
            audio: AudioProbe::default(),
            display: DisplayProbe::default(),
        };

        let mut hardware = HardwareSet::new(
            SimMotor::new("drive_base", probes.motor.clone()),
            SimAudio::new(probes.audio.clone(), self.clip_duration),
            SimDisplay::new(probes.display.clone()),
        );

        if self.camera {
            hardware = hardware.with_camera(
                self.init("camera")
                    .map(|()| SimCamera::new("front_rgb") as Box<dyn Camera>),
            );
        }
        if self.ranging {
            hardware = hardware.with_ranging(
                self.init("ranging")
                    .map(|()| SimRangeSensor::new("lidar", 2000.0) as Box<dyn RangeSensor>),
            );
        }
        if self.proximity_cm.is_some() {
            hardware = hardware.with_proximity(self.init("proximity").map(|()| {
                SimProximity::new("ultrasonic", probes.proximity.clone())
                    as Box<dyn ProximitySensor>
            }));
        }

        (hardware, probes)
    }

    fn init(&self, component: &'static str) -> Result<(), RovError> {
        if self.failing.contains(&component) {
            Err(RovError::HardwareInit {
                component: component.to_string(),
                details: "simulated init failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rovlink_types::Direction;

    #[test]
    fn sim_motor_records_writes() {
        let probe = MotorProbe::default();
        let mut motor = SimMotor::new("drive_base", probe.clone());
        motor
            .apply(MotorOutputs::for_direction(Direction::Forward))
            .unwrap();
        motor.deactivate().unwrap();
        assert_eq!(probe.write_count(), 2);
        assert_eq!(probe.current(), MotorOutputs::OFF);
    }

    #[test]
    fn faulty_motor_refuses_to_energise_but_can_stop() {
        let probe = MotorProbe::default();
        let mut motor = SimMotor::new("drive_base", probe.clone());
        probe.set_faulty(true);
        let result = motor.apply(MotorOutputs::for_direction(Direction::Left));
        assert!(matches!(result, Err(RovError::MotorFault(_))));
        motor.deactivate().unwrap();
        assert_eq!(probe.writes(), vec![MotorOutputs::OFF]);
    }

    #[test]
    fn proximity_feed_scripts_reads() {
        let feed = ProximityFeed::new(80.0);
        let mut sensor = SimProximity::new("ultrasonic", feed.clone());
        assert_eq!(sensor.read_cm().unwrap(), 80.0);
        feed.set_distance(12.5);
        assert_eq!(sensor.read_cm().unwrap(), 12.5);
        feed.fail();
        assert!(matches!(
            sensor.read_cm(),
            Err(RovError::HardwareRead { .. })
        ));
    }

    #[test]
    fn builder_reports_init_failures() {
        let (hardware, _probes) = SimHardware::full()
            .with_init_failure("camera")
            .build();
        assert!(matches!(
            hardware.camera,
            Err(RovError::HardwareInit { ref component, .. }) if component == "camera"
        ));
        assert!(hardware.ranging.is_ok());
        assert!(hardware.proximity.is_ok());
    }

    #[test]
    fn sim_range_sensor_sweeps_full_circle() {
        let mut lidar = SimRangeSensor::new("lidar", 1500.0);
        let points = lidar.scan().unwrap();
        assert_eq!(points.len(), 360);
        assert!(points.iter().all(|p| p.distance_mm == 1500.0));
    }

    #[tokio::test(start_paused = true)]
    async fn sim_audio_records_and_takes_clip_time() {
        let probe = AudioProbe::default();
        let mut audio = SimAudio::new(probe.clone(), Duration::from_millis(500));
        let start = tokio::time::Instant::now();
        audio.play(b"hello").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert_eq!(probe.played(), vec![b"hello".to_vec()]);
    }
}
