//! [`HardwareSet`] – every hardware handle the actuator host owns.
//!
//! The set is constructed once at startup and then taken apart by the host
//! runtime, each handle moving into the single task that uses it.  Sensors
//! are stored as the *result* of their initialisation: a sensor that failed
//! to come up is carried as its [`RovError`] so the runtime can report it and
//! run degraded, while the motor and the output sinks are mandatory.

use rovlink_types::RovError;

use crate::camera::Camera;
use crate::motor::MotorDriver;
use crate::proximity::ProximitySensor;
use crate::ranging::RangeSensor;
use crate::sinks::{AudioSink, DisplaySink};

pub struct HardwareSet {
    pub motor: Box<dyn MotorDriver>,
    pub camera: Result<Box<dyn Camera>, RovError>,
    pub ranging: Result<Box<dyn RangeSensor>, RovError>,
    pub proximity: Result<Box<dyn ProximitySensor>, RovError>,
    pub audio: Box<dyn AudioSink>,
    pub display: Box<dyn DisplaySink>,
}

impl HardwareSet {
    /// Start a set from the mandatory handles.  Every sensor starts out as
    /// "not fitted" until one of the `with_*` methods supplies it.
    pub fn new(
        motor: Box<dyn MotorDriver>,
        audio: Box<dyn AudioSink>,
        display: Box<dyn DisplaySink>,
    ) -> Self {
        Self {
            motor,
            camera: Err(not_fitted("camera")),
            ranging: Err(not_fitted("ranging")),
            proximity: Err(not_fitted("proximity")),
            audio,
            display,
        }
    }

    pub fn with_camera(mut self, camera: Result<Box<dyn Camera>, RovError>) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_ranging(mut self, ranging: Result<Box<dyn RangeSensor>, RovError>) -> Self {
        self.ranging = ranging;
        self
    }

    pub fn with_proximity(
        mut self,
        proximity: Result<Box<dyn ProximitySensor>, RovError>,
    ) -> Self {
        self.proximity = proximity;
        self
    }
}

fn not_fitted(component: &str) -> RovError {
    RovError::HardwareInit {
        component: component.to_string(),
        details: "not fitted".to_string(),
    }
}
