//! Forward proximity sensor (ultrasonic echo ranger).

use rovlink_types::RovError;

/// A single-beam distance sensor.
pub trait ProximitySensor: Send {
    fn id(&self) -> &str;

    /// Raw distance to the nearest object in centimetres.
    ///
    /// # Errors
    ///
    /// Returns [`RovError::HardwareRead`] when the echo times out or the
    /// device does not answer.
    fn read_cm(&mut self) -> Result<f32, RovError>;
}

/// Range within which an echo is physically meaningful.
///
/// Echo rangers report garbage below their blanking distance and beyond their
/// maximum range; such values are treated as failed reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoWindow {
    pub min_cm: f32,
    pub max_cm: f32,
}

impl Default for EchoWindow {
    fn default() -> Self {
        Self {
            min_cm: 2.0,
            max_cm: 400.0,
        }
    }
}

impl EchoWindow {
    /// Accept `raw` if it lies inside the window.
    ///
    /// # Errors
    ///
    /// Returns [`RovError::HardwareRead`] for out-of-window or non-finite
    /// values.
    pub fn check(&self, component: &str, raw: f32) -> Result<f32, RovError> {
        if raw.is_finite() && (self.min_cm..=self.max_cm).contains(&raw) {
            Ok(raw)
        } else {
            Err(RovError::HardwareRead {
                component: component.to_string(),
                details: format!("out of range measurement: {raw} cm"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_accepts_boundaries() {
        let w = EchoWindow::default();
        assert_eq!(w.check("us", 2.0).unwrap(), 2.0);
        assert_eq!(w.check("us", 400.0).unwrap(), 400.0);
    }

    #[test]
    fn window_rejects_outliers() {
        let w = EchoWindow::default();
        assert!(w.check("us", 1.5).is_err());
        assert!(w.check("us", 401.0).is_err());
        assert!(matches!(
            w.check("us", f32::NAN),
            Err(RovError::HardwareRead { .. })
        ));
    }
}
