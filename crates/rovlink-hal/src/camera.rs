//! Forward camera feeding the frame producer.

use rovlink_types::RovError;

/// One captured frame, still encoded.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// JPEG bytes on the real camera, raw pixels from the simulator.
    pub data: Vec<u8>,
}

pub trait Camera: Send {
    fn id(&self) -> &str;

    /// Grab the latest frame.
    ///
    /// # Errors
    ///
    /// [`RovError::HardwareRead`] when no frame is available; the producer
    /// logs it and tries again on its next tick.
    fn capture(&mut self) -> Result<CameraFrame, RovError>;
}
