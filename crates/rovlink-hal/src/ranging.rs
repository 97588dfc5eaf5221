//! 360° ranging sensor (spinning LiDAR).

use rovlink_types::RovError;

/// One measurement of a sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanPoint {
    /// Driver-reported signal quality (0–255).
    pub quality: u8,
    /// Bearing in degrees, 0–360.
    pub angle_deg: f32,
    /// Range in millimetres.
    pub distance_mm: f32,
}

/// A ranging device that returns one full rotation per call.
pub trait RangeSensor: Send {
    fn id(&self) -> &str;

    /// Return the points of the next complete sweep.
    ///
    /// # Errors
    ///
    /// Returns [`RovError::HardwareRead`] when no sweep could be read.
    fn scan(&mut self) -> Result<Vec<ScanPoint>, RovError>;
}

/// Accepted distance window; readings outside it are discarded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanWindow {
    pub min_mm: f32,
    pub max_mm: f32,
}

impl Default for ScanWindow {
    fn default() -> Self {
        Self {
            min_mm: 150.0,
            max_mm: 12_000.0,
        }
    }
}

impl ScanWindow {
    /// Build a window from metre bounds as written in configuration.
    pub fn from_metres(min_m: f32, max_m: f32) -> Self {
        Self {
            min_mm: min_m * 1000.0,
            max_mm: max_m * 1000.0,
        }
    }

    /// Split the in-window points of `points` into parallel
    /// `(distances_mm, angles_deg)` vectors.
    pub fn filter(&self, points: &[ScanPoint]) -> (Vec<f32>, Vec<f32>) {
        points
            .iter()
            .filter(|p| (self.min_mm..=self.max_mm).contains(&p.distance_mm))
            .map(|p| (p.distance_mm, p.angle_deg))
            .unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(angle_deg: f32, distance_mm: f32) -> ScanPoint {
        ScanPoint {
            quality: 15,
            angle_deg,
            distance_mm,
        }
    }

    #[test]
    fn filter_drops_out_of_window_points() {
        let window = ScanWindow::default();
        let points = [
            point(0.0, 100.0),    // too close
            point(90.0, 1500.0),  // ok
            point(180.0, 12_000.0), // boundary, kept
            point(270.0, 20_000.0), // too far
        ];
        let (distances, angles) = window.filter(&points);
        assert_eq!(distances, vec![1500.0, 12_000.0]);
        assert_eq!(angles, vec![90.0, 180.0]);
    }

    #[test]
    fn from_metres_converts_to_millimetres() {
        let w = ScanWindow::from_metres(0.2, 6.0);
        assert!((w.min_mm - 200.0).abs() < f32::EPSILON);
        assert!((w.max_mm - 6000.0).abs() < f32::EPSILON);
    }
}
