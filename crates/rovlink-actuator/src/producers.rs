//! Periodic telemetry producers.
//!
//! Each producer owns one sensor, wakes on its own interval (missed ticks are
//! skipped rather than bunched), and offers the sample to the lossy
//! telemetry lane.  Nothing here ever waits on the network.

use std::time::Duration;

use chrono::Utc;
use rovlink_channel::Outbound;
use rovlink_hal::{Camera, RangeSensor, ScanWindow};
use rovlink_types::{RovError, TelemetrySample};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Default camera period, about 30 frames per second.
pub const DEFAULT_FRAME_PERIOD: Duration = Duration::from_millis(33);
pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_millis(200);

/// A sensor that yields one telemetry sample per call.
pub trait SampleSource: Send {
    fn name(&self) -> &str;

    fn sample(&mut self) -> Result<TelemetrySample, RovError>;
}

pub struct CameraSource {
    camera: Box<dyn Camera>,
}

impl CameraSource {
    pub fn new(camera: Box<dyn Camera>) -> Self {
        Self { camera }
    }
}

impl SampleSource for CameraSource {
    fn name(&self) -> &str {
        self.camera.id()
    }

    fn sample(&mut self) -> Result<TelemetrySample, RovError> {
        let frame = self.camera.capture()?;
        Ok(TelemetrySample::Frame {
            data: frame.data,
            width: frame.width,
            height: frame.height,
            captured_at: Utc::now(),
        })
    }
}

pub struct RangeScanSource {
    sensor: Box<dyn RangeSensor>,
    window: ScanWindow,
}

impl RangeScanSource {
    pub fn new(sensor: Box<dyn RangeSensor>, window: ScanWindow) -> Self {
        Self { sensor, window }
    }
}

impl SampleSource for RangeScanSource {
    fn name(&self) -> &str {
        self.sensor.id()
    }

    fn sample(&mut self) -> Result<TelemetrySample, RovError> {
        let points = self.sensor.scan()?;
        let (distances, angles) = self.window.filter(&points);
        Ok(TelemetrySample::RangeScan {
            distances,
            angles,
            captured_at: Utc::now(),
        })
    }
}

/// Run `source` every `period` until shutdown.
pub async fn run_producer(
    mut source: Box<dyn SampleSource>,
    period: Duration,
    outbound: Outbound,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(source = source.name(), period_ms = period.as_millis() as u64, "telemetry producer started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        match source.sample() {
            Ok(sample) => {
                outbound.send_telemetry(sample);
            }
            Err(e) => debug!(source = source.name(), error = %e, "sample read failed"),
        }
    }

    debug!(source = source.name(), dropped_total = outbound.dropped(), "telemetry producer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rovlink_hal::sim::{SimCamera, SimRangeSensor};
    use rovlink_types::ActuatorMessage;

    struct Flaky {
        calls: u32,
    }

    impl SampleSource for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn sample(&mut self) -> Result<TelemetrySample, RovError> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err(RovError::HardwareRead {
                    component: "flaky".into(),
                    details: "glitch".into(),
                });
            }
            Ok(TelemetrySample::Proximity {
                distance_cm: self.calls as f32,
                captured_at: Utc::now(),
            })
        }
    }

    #[test]
    fn camera_source_builds_timestamped_frames() {
        let mut source = CameraSource::new(SimCamera::new("front_rgb"));
        assert_eq!(source.name(), "front_rgb");

        let before = Utc::now();
        let TelemetrySample::Frame {
            data,
            width,
            height,
            captured_at,
        } = source.sample().unwrap()
        else {
            panic!("expected a frame");
        };
        assert_eq!((width, height), (4, 4));
        assert!(!data.is_empty());
        assert!(captured_at >= before && captured_at <= Utc::now());
    }

    #[test]
    fn range_source_applies_window() {
        let mut source = RangeScanSource::new(
            SimRangeSensor::new("lidar", 20_000.0),
            ScanWindow::default(),
        );
        let TelemetrySample::RangeScan { distances, .. } = source.sample().unwrap() else {
            panic!("expected a range scan");
        };
        assert!(distances.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn producer_survives_read_errors() {
        let (outbound, mut rx) = Outbound::channel(16);
        rx.set_connected(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_producer(
            Box::new(Flaky { calls: 0 }),
            Duration::from_millis(100),
            outbound,
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(450)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        // Ticks at 0, 100, 200, 300, 400: calls 1, 3, 5 succeed.
        let mut received = Vec::new();
        while let Some(ActuatorMessage::Telemetry(sample)) = rx.next().await {
            received.push(sample);
        }
        assert_eq!(received.len(), 3);
    }
}
