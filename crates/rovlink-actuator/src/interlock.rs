//! Proximity safety interlock.
//!
//! [`SafetyInterlock`] is the pure decision logic: it smooths raw readings
//! with a moving average and decides, given the current [`MotionSnapshot`],
//! whether to raise a [`SafetyAlert`].  [`run_interlock`] is the periodic
//! task that owns the sensor, feeds the logic, forwards readings as
//! telemetry and submits alerts to the ingress loop.
//!
//! One alert is raised per excursion.  The latch clears when the smoothed
//! distance climbs back to the threshold or when a new motion starts, so a
//! fresh `Move` toward a known obstacle is still stopped.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use rovlink_channel::Outbound;
use rovlink_hal::{EchoWindow, ProximitySensor};
use rovlink_types::{RovError, SafetyAlert, TelemetrySample};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::motion::MotionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterlockConfig {
    pub threshold_cm: f32,
    /// Number of readings in the moving average.
    pub window: usize,
    pub period: Duration,
    pub echo: EchoWindow,
}

impl Default for InterlockConfig {
    fn default() -> Self {
        Self {
            threshold_cm: 30.0,
            window: 5,
            period: Duration::from_millis(100),
            echo: EchoWindow::default(),
        }
    }
}

pub struct SafetyInterlock {
    config: InterlockConfig,
    readings: VecDeque<f32>,
    /// `motion_id` of the motion the current excursion already stopped.
    tripped_on: Option<u64>,
}

impl SafetyInterlock {
    pub fn new(config: InterlockConfig) -> Self {
        Self {
            readings: VecDeque::with_capacity(config.window.max(1)),
            config,
            tripped_on: None,
        }
    }

    pub fn config(&self) -> &InterlockConfig {
        &self.config
    }

    /// Mean of the readings in the window, if any.
    pub fn smoothed(&self) -> Option<f32> {
        if self.readings.is_empty() {
            None
        } else {
            Some(self.readings.iter().sum::<f32>() / self.readings.len() as f32)
        }
    }

    /// Feed one reading (`Err` = unknown distance) and decide.
    pub fn observe(
        &mut self,
        reading: Result<f32, &RovError>,
        motion: MotionSnapshot,
    ) -> Option<SafetyAlert> {
        if self.tripped_on.is_some_and(|id| id != motion.motion_id) {
            self.tripped_on = None;
        }

        let distance = match reading {
            Ok(cm) => {
                if self.readings.len() == self.config.window.max(1) {
                    self.readings.pop_front();
                }
                self.readings.push_back(cm);
                let smoothed = self.smoothed()?;
                if smoothed >= self.config.threshold_cm {
                    self.tripped_on = None;
                    return None;
                }
                Some(smoothed)
            }
            // Unknown distance: fail safe, but only for a motion in flight.
            Err(_) => None,
        };

        if !motion.moving || self.tripped_on.is_some() {
            return None;
        }
        self.tripped_on = Some(motion.motion_id);
        Some(SafetyAlert::new(distance))
    }
}

/// Periodic interlock task.  Exits on shutdown or when the ingress loop is
/// gone.
pub async fn run_interlock(
    mut sensor: Box<dyn ProximitySensor>,
    mut interlock: SafetyInterlock,
    motion: watch::Receiver<MotionSnapshot>,
    alerts: mpsc::Sender<SafetyAlert>,
    outbound: Outbound,
    mut shutdown: watch::Receiver<bool>,
) {
    let config = *interlock.config();
    let mut ticker = tokio::time::interval(config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        sensor = sensor.id(),
        threshold_cm = config.threshold_cm,
        window = config.window,
        "safety interlock armed"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let reading = sensor
            .read_cm()
            .and_then(|raw| config.echo.check(sensor.id(), raw));
        match &reading {
            Ok(cm) => {
                outbound.send_telemetry(TelemetrySample::Proximity {
                    distance_cm: *cm,
                    captured_at: Utc::now(),
                });
            }
            Err(e) => debug!(sensor = sensor.id(), error = %e, "proximity read failed"),
        }

        let snapshot = *motion.borrow();
        if let Some(alert) = interlock.observe(reading.as_ref().copied(), snapshot) {
            warn!(distance_cm = ?alert.distance_cm, motion_id = snapshot.motion_id, "obstacle detected");
            if alerts.send(alert).await.is_err() {
                break;
            }
        }
    }

    debug!("safety interlock stopped");
}
