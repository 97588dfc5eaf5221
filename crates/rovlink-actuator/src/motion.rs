//! [`MotorDrive`] – the motor drive state machine.
//!
//! The machine is the only owner of the [`MotorDriver`] and the only place
//! [`MotionState`] changes.  Every transition is a method that writes the
//! motor lines, updates the state, publishes a [`MotionSnapshot`] and returns
//! the terminal messages (if any) the caller must acknowledge with.
//!
//! | From   | Input        | To      | Emits |
//! |--------|--------------|---------|-------|
//! | any    | `start`      | Moving  | nothing |
//! | any    | `stop`       | Idle    | `StopComplete` |
//! | Moving | `expire`     | Idle    | `MovementComplete` |
//! | Moving | `safety_stop`| Idle    | `ObstacleAlert`, `StopComplete` |
//! | Idle   | `safety_stop`| Idle    | nothing |
//! | any    | `reset`      | Idle    | nothing |
//!
//! A failed output write latches a fault: the machine de-energises on a
//! best-effort basis and refuses every later `start` until the process is
//! restarted.  `stop` keeps working while faulted.

use std::time::Duration;

use rovlink_hal::{MotorDriver, MotorOutputs};
use rovlink_types::{ActuatorMessage, Direction, RovError, SafetyAlert};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default pause between the all-off writes of an emergency deactivation.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

const EMERGENCY_WRITES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Idle,
    Moving {
        direction: Direction,
        started_at: Instant,
        deadline: Instant,
    },
}

/// What the interlock is allowed to know about the drive.
///
/// `motion_id` increases on every `start`, so a changed id means a new
/// motion even if the robot never passed through `Idle`.  Zero means no
/// motion has ever been commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionSnapshot {
    pub moving: bool,
    pub motion_id: u64,
}

pub struct MotorDrive {
    motor: Box<dyn MotorDriver>,
    state: MotionState,
    motion_id: u64,
    fault: Option<RovError>,
    snapshot: watch::Sender<MotionSnapshot>,
    settle: Duration,
    /// Set by an emergency deactivation, cleared by the next `start`.
    safed: bool,
}

impl MotorDrive {
    pub fn new(motor: Box<dyn MotorDriver>) -> Self {
        let (snapshot, _) = watch::channel(MotionSnapshot::default());
        Self {
            motor,
            state: MotionState::Idle,
            motion_id: 0,
            fault: None,
            snapshot,
            settle: DEFAULT_SETTLE_DELAY,
            safed: false,
        }
    }

    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<MotionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Auto-stop deadline of the motion in flight.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            MotionState::Moving { deadline, .. } => Some(deadline),
            MotionState::Idle => None,
        }
    }

    pub fn fault(&self) -> Option<&RovError> {
        self.fault.as_ref()
    }

    /// Start (or replace) a motion.  A motion already in flight is
    /// superseded in a single write and never completes.
    ///
    /// # Errors
    ///
    /// Returns [`RovError::MotorFault`] if a fault is latched or the output
    /// write fails; in both cases the machine is `Idle` afterwards.  Returns
    /// [`RovError::InvalidCommand`] without touching the motor when the
    /// deadline cannot be represented.
    pub fn start(&mut self, direction: Direction, duration: Duration) -> Result<(), RovError> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }

        let now = Instant::now();
        let Some(deadline) = now.checked_add(duration) else {
            return Err(RovError::InvalidCommand(format!(
                "move duration {duration:?} is out of range"
            )));
        };

        if let Err(e) = self.motor.apply(MotorOutputs::for_direction(direction)) {
            warn!(motor = self.motor.id(), error = %e, "motor write failed; latching fault");
            if let Err(off) = self.motor.deactivate() {
                warn!(motor = self.motor.id(), error = %off, "deactivation after failed write also failed");
            }
            self.fault = Some(e.clone());
            self.enter_idle();
            return Err(e);
        }

        if let MotionState::Moving { direction: prev, .. } = self.state {
            debug!(from = %prev, to = %direction, "motion superseded");
        }

        self.motion_id += 1;
        self.safed = false;
        self.state = MotionState::Moving {
            direction,
            started_at: now,
            deadline,
        };
        self.publish();
        info!(direction = %direction, duration_secs = duration.as_secs_f64(), motion_id = self.motion_id, "motion started");
        Ok(())
    }

    /// Explicit stop.  Always writes all-off, even when already `Idle`.
    pub fn stop(&mut self) -> Vec<ActuatorMessage> {
        let mut out = Vec::with_capacity(2);
        if let Some(fault) = self.deactivate() {
            out.push(fault);
        }
        self.enter_idle();
        out.push(ActuatorMessage::StopComplete);
        out
    }

    /// Complete the motion in flight if its deadline has passed.
    pub fn expire(&mut self) -> Vec<ActuatorMessage> {
        let MotionState::Moving {
            direction,
            started_at,
            deadline,
        } = self.state
        else {
            return Vec::new();
        };
        let now = Instant::now();
        if now < deadline {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(2);
        if let Some(fault) = self.deactivate() {
            out.push(fault);
        }
        self.enter_idle();
        let actual_duration = now.duration_since(started_at).as_secs_f64();
        info!(direction = %direction, actual_duration, "motion complete");
        out.push(ActuatorMessage::MovementComplete {
            direction,
            actual_duration,
        });
        out
    }

    /// Interlock-triggered stop.  An alert that arrives while `Idle` is
    /// stale and discarded without touching the hardware.
    pub fn safety_stop(&mut self, alert: SafetyAlert) -> Vec<ActuatorMessage> {
        if self.state == MotionState::Idle {
            debug!("stale safety alert discarded");
            return Vec::new();
        }
        warn!(distance_cm = ?alert.distance_cm, "safety interlock stopped the drive");
        let mut out = vec![ActuatorMessage::ObstacleAlert(alert)];
        out.extend(self.stop());
        out
    }

    /// Silent return to `Idle` (link lost or re-established).
    pub fn reset(&mut self) {
        if let Some(ActuatorMessage::HardwareFault { details, .. }) = self.deactivate() {
            warn!(details = %details, "deactivation failed during reset");
        }
        self.enter_idle();
    }

    /// Three all-off writes separated by the settle delay, errors ignored.
    ///
    /// Blocks the calling thread between writes; async callers use
    /// [`emergency_stop_async`](Self::emergency_stop_async) and this is left
    /// to `Drop`.  Skipped when nothing has moved since the last one.
    pub fn emergency_stop(&mut self) {
        if self.safed {
            return;
        }
        for i in 0..EMERGENCY_WRITES {
            if i > 0 {
                std::thread::sleep(self.settle);
            }
            self.emergency_write();
        }
        self.finish_emergency_stop();
    }

    /// [`emergency_stop`](Self::emergency_stop) with the settle delay on the
    /// tokio clock.
    pub async fn emergency_stop_async(&mut self) {
        if self.safed {
            return;
        }
        for i in 0..EMERGENCY_WRITES {
            if i > 0 {
                tokio::time::sleep(self.settle).await;
            }
            self.emergency_write();
        }
        self.finish_emergency_stop();
    }

    fn emergency_write(&mut self) {
        if let Err(e) = self.motor.deactivate() {
            warn!(motor = self.motor.id(), error = %e, "emergency deactivation write failed");
        }
    }

    fn finish_emergency_stop(&mut self) {
        self.safed = true;
        self.enter_idle();
        info!(motor = self.motor.id(), "motors deactivated");
    }

    fn deactivate(&mut self) -> Option<ActuatorMessage> {
        match self.motor.deactivate() {
            Ok(()) => None,
            Err(e) => {
                warn!(motor = self.motor.id(), error = %e, "motor deactivation failed");
                if self.fault.is_none() {
                    self.fault = Some(e.clone());
                }
                Some(ActuatorMessage::HardwareFault {
                    component: self.motor.id().to_string(),
                    details: e.to_string(),
                })
            }
        }
    }

    fn enter_idle(&mut self) {
        self.state = MotionState::Idle;
        self.publish();
    }

    fn publish(&self) {
        self.snapshot.send_replace(MotionSnapshot {
            moving: matches!(self.state, MotionState::Moving { .. }),
            motion_id: self.motion_id,
        });
    }
}

impl Drop for MotorDrive {
    fn drop(&mut self) {
        self.emergency_stop();
    }
}
