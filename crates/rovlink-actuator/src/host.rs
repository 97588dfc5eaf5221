//! [`ActuatorHost`] – the actuator-side runtime.
//!
//! The host takes ownership of a [`HardwareSet`] and splits it across
//! independently scheduled tasks:
//!
//! | Task | Owns | Talks to |
//! |---|---|---|
//! | ingress loop | the motor (via [`MotorDrive`]) | inbound queue, alert queue, acks lane, mailboxes |
//! | interlock | proximity sensor | motion snapshot, alert queue, telemetry lane |
//! | frame / scan producers | camera / ranging sensor | telemetry lane |
//! | audio / display handlers | speaker / face display | their mailbox, acks lane |
//! | link | the WebSocket | inbound queue, outbound lanes |
//!
//! The ingress loop is the only writer of the motion state.  Safety alerts
//! are served before commands, so a trip is never stuck behind a backlog.

use std::sync::Arc;
use std::time::Duration;

use rovlink_channel::link::DEFAULT_RECONNECT_DELAY;
use rovlink_channel::outbound::DEFAULT_TELEMETRY_CAPACITY;
use rovlink_channel::{ActuatorLink, Inbound, LinkConfig, Outbound};
use rovlink_hal::{AudioSink, DisplaySink, HardwareSet, ScanWindow};
use rovlink_types::{ActuatorMessage, Command, Keyframe, RovError, SafetyAlert};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::interlock::{InterlockConfig, SafetyInterlock, run_interlock};
use crate::mailbox::{MailboxReceiver, MailboxSender, mailbox};
use crate::motion::{MotionSnapshot, MotorDrive};
use crate::producers::{
    CameraSource, DEFAULT_FRAME_PERIOD, DEFAULT_SCAN_PERIOD, RangeScanSource, run_producer,
};

const INBOUND_CAPACITY: usize = 64;
const ALERT_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub actuator_id: String,
    pub controller_url: String,
    pub reconnect_delay: Duration,
    pub interlock: InterlockConfig,
    pub frame_period: Duration,
    pub scan_period: Duration,
    pub scan_window: ScanWindow,
    pub telemetry_capacity: usize,
    /// Upper bound on how long `shutdown` waits for tasks to wind down.
    pub shutdown_grace: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            actuator_id: "rover-01".to_string(),
            controller_url: "ws://127.0.0.1:5000".to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            interlock: InterlockConfig::default(),
            frame_period: DEFAULT_FRAME_PERIOD,
            scan_period: DEFAULT_SCAN_PERIOD,
            scan_window: ScanWindow::default(),
            telemetry_capacity: DEFAULT_TELEMETRY_CAPACITY,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Cloneable trigger for host shutdown.  `trigger` is synchronous so it can
/// be called from a signal handler or a panic hook.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        if !self.tx.send_replace(true) {
            info!("shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// An animation waiting for the display task.
#[derive(Debug, Clone, PartialEq)]
struct Animation {
    keyframes: Vec<Keyframe>,
    duration: Duration,
}

pub struct ActuatorHost {
    shutdown: ShutdownHandle,
    ingress: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
    outbound: Outbound,
    motion: watch::Receiver<MotionSnapshot>,
    grace: Duration,
}

impl ActuatorHost {
    /// Start the host and its WebSocket link to `config.controller_url`.
    pub fn start(config: HostConfig, hardware: HardwareSet) -> Self {
        let (outbound, receivers) = Outbound::channel(config.telemetry_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let shutdown = ShutdownHandle::new();

        let link = ActuatorLink::new(
            LinkConfig {
                url: config.controller_url.clone(),
                actuator_id: config.actuator_id.clone(),
                reconnect_delay: config.reconnect_delay,
            },
            receivers,
            inbound_tx,
            shutdown.subscribe(),
        );

        let mut host = Self::spawn_with(config, hardware, inbound_rx, outbound, shutdown);
        host.tasks.push(tokio::spawn(link.run()));
        host
    }

    /// Start the host against an already wired inbound queue and outbound
    /// lanes, without a network link.
    pub fn spawn(
        config: HostConfig,
        hardware: HardwareSet,
        inbound: mpsc::Receiver<Inbound>,
        outbound: Outbound,
    ) -> Self {
        Self::spawn_with(config, hardware, inbound, outbound, ShutdownHandle::new())
    }

    fn spawn_with(
        config: HostConfig,
        hardware: HardwareSet,
        inbound: mpsc::Receiver<Inbound>,
        outbound: Outbound,
        shutdown: ShutdownHandle,
    ) -> Self {
        let HardwareSet {
            motor,
            camera,
            ranging,
            proximity,
            audio,
            display,
        } = hardware;

        let drive = MotorDrive::new(motor);
        let motion = drive.subscribe();
        let (alert_tx, alert_rx) = mpsc::channel(ALERT_CAPACITY);
        let (audio_tx, audio_rx) = mailbox();
        let (display_tx, display_rx) = mailbox();
        let mut tasks = Vec::new();

        match proximity {
            Ok(sensor) => tasks.push(tokio::spawn(run_interlock(
                sensor,
                SafetyInterlock::new(config.interlock),
                drive.subscribe(),
                alert_tx,
                outbound.clone(),
                shutdown.subscribe(),
            ))),
            Err(e) => warn!(error = %e, "proximity sensor unavailable; safety interlock disabled"),
        }

        match camera {
            Ok(camera) => tasks.push(tokio::spawn(run_producer(
                Box::new(CameraSource::new(camera)),
                config.frame_period,
                outbound.clone(),
                shutdown.subscribe(),
            ))),
            Err(e) => warn!(error = %e, "camera unavailable; frame producer skipped"),
        }

        match ranging {
            Ok(sensor) => tasks.push(tokio::spawn(run_producer(
                Box::new(RangeScanSource::new(sensor, config.scan_window)),
                config.scan_period,
                outbound.clone(),
                shutdown.subscribe(),
            ))),
            Err(e) => warn!(error = %e, "ranging sensor unavailable; scan producer skipped"),
        }

        tasks.push(tokio::spawn(run_audio(
            audio,
            audio_rx,
            outbound.clone(),
            shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(run_display(
            display,
            display_rx,
            outbound.clone(),
            shutdown.subscribe(),
        )));

        let ingress = tokio::spawn(
            IngressLoop {
                drive,
                inbound,
                alerts: alert_rx,
                outbound: outbound.clone(),
                audio: audio_tx,
                display: display_tx,
                shutdown: shutdown.subscribe(),
            }
            .run(),
        );

        info!(actuator_id = %config.actuator_id, tasks = tasks.len() + 1, "actuator host started");

        Self {
            shutdown,
            ingress,
            tasks,
            outbound,
            motion,
            grace: config.shutdown_grace,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn motion(&self) -> watch::Receiver<MotionSnapshot> {
        self.motion.clone()
    }

    pub fn telemetry_dropped(&self) -> u64 {
        self.outbound.dropped()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait(&self) {
        let mut rx = self.shutdown.subscribe();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Trigger shutdown and wait for every task, bounded by the grace period.
    /// The motors are deactivated before this returns.
    pub async fn shutdown(self) {
        self.shutdown.trigger();

        let Self {
            ingress,
            tasks,
            grace,
            ..
        } = self;
        let deadline = Instant::now() + grace;

        for handle in std::iter::once(ingress).chain(tasks) {
            let abort = handle.abort_handle();
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => warn!(error = %e, "host task failed"),
                Err(_) => {
                    warn!("host task did not stop within grace period; aborting");
                    abort.abort();
                }
            }
        }

        info!("actuator host stopped");
    }
}

// ---------------------------------------------------------------------------
// Ingress loop
// ---------------------------------------------------------------------------

struct IngressLoop {
    drive: MotorDrive,
    inbound: mpsc::Receiver<Inbound>,
    alerts: mpsc::Receiver<SafetyAlert>,
    outbound: Outbound,
    audio: MailboxSender<Vec<u8>>,
    display: MailboxSender<Animation>,
    shutdown: watch::Receiver<bool>,
}

impl IngressLoop {
    async fn run(mut self) {
        loop {
            let deadline = self.drive.deadline();
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => break,

                Some(alert) = self.alerts.recv() => {
                    let out = self.drive.safety_stop(alert);
                    self.acknowledge(out);
                }

                _ = wait_until(deadline) => {
                    let out = self.drive.expire();
                    self.acknowledge(out);
                }

                inbound = self.inbound.recv() => match inbound {
                    Some(inbound) => self.handle(inbound),
                    None => {
                        debug!("inbound queue closed");
                        break;
                    }
                },
            }
        }

        self.drive.emergency_stop_async().await;
    }

    fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Command(cmd) => self.apply(cmd),
            Inbound::Rejected { reason } => {
                self.outbound
                    .send_ack(ActuatorMessage::CommandRejected { reason });
            }
            Inbound::LinkDown => {
                warn!("controller link down; stopping");
                self.drive.reset();
            }
            Inbound::LinkUp => {
                info!("controller link up");
                self.drive.reset();
            }
        }
    }

    fn apply(&mut self, cmd: Command) {
        debug!(kind = cmd.kind(), "command received");
        if let Err(e) = cmd.validate() {
            return self.reject(e);
        }
        match cmd {
            Command::Move {
                direction,
                duration,
            } => {
                let duration = match seconds(duration) {
                    Ok(d) => d,
                    Err(e) => return self.reject(e),
                };
                match self.drive.start(direction, duration) {
                    Ok(()) => {}
                    Err(e @ RovError::InvalidCommand(_)) => self.reject(e),
                    Err(e) => self.outbound.send_ack(ActuatorMessage::HardwareFault {
                        component: "motor".to_string(),
                        details: e.to_string(),
                    }),
                }
            }
            Command::Stop => {
                let out = self.drive.stop();
                self.acknowledge(out);
            }
            Command::Speak { audio } => {
                if self.audio.post(audio) {
                    debug!("pending speech replaced");
                }
            }
            Command::Animate {
                keyframes,
                duration,
            } => {
                let duration = match seconds(duration) {
                    Ok(d) => d,
                    Err(e) => return self.reject(e),
                };
                if self.display.post(Animation {
                    keyframes,
                    duration,
                }) {
                    debug!("pending animation replaced");
                }
            }
        }
    }

    fn reject(&self, err: RovError) {
        self.outbound.send_ack(ActuatorMessage::CommandRejected {
            reason: err.to_string(),
        });
    }

    fn acknowledge(&self, messages: Vec<ActuatorMessage>) {
        for msg in messages {
            self.outbound.send_ack(msg);
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn seconds(secs: f64) -> Result<Duration, RovError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| RovError::InvalidCommand(format!("duration {secs}: {e}")))
}

// ---------------------------------------------------------------------------
// Output handlers
// ---------------------------------------------------------------------------

async fn run_audio(
    mut sink: Box<dyn AudioSink>,
    mut clips: MailboxReceiver<Vec<u8>>,
    outbound: Outbound,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let clip = tokio::select! {
            _ = shutdown.changed() => break,
            clip = clips.recv() => match clip {
                Some(clip) => clip,
                None => break,
            },
        };
        debug!(bytes = clip.len(), "playing speech");
        let result = tokio::select! {
            _ = shutdown.changed() => break,
            result = sink.play(&clip) => result,
        };
        if let Err(e) = result {
            warn!(error = %e, "speech playback failed");
            outbound.send_ack(ActuatorMessage::HardwareFault {
                component: "audio".to_string(),
                details: e.to_string(),
            });
        }
    }
}

async fn run_display(
    mut sink: Box<dyn DisplaySink>,
    mut animations: MailboxReceiver<Animation>,
    outbound: Outbound,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let animation = tokio::select! {
            _ = shutdown.changed() => break,
            animation = animations.recv() => match animation {
                Some(animation) => animation,
                None => break,
            },
        };
        let result = tokio::select! {
            _ = shutdown.changed() => break,
            result = sink.render(&animation.keyframes, animation.duration) => result,
        };
        if let Err(e) = result {
            warn!(error = %e, "face animation failed");
            outbound.send_ack(ActuatorMessage::HardwareFault {
                component: "display".to_string(),
                details: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rovlink_channel::OutboundReceivers;
    use rovlink_hal::MotorOutputs;
    use rovlink_hal::sim::{SimHardware, SimProbes};
    use rovlink_types::{Direction, EyeState, MouthShape};

    struct Harness {
        host: ActuatorHost,
        inbound: mpsc::Sender<Inbound>,
        out: OutboundReceivers,
        probes: SimProbes,
        started: Instant,
    }

    impl Harness {
        fn new(hardware: SimHardware, telemetry_capacity: usize) -> Self {
            let (hardware, probes) = hardware.build();
            let (outbound, out) = Outbound::channel(telemetry_capacity);
            out.set_connected(true);
            let (inbound, inbound_rx) = mpsc::channel(16);
            let host = ActuatorHost::spawn(HostConfig::default(), hardware, inbound_rx, outbound);
            Self {
                host,
                inbound,
                out,
                probes,
                started: Instant::now(),
            }
        }

        async fn send(&self, cmd: Command) {
            self.inbound.send(Inbound::Command(cmd)).await.unwrap();
        }

        async fn move_(&self, direction: Direction, duration: f64) {
            self.send(Command::Move {
                direction,
                duration,
            })
            .await;
        }

        /// Next non-telemetry message.
        async fn next_ack(&mut self) -> ActuatorMessage {
            loop {
                match self.out.next().await.expect("outbound closed") {
                    ActuatorMessage::Telemetry(_) => continue,
                    msg => return msg,
                }
            }
        }

        async fn no_ack_within(&mut self, window: Duration) -> bool {
            tokio::time::timeout(window, self.next_ack()).await.is_err()
        }

        fn elapsed(&self) -> f64 {
            self.started.elapsed().as_secs_f64()
        }
    }

    fn completion(msg: ActuatorMessage) -> (Direction, f64) {
        match msg {
            ActuatorMessage::MovementComplete {
                direction,
                actual_duration,
            } => (direction, actual_duration),
            other => panic!("expected MovementComplete, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_move_completes_on_time() {
        let mut h = Harness::new(SimHardware::full(), 64);
        h.move_(Direction::Forward, 3.0).await;

        let (direction, actual) = completion(h.next_ack().await);
        assert_eq!(direction, Direction::Forward);
        assert!((actual - 3.0).abs() < 0.05, "actual {actual}");
        assert!((h.elapsed() - 3.0).abs() < 0.05);
        assert_eq!(h.probes.motor.current(), MotorOutputs::OFF);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_move_replaces_the_one_in_flight() {
        let mut h = Harness::new(SimHardware::full(), 64);
        h.move_(Direction::Forward, 5.0).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.move_(Direction::Left, 2.0).await;

        let (direction, actual) = completion(h.next_ack().await);
        assert_eq!(direction, Direction::Left);
        assert!((actual - 2.0).abs() < 0.05);
        assert!((h.elapsed() - 3.0).abs() < 0.05);
        assert!(h.no_ack_within(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn obstacle_stops_motion_once() {
        let mut h = Harness::new(SimHardware::full(), 64);
        h.move_(Direction::Forward, 5.0).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.probes.proximity.set_distance(10.0);

        let ActuatorMessage::ObstacleAlert(alert) = h.next_ack().await else {
            panic!("expected ObstacleAlert");
        };
        let distance = alert.distance_cm.expect("distance measured");
        assert!(distance < 30.0);
        assert_eq!(h.next_ack().await, ActuatorMessage::StopComplete);
        assert!(h.elapsed() < 1.6, "tripped at {}", h.elapsed());
        assert_eq!(h.probes.motor.current(), MotorOutputs::OFF);

        // Sitting next to the obstacle: no more alerts, no completion.
        assert!(h.no_ack_within(Duration::from_secs(6)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_move_toward_obstacle_is_stopped_again() {
        let mut h = Harness::new(SimHardware::full().with_proximity(10.0), 64);
        h.move_(Direction::Forward, 5.0).await;
        assert!(matches!(h.next_ack().await, ActuatorMessage::ObstacleAlert(_)));
        assert_eq!(h.next_ack().await, ActuatorMessage::StopComplete);

        h.move_(Direction::Forward, 5.0).await;
        assert!(matches!(h.next_ack().await, ActuatorMessage::ObstacleAlert(_)));
        assert_eq!(h.next_ack().await, ActuatorMessage::StopComplete);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_sensor_while_moving_fails_safe() {
        let mut h = Harness::new(SimHardware::full(), 64);
        h.probes.proximity.fail();
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.move_(Direction::Backward, 5.0).await;

        let ActuatorMessage::ObstacleAlert(alert) = h.next_ack().await else {
            panic!("expected ObstacleAlert");
        };
        assert_eq!(alert.distance_cm, None);
        assert_eq!(h.next_ack().await, ActuatorMessage::StopComplete);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_are_idempotent_and_keep_outputs_off() {
        let mut h = Harness::new(SimHardware::full(), 64);
        h.move_(Direction::Right, 5.0).await;
        h.send(Command::Stop).await;
        h.send(Command::Stop).await;

        assert_eq!(h.next_ack().await, ActuatorMessage::StopComplete);
        assert_eq!(h.next_ack().await, ActuatorMessage::StopComplete);
        assert!(h.no_ack_within(Duration::from_secs(6)).await);
        assert_eq!(h.probes.motor.current(), MotorOutputs::OFF);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_idle_writes_and_acknowledges() {
        let mut h = Harness::new(SimHardware::new(), 64);
        h.send(Command::Stop).await;
        assert_eq!(h.next_ack().await, ActuatorMessage::StopComplete);
        assert_eq!(h.probes.motor.writes(), vec![MotorOutputs::OFF]);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_telemetry_does_not_delay_stop() {
        // One-slot telemetry lane that nobody drains.
        let mut h = Harness::new(SimHardware::full(), 1);
        h.move_(Direction::Forward, 10.0).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(h.host.telemetry_dropped() > 0);

        let sent = Instant::now();
        h.send(Command::Stop).await;
        assert_eq!(h.next_ack().await, ActuatorMessage::StopComplete);
        assert!(sent.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_leaves_drive_idle_and_usable() {
        let mut h = Harness::new(SimHardware::full(), 64);
        h.move_(Direction::Forward, 5.0).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        h.inbound.send(Inbound::LinkDown).await.unwrap();
        h.inbound.send(Inbound::LinkUp).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!h.host.motion().borrow().moving);
        assert_eq!(h.probes.motor.current(), MotorOutputs::OFF);

        h.move_(Direction::Right, 1.0).await;
        let (direction, actual) = completion(h.next_ack().await);
        assert_eq!(direction, Direction::Right);
        assert!((actual - 1.0).abs() < 0.05);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_move_completes_at_once() {
        let mut h = Harness::new(SimHardware::full(), 64);
        h.move_(Direction::Forward, 0.0).await;

        let (direction, actual) = completion(h.next_ack().await);
        assert_eq!(direction, Direction::Forward);
        assert!(actual < 0.01, "actual {actual}");
        assert!(h.elapsed() < 0.01);
        assert_eq!(h.probes.motor.current(), MotorOutputs::OFF);
        assert!(h.no_ack_within(Duration::from_secs(3)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_move_is_rejected_and_loop_stays_responsive() {
        let mut h = Harness::new(SimHardware::new(), 64);
        h.move_(Direction::Forward, 1.0e19).await;

        let ActuatorMessage::CommandRejected { reason } = h.next_ack().await else {
            panic!("expected CommandRejected");
        };
        assert!(reason.contains("exceeds"), "reason: {reason}");
        assert_eq!(h.probes.motor.write_count(), 0);

        h.send(Command::Stop).await;
        assert_eq!(h.next_ack().await, ActuatorMessage::StopComplete);

        h.move_(Direction::Left, 1.0).await;
        let (direction, _) = completion(h.next_ack().await);
        assert_eq!(direction, Direction::Left);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_frames_are_reported() {
        let mut h = Harness::new(SimHardware::new(), 64);
        h.inbound
            .send(Inbound::Rejected {
                reason: "unrecognized direction 'up'".into(),
            })
            .await
            .unwrap();
        let ActuatorMessage::CommandRejected { reason } = h.next_ack().await else {
            panic!("expected CommandRejected");
        };
        assert!(reason.contains("up"));
        assert!(!h.host.motion().borrow().moving);
    }

    #[tokio::test(start_paused = true)]
    async fn motor_fault_is_reported_and_latched() {
        let mut h = Harness::new(SimHardware::new(), 64);
        h.probes.motor.set_faulty(true);
        h.move_(Direction::Forward, 1.0).await;
        assert!(matches!(
            h.next_ack().await,
            ActuatorMessage::HardwareFault { .. }
        ));

        h.probes.motor.set_faulty(false);
        h.move_(Direction::Forward, 1.0).await;
        assert!(matches!(
            h.next_ack().await,
            ActuatorMessage::HardwareFault { .. }
        ));

        h.send(Command::Stop).await;
        assert_eq!(h.next_ack().await, ActuatorMessage::StopComplete);
    }

    #[tokio::test(start_paused = true)]
    async fn speech_and_animation_do_not_block_motion() {
        let mut h = Harness::new(
            SimHardware::new().with_clip_duration(Duration::from_secs(10)),
            64,
        );
        h.send(Command::Speak {
            audio: vec![1, 2, 3],
        })
        .await;
        h.send(Command::Animate {
            keyframes: vec![Keyframe {
                time: 0.0,
                mouth_shape: MouthShape::A,
                eye_state: EyeState::Open,
            }],
            duration: 1.5,
        })
        .await;
        h.move_(Direction::Left, 1.0).await;

        let (direction, _) = completion(h.next_ack().await);
        assert_eq!(direction, Direction::Left);
        assert!(h.elapsed() < 1.1);
        assert_eq!(h.probes.audio.played(), vec![vec![1, 2, 3]]);
        assert_eq!(
            h.probes.display.rendered(),
            vec![(1, Duration::from_millis(1500))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_proximity_disables_interlock() {
        let mut h = Harness::new(SimHardware::full().with_init_failure("proximity"), 64);
        h.probes.proximity.set_distance(5.0);
        h.move_(Direction::Forward, 1.0).await;
        let (direction, _) = completion(h.next_ack().await);
        assert_eq!(direction, Direction::Forward);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_deactivates_motors() {
        let h = Harness::new(SimHardware::full(), 64);
        h.move_(Direction::Forward, 30.0).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.probes.motor.current().is_energized());

        let handle = h.host.shutdown_handle();
        handle.trigger();
        assert!(handle.is_triggered());
        h.host.shutdown().await;

        let writes = h.probes.motor.writes();
        assert!(writes.len() >= 4);
        assert!(writes[writes.len() - 3..].iter().all(|w| *w == MotorOutputs::OFF));
    }
}
