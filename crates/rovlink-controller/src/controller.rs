//! [`RobotController`] – command API and upward event publisher.
//!
//! Commands are validated, then handed to the actuator's live connection.
//! A command for an actuator that is not connected fails immediately; it is
//! never queued for a later session.  Everything the actuator reports is
//! republished unmodified on the [`EventBus`], tagged with the actuator id
//! and the receipt time.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rovlink_channel::EventBus;
use rovlink_types::{
    ActuatorMessage, Command, Direction, Event, EventPayload, Keyframe, RovError,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::session::{ConnectionToken, SessionInfo, SessionTable};

#[derive(Clone)]
pub struct RobotController {
    sessions: Arc<Mutex<SessionTable>>,
    bus: EventBus,
}

impl RobotController {
    pub fn new(bus: EventBus, session_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(SessionTable::new(session_timeout))),
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // -----------------------------------------------------------------------
    // Command API
    // -----------------------------------------------------------------------

    pub fn send_movement(
        &self,
        actuator_id: &str,
        direction: Direction,
        duration: f64,
    ) -> Result<(), RovError> {
        self.send(
            actuator_id,
            Command::Move {
                direction,
                duration,
            },
        )
    }

    pub fn send_stop(&self, actuator_id: &str) -> Result<(), RovError> {
        self.send(actuator_id, Command::Stop)
    }

    pub fn send_speech(&self, actuator_id: &str, audio: Vec<u8>) -> Result<(), RovError> {
        self.send(actuator_id, Command::Speak { audio })
    }

    pub fn send_face_animation(
        &self,
        actuator_id: &str,
        keyframes: Vec<Keyframe>,
        duration: f64,
    ) -> Result<(), RovError> {
        self.send(
            actuator_id,
            Command::Animate {
                keyframes,
                duration,
            },
        )
    }

    fn send(&self, actuator_id: &str, cmd: Command) -> Result<(), RovError> {
        cmd.validate()?;
        let kind = cmd.kind();
        self.sessions.lock().dispatch(actuator_id, cmd)?;
        debug!(actuator_id, kind, "command dispatched");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Connection callbacks (driven by the server)
    // -----------------------------------------------------------------------

    /// Register a `Ready` handshake and return the connection's token.
    pub fn handle_handshake(
        &self,
        actuator_id: &str,
        outbox: mpsc::UnboundedSender<Command>,
    ) -> ConnectionToken {
        let token = self.sessions.lock().connect(actuator_id, outbox);
        info!(actuator_id, "actuator session up");
        self.publish(actuator_id, EventPayload::SessionChanged { connected: true });
        token
    }

    /// Route one decoded message from an actuator connection.
    pub fn handle_inbound(&self, actuator_id: &str, token: ConnectionToken, msg: ActuatorMessage) {
        if !self.sessions.lock().touch(actuator_id, token) {
            debug!(actuator_id, "message from a superseded connection ignored");
            return;
        }
        match &msg {
            ActuatorMessage::ObstacleAlert(alert) => {
                warn!(actuator_id, distance_cm = ?alert.distance_cm, "obstacle alert");
            }
            ActuatorMessage::HardwareFault { component, details } => {
                warn!(actuator_id, component = %component, details = %details, "actuator hardware fault");
            }
            ActuatorMessage::CommandRejected { reason } => {
                warn!(actuator_id, reason = %reason, "command rejected by actuator");
            }
            ActuatorMessage::Ready { .. } => {
                debug!(actuator_id, "duplicate handshake ignored");
            }
            _ => {}
        }
        if let Some(payload) = EventPayload::from_actuator(msg) {
            self.publish(actuator_id, payload);
        }
    }

    /// Record traffic that carries no message, such as a pong.
    pub fn handle_keepalive(&self, actuator_id: &str, token: ConnectionToken) {
        self.sessions.lock().touch(actuator_id, token);
    }

    /// The connection holding `token` has closed.
    pub fn handle_disconnect(&self, actuator_id: &str, token: ConnectionToken) {
        if self.sessions.lock().disconnect(actuator_id, token) {
            warn!(actuator_id, "actuator session lost");
            self.publish(actuator_id, EventPayload::SessionChanged { connected: false });
        }
    }

    // -----------------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------------

    /// Disconnect every silent session once.
    pub fn sweep(&self) -> Vec<String> {
        let expired = self.sessions.lock().sweep();
        for actuator_id in &expired {
            warn!(actuator_id = %actuator_id, "actuator session timed out");
            self.publish(actuator_id, EventPayload::SessionChanged { connected: false });
        }
        expired
    }

    /// Sweep periodically until shutdown.
    pub async fn run_liveness(self, mut shutdown: watch::Receiver<bool>) {
        let period = (self.session_timeout() / 4).max(Duration::from_millis(100));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions.lock().snapshot()
    }

    pub fn is_connected(&self, actuator_id: &str) -> bool {
        self.sessions.lock().is_connected(actuator_id)
    }

    pub fn session_timeout(&self) -> Duration {
        self.sessions.lock().timeout()
    }

    fn publish(&self, actuator_id: &str, payload: EventPayload) {
        let delivered = self.bus.publish(Event::new(actuator_id, payload));
        debug!(actuator_id, delivered, "event published");
    }
}
