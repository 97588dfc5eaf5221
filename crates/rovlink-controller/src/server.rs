//! [`ControllerServer`] – WebSocket endpoint the actuators dial into.
//!
//! Listens on `0.0.0.0:5000` (configurable via [`ControllerServer::with_port`]).
//! Every connection must open with a `Ready{actuator_id}` frame within the
//! handshake timeout, otherwise it is closed.  After the handshake the
//! connection is bridged to the [`RobotController`]:
//!
//! * commands from the session's outbox → text frames to the actuator;
//! * decoded actuator frames → [`RobotController::handle_inbound`].
//!
//! The server pings each connection periodically so that a quiet but healthy
//! actuator keeps its session alive.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rovlink_channel::codec;
use rovlink_types::{ActuatorMessage, RovError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::controller::RobotController;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ControllerServer {
    controller: RobotController,
    port: u16,
    handshake_timeout: Duration,
}

impl ControllerServer {
    /// Create a server for `controller` on the [`DEFAULT_PORT`].
    pub fn new(controller: RobotController) -> Self {
        Self {
            controller,
            port: DEFAULT_PORT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the configured port and serve until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`RovError::Channel`] if the TCP listener cannot bind.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), RovError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RovError::Channel(format!("bind error on {addr}: {e}")))?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Serve connections from an already bound listener until shutdown.
    pub async fn serve(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "controller listening for actuators");
        }

        tokio::spawn(self.controller.clone().run_liveness(shutdown.clone()));

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, peer, shutdown).await {
                                warn!(peer = %peer, error = %e, "actuator connection ended");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept error"),
                },
            }
        }

        info!("controller server stopped");
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RovError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| RovError::Channel(format!("ws handshake from {peer}: {e}")))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        // ── Handshake: the first frame must be Ready ────────────────────────
        let first = tokio::time::timeout(self.handshake_timeout, ws_rx.next())
            .await
            .map_err(|_| {
                RovError::ConnectionLost(format!("{peer}: no handshake within {:?}", self.handshake_timeout))
            })?;
        let actuator_id = match first {
            Some(Ok(Message::Text(text))) => match codec::decode_actuator_message(text.as_str()) {
                Ok(ActuatorMessage::Ready { actuator_id }) => actuator_id,
                Ok(other) => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Err(RovError::Codec(format!(
                        "{peer}: expected ready handshake, got {other:?}"
                    )));
                }
                Err(e) => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Err(e);
                }
            },
            _ => return Err(RovError::ConnectionLost(format!("{peer}: closed before handshake"))),
        };

        let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel();
        let token = self.controller.handle_handshake(&actuator_id, outbox_tx);
        info!(peer = %peer, actuator_id = %actuator_id, "actuator handshake complete");

        let mut keepalive = tokio::time::interval(self.keepalive_period());
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let result = loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break Ok(());
                }

                // ── Downstream: outbox → actuator ───────────────────────────
                cmd = outbox_rx.recv() => {
                    let Some(cmd) = cmd else {
                        // Session superseded or timed out.
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break Ok(());
                    };
                    let text = match codec::encode(&cmd) {
                        Ok(text) => text,
                        Err(e) => break Err(e),
                    };
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        break Err(RovError::ConnectionLost(format!("{actuator_id}: {e}")));
                    }
                }

                _ = keepalive.tick() => {
                    if let Err(e) = ws_tx.send(Message::Ping(Vec::new().into())).await {
                        break Err(RovError::ConnectionLost(format!("{actuator_id}: {e}")));
                    }
                }

                // ── Upstream: actuator → controller ─────────────────────────
                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match codec::decode_actuator_message(text.as_str()) {
                            Ok(msg) => self.controller.handle_inbound(&actuator_id, token, msg),
                            Err(e) => warn!(actuator_id = %actuator_id, error = %e, "undecodable actuator frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => self.controller.handle_keepalive(&actuator_id, token),
                    Some(Err(e)) => break Err(RovError::ConnectionLost(format!("{actuator_id}: {e}"))),
                },
            }
        };

        debug!(actuator_id = %actuator_id, "actuator connection closing");
        self.controller.handle_disconnect(&actuator_id, token);
        result
    }

    fn keepalive_period(&self) -> Duration {
        (self.controller.session_timeout() / 3).max(Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rovlink_channel::{EventBus, Topic};
    use rovlink_types::{Command, Direction, EventPayload};
    use tokio_tungstenite::connect_async;

    async fn start_server(
        handshake_timeout: Duration,
    ) -> (RobotController, String, watch::Sender<bool>) {
        let controller = RobotController::new(EventBus::default(), Duration::from_secs(10));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = ControllerServer::new(controller.clone()).with_handshake_timeout(handshake_timeout);
        tokio::spawn(server.serve(listener, shutdown_rx));
        (controller, url, shutdown_tx)
    }

    fn ready(id: &str) -> Message {
        let text = codec::encode(&ActuatorMessage::Ready {
            actuator_id: id.to_string(),
        })
        .unwrap();
        Message::Text(text.into())
    }

    #[tokio::test]
    async fn handshake_then_bidirectional_traffic() {
        let (controller, url, _shutdown) = start_server(Duration::from_secs(5)).await;
        let mut sessions = controller.bus().subscribe_to(Topic::Sessions);
        let mut acks = controller.bus().subscribe_to(Topic::Acknowledgements);

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        ws.send(ready("pi-01")).await.unwrap();
        assert_eq!(
            sessions.recv().await.unwrap().payload,
            EventPayload::SessionChanged { connected: true }
        );

        controller
            .send_movement("pi-01", Direction::Backward, 1.5)
            .unwrap();
        let cmd = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => break codec::decode_command(text.as_str()).unwrap(),
                _ => continue,
            }
        };
        assert_eq!(
            cmd,
            Command::Move {
                direction: Direction::Backward,
                duration: 1.5
            }
        );

        let done = codec::encode(&ActuatorMessage::StopComplete).unwrap();
        ws.send(Message::Text(done.into())).await.unwrap();
        let event = acks.recv().await.unwrap();
        assert_eq!(event.actuator_id, "pi-01");
        assert_eq!(event.payload, EventPayload::StopComplete);

        drop(ws);
        assert_eq!(
            sessions.recv().await.unwrap().payload,
            EventPayload::SessionChanged { connected: false }
        );
        assert!(controller.send_stop("pi-01").is_err());
    }

    #[tokio::test]
    async fn silent_connection_is_closed_after_handshake_timeout() {
        let (controller, url, _shutdown) = start_server(Duration::from_millis(100)).await;
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match ws.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "server kept the silent connection open");
        assert!(controller.sessions().is_empty());
    }

    #[tokio::test]
    async fn non_ready_first_frame_is_refused() {
        let (controller, url, _shutdown) = start_server(Duration::from_secs(5)).await;
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        let stop = codec::encode(&ActuatorMessage::StopComplete).unwrap();
        ws.send(Message::Text(stop.into())).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next()).await.unwrap();
        assert!(matches!(frame, None | Some(Err(_)) | Some(Ok(Message::Close(_)))));
        assert!(controller.sessions().is_empty());
    }

    #[tokio::test]
    async fn reconnect_replaces_the_old_connection() {
        let (controller, url, _shutdown) = start_server(Duration::from_secs(5)).await;
        let mut sessions = controller.bus().subscribe_to(Topic::Sessions);

        let (mut old, _) = connect_async(url.as_str()).await.unwrap();
        old.send(ready("pi-01")).await.unwrap();
        sessions.recv().await.unwrap();

        let (mut new, _) = connect_async(url.as_str()).await.unwrap();
        new.send(ready("pi-01")).await.unwrap();
        sessions.recv().await.unwrap();

        // The superseded connection is closed by the server and must not
        // take the new session down with it.
        drop(old);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(controller.is_connected("pi-01"));

        controller.send_stop("pi-01").unwrap();
        let cmd = loop {
            match new.next().await.unwrap().unwrap() {
                Message::Text(text) => break codec::decode_command(text.as_str()).unwrap(),
                _ => continue,
            }
        };
        assert_eq!(cmd, Command::Stop);
    }
}
