//! [`ActuatorLink`] – the actuator host's WebSocket client.
//!
//! The link dials the controller, sends `Ready{actuator_id}` as its first
//! frame and then multiplexes the connection:
//!
//! * inbound text frames are decoded once into [`Inbound::Command`] (or
//!   [`Inbound::Rejected`] when decoding fails) and handed to the host's
//!   single ingress queue in arrival order;
//! * outbound messages come from [`OutboundReceivers`], acknowledgements
//!   first.
//!
//! A lost connection is reported as [`Inbound::LinkDown`] and redialled after
//! a fixed back-off.  Nothing queued for the old connection is replayed.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rovlink_types::{ActuatorMessage, Command, RovError};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::codec;
use crate::outbound::OutboundReceivers;

/// Default wait between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// `ws://host:port` of the controller server.
    pub url: String,
    pub actuator_id: String,
    pub reconnect_delay: Duration,
}

impl LinkConfig {
    pub fn new(url: impl Into<String>, actuator_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            actuator_id: actuator_id.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// What the link hands to the actuator host's ingress loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(Command),
    /// A frame that failed to decode; answered with `CommandRejected`.
    Rejected { reason: String },
    /// The handshake completed on a fresh connection.
    LinkUp,
    LinkDown,
}

pub struct ActuatorLink {
    config: LinkConfig,
    outbound: OutboundReceivers,
    inbound: mpsc::Sender<Inbound>,
    shutdown: watch::Receiver<bool>,
}

impl ActuatorLink {
    pub fn new(
        config: LinkConfig,
        outbound: OutboundReceivers,
        inbound: mpsc::Sender<Inbound>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            outbound,
            inbound,
            shutdown,
        }
    }

    /// Dial, serve and redial until shutdown is signalled or the host drops
    /// its ingress queue.
    pub async fn run(mut self) {
        info!(url = %self.config.url, actuator_id = %self.config.actuator_id, "actuator link starting");

        while !*self.shutdown.borrow() {
            let attempt = tokio::select! {
                _ = self.shutdown.changed() => break,
                result = connect_async(self.config.url.as_str()) => result,
            };

            match attempt {
                Ok((ws, _response)) => {
                    let discarded = self.outbound.discard_pending();
                    if discarded > 0 {
                        debug!(discarded, "dropped messages queued while offline");
                    }
                    info!(url = %self.config.url, "connected to controller");

                    let result = self.serve(ws).await;
                    self.outbound.set_connected(false);
                    match result {
                        Ok(()) => info!("controller link closed"),
                        Err(e) => warn!(error = %e, "controller link lost"),
                    }
                    if self.inbound.send(Inbound::LinkDown).await.is_err()
                        || *self.shutdown.borrow()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!(url = %self.config.url, error = %e, "controller unreachable");
                }
            }

            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        info!("actuator link stopped");
    }

    async fn serve<S>(&mut self, ws: tokio_tungstenite::WebSocketStream<S>) -> Result<(), RovError>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut ws_tx, mut ws_rx) = ws.split();

        let ready = codec::encode(&ActuatorMessage::Ready {
            actuator_id: self.config.actuator_id.clone(),
        })?;
        ws_tx
            .send(Message::Text(ready.into()))
            .await
            .map_err(|e| RovError::ConnectionLost(format!("{}: {e}", self.config.url)))?;

        self.outbound.set_connected(true);
        self.forward(Inbound::LinkUp).await?;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(());
                }

                // ── Upstream: controller → ingress queue ─────────────────
                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let inbound = match codec::decode_command(text.as_str()) {
                            Ok(cmd) => Inbound::Command(cmd),
                            Err(e) => {
                                debug!(error = %e, "undecodable command frame");
                                Inbound::Rejected { reason: e.to_string() }
                            }
                        };
                        self.forward(inbound).await?;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        self.forward(Inbound::Rejected {
                            reason: "binary frames are not supported".to_string(),
                        })
                        .await?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(RovError::ConnectionLost(format!("{}: {e}", self.config.url)));
                    }
                },

                // ── Downstream: outbound lanes → controller ──────────────
                msg = self.outbound.next() => {
                    let Some(msg) = msg else {
                        return Ok(());
                    };
                    let text = codec::encode(&msg)?;
                    ws_tx
                        .send(Message::Text(text.into()))
                        .await
                        .map_err(|e| RovError::ConnectionLost(format!("{}: {e}", self.config.url)))?;
                }
            }
        }
    }

    async fn forward(&self, inbound: Inbound) -> Result<(), RovError> {
        self.inbound
            .send(inbound)
            .await
            .map_err(|_| RovError::Channel("actuator ingress queue closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::Outbound;
    use rovlink_types::Direction;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Stand-in controller: accepts one connection, returns the socket.
    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn handshake_then_commands_in_order() {
        let (listener, url) = listener().await;
        let (outbound, receivers) = Outbound::channel(8);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let link = ActuatorLink::new(LinkConfig::new(url, "pi-01"), receivers, inbound_tx, shutdown_rx);
        let link_task = tokio::spawn(link.run());

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let Some(Ok(Message::Text(first))) = ws.next().await else {
            panic!("expected ready frame");
        };
        assert_eq!(
            codec::decode_actuator_message(first.as_str()).unwrap(),
            ActuatorMessage::Ready {
                actuator_id: "pi-01".into()
            }
        );
        assert_eq!(inbound_rx.recv().await, Some(Inbound::LinkUp));

        for frame in [
            r#"{"type":"move","payload":{"direction":"f","duration":1.0}}"#,
            r#"{"type":"move","payload":{"direction":"sideways"}}"#,
            r#"{"type":"stop"}"#,
        ] {
            ws.send(Message::Text(frame.to_string().into())).await.unwrap();
        }

        assert_eq!(
            inbound_rx.recv().await,
            Some(Inbound::Command(Command::Move {
                direction: Direction::Forward,
                duration: 1.0
            }))
        );
        assert!(matches!(inbound_rx.recv().await, Some(Inbound::Rejected { .. })));
        assert_eq!(inbound_rx.recv().await, Some(Inbound::Command(Command::Stop)));

        outbound.send_ack(ActuatorMessage::StopComplete);
        let Some(Ok(Message::Text(ack))) = ws.next().await else {
            panic!("expected ack frame");
        };
        assert_eq!(
            codec::decode_actuator_message(ack.as_str()).unwrap(),
            ActuatorMessage::StopComplete
        );

        shutdown_tx.send(true).unwrap();
        link_task.await.unwrap();
    }

    #[tokio::test]
    async fn reports_link_down_and_redials() {
        let (listener, url) = listener().await;
        let (_outbound, receivers) = Outbound::channel(8);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut config = LinkConfig::new(url, "pi-01");
        config.reconnect_delay = Duration::from_millis(10);
        let link_task = tokio::spawn(ActuatorLink::new(config, receivers, inbound_tx, shutdown_rx).run());

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _ready = ws.next().await;
        assert_eq!(inbound_rx.recv().await, Some(Inbound::LinkUp));

        drop(ws);
        assert_eq!(inbound_rx.recv().await, Some(Inbound::LinkDown));

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _ready = ws.next().await;
        assert_eq!(inbound_rx.recv().await, Some(Inbound::LinkUp));

        shutdown_tx.send(true).unwrap();
        link_task.await.unwrap();
    }
}
