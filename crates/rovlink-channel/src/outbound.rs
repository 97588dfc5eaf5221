//! The actuator's outbound path.
//!
//! Two lanes feed the socket writer:
//!
//! * acknowledgements: unbounded, never dropped while the process lives;
//! * telemetry: bounded, filled with `try_send`.  A full queue or a
//!   disconnected link drops the sample and bumps a counter, so a slow or
//!   hung network can never stall a producer, let alone the motor loop.
//!
//! The writer always drains acknowledgements before telemetry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use rovlink_types::{ActuatorMessage, TelemetrySample};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Default depth of the telemetry lane.
pub const DEFAULT_TELEMETRY_CAPACITY: usize = 32;

/// Sending half, cloned into every producer and the ingress loop.
#[derive(Clone)]
pub struct Outbound {
    telemetry: mpsc::Sender<TelemetrySample>,
    acks: mpsc::UnboundedSender<ActuatorMessage>,
    connected: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

/// Receiving half, owned by the socket writer.
pub struct OutboundReceivers {
    telemetry: mpsc::Receiver<TelemetrySample>,
    acks: mpsc::UnboundedReceiver<ActuatorMessage>,
    connected: Arc<AtomicBool>,
}

impl Outbound {
    pub fn channel(telemetry_capacity: usize) -> (Outbound, OutboundReceivers) {
        let (telemetry_tx, telemetry_rx) = mpsc::channel(telemetry_capacity);
        let (acks_tx, acks_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        (
            Outbound {
                telemetry: telemetry_tx,
                acks: acks_tx,
                connected: Arc::clone(&connected),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            OutboundReceivers {
                telemetry: telemetry_rx,
                acks: acks_rx,
                connected,
            },
        )
    }

    /// Offer a sample to the telemetry lane without waiting.
    ///
    /// Returns `false` (and counts a drop) when the link is down, the lane is
    /// full or the writer is gone.
    pub fn send_telemetry(&self, sample: TelemetrySample) -> bool {
        if !self.is_connected() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        match self.telemetry.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(sample)) | Err(TrySendError::Closed(sample)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(kind = sample.kind(), dropped_total = total, "telemetry sample dropped");
                false
            }
        }
    }

    /// Queue a terminal acknowledgement (or any non-telemetry message).
    pub fn send_ack(&self, msg: ActuatorMessage) {
        if self.acks.send(msg).is_err() {
            debug!("outbound writer gone; acknowledgement discarded");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Total telemetry samples dropped since start.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl OutboundReceivers {
    /// Next message for the socket, acknowledgements first.
    ///
    /// Returns `None` once both lanes are closed.
    pub async fn next(&mut self) -> Option<ActuatorMessage> {
        tokio::select! {
            biased;
            Some(ack) = self.acks.recv() => Some(ack),
            Some(sample) = self.telemetry.recv() => Some(ActuatorMessage::Telemetry(sample)),
            else => None,
        }
    }

    /// Mark the link up or down; producers see it on their next send.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Throw away everything queued for a connection that no longer exists.
    pub fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.acks.try_recv().is_ok() {
            discarded += 1;
        }
        while self.telemetry.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}
