//! Typed, topic-based publish/subscribe bus for upward consumers.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the controller.  A subscriber that falls behind loses the oldest events
//! and is told so through `RecvError::Lagged`.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Telemetry`] | Camera frames, range scans, proximity readings |
//! | [`Topic::Acknowledgements`] | `MovementComplete`, `StopComplete`, `CommandRejected` |
//! | [`Topic::SafetyAlerts`] | Interlock trips and hardware faults |
//! | [`Topic::Sessions`] | Actuator sessions going up or down |

use rovlink_types::{Event, EventPayload};
use tokio::sync::broadcast;
use tracing::warn;

/// Number of buffered events before old ones are dropped for slow subscribers.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Telemetry,
    Acknowledgements,
    SafetyAlerts,
    Sessions,
}

impl Topic {
    /// The lane an event payload is routed to.
    pub fn for_payload(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::Telemetry(_) => Topic::Telemetry,
            EventPayload::MovementComplete { .. }
            | EventPayload::StopComplete
            | EventPayload::CommandRejected { .. } => Topic::Acknowledgements,
            EventPayload::ObstacleAlert(_) | EventPayload::HardwareFault { .. } => {
                Topic::SafetyAlerts
            }
            EventPayload::SessionChanged { .. } => Topic::Sessions,
        }
    }
}

/// Shared event bus. Clone it cheaply; all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    telemetry: broadcast::Sender<Event>,
    acknowledgements: broadcast::Sender<Event>,
    safety_alerts: broadcast::Sender<Event>,
    sessions: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every topic independently.
    pub fn new(capacity: usize) -> Self {
        let (telemetry, _) = broadcast::channel(capacity);
        let (acknowledgements, _) = broadcast::channel(capacity);
        let (safety_alerts, _) = broadcast::channel(capacity);
        let (sessions, _) = broadcast::channel(capacity);
        Self {
            telemetry,
            acknowledgements,
            safety_alerts,
            sessions,
        }
    }

    /// Publish `event` on the topic its payload belongs to.
    ///
    /// Returns the number of subscribers handed the event.  Zero subscribers
    /// is a normal condition: upward consumers are optional.
    pub fn publish(&self, event: Event) -> usize {
        let topic = Topic::for_payload(&event.payload);
        self.topic_sender(topic).send(event).unwrap_or(0)
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Telemetry => &self.telemetry,
            Topic::Acknowledgements => &self.acknowledgements,
            Topic::SafetyAlerts => &self.safety_alerts,
            Topic::Sessions => &self.sessions,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   events were dropped.  The caller decides whether to continue.
    /// * `Err(RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Like [`recv`](Self::recv) but skips over lag, logging it.  Returns
    /// `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "bus subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rovlink_types::{SafetyAlert, TelemetrySample};

    fn proximity_event(cm: f32) -> Event {
        Event::new(
            "pi-01",
            EventPayload::Telemetry(TelemetrySample::Proximity {
                distance_cm: cm,
                captured_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn payloads_route_to_expected_topics() {
        assert_eq!(
            Topic::for_payload(&EventPayload::StopComplete),
            Topic::Acknowledgements
        );
        assert_eq!(
            Topic::for_payload(&EventPayload::ObstacleAlert(SafetyAlert::new(Some(5.0)))),
            Topic::SafetyAlerts
        );
        assert_eq!(
            Topic::for_payload(&EventPayload::SessionChanged { connected: true }),
            Topic::Sessions
        );
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(proximity_event(10.0)), 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut sub1 = bus.subscribe_to(Topic::Telemetry);
        let mut sub2 = bus.subscribe_to(Topic::Telemetry);

        let event = proximity_event(55.0);
        assert_eq!(bus.publish(event.clone()), 2);

        assert_eq!(sub1.recv().await?.id, event.id);
        assert_eq!(sub2.recv().await?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn subscriber_does_not_receive_other_topic_events() {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SafetyAlerts);

        bus.publish(proximity_event(80.0));

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), alerts.recv()).await;
        assert!(result.is_err(), "SafetyAlerts must not see telemetry");
    }

    #[tokio::test]
    async fn slow_subscriber_lags_and_next_skips_ahead() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe_to(Topic::Telemetry);

        for i in 0..100 {
            bus.publish(proximity_event(i as f32));
        }

        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged, got: {result:?}"
        );
        assert!(slow.next().await.is_some());
    }
}
