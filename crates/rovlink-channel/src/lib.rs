//! Transport layer shared by the controller and the actuator host.
//!
//! * [`codec`] – JSON text-frame encoding of the message contract.
//! * [`bus`] – topic-partitioned broadcast bus for upward consumers.
//! * [`outbound`] – the actuator's two-lane outbound queue (reliable
//!   acknowledgements, lossy telemetry).
//! * [`link`] – the actuator's WebSocket client with its reconnect loop.

pub mod bus;
pub mod codec;
pub mod link;
pub mod outbound;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use link::{ActuatorLink, Inbound, LinkConfig};
pub use outbound::{Outbound, OutboundReceivers};
