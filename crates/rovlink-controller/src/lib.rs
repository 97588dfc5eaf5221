//! Controller side of the link.
//!
//! [`RobotController`] is the command API the rest of the compute host
//! calls; [`ControllerServer`] accepts actuator connections and feeds the
//! controller; [`SessionTable`] tracks which actuators can take commands.

pub mod controller;
pub mod server;
pub mod session;

pub use controller::RobotController;
pub use server::ControllerServer;
pub use session::{ConnectionToken, SessionInfo, SessionTable};
