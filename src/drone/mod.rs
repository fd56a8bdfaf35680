//! Vehicle side: command mapping, throttling and the UDP link

pub mod command;
pub mod link;
pub mod status;
pub mod throttle;

pub use command::{DroneCommand, UnknownCommand};
pub use link::{DroneConfig, DroneLink};
pub use status::DroneStatus;
pub use throttle::{CommandSink, CommandThrottler, SubmitOutcome, THROTTLE_INTERVAL};
