//! Socket and logging helpers

pub mod net;
pub mod throttle;

pub use net::{bind_blocking_udp_socket, bind_tcp_listener, bind_udp_socket};
pub use throttle::LogThrottler;
