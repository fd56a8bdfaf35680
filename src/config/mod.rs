//! Process configuration (command line and environment)

mod schema;

pub use schema::{AppConfig, LogLevel};
