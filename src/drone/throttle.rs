//! Rate limiting of operator movement commands
//!
//! A movement command accepted less than [`THROTTLE_INTERVAL`] after the
//! previous accepted one is dropped outright. Nothing is queued: operator
//! input older than the window is superseded by whatever comes next.
//! Takeoff and land bypass the throttle.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::command::DroneCommand;

/// Minimum spacing between two accepted movement commands
pub const THROTTLE_INTERVAL: Duration = Duration::from_millis(500);

/// Destination of accepted instructions
pub trait CommandSink: Send + Sync {
    fn send(&self, instruction: &str);
}

/// What happened to a submitted token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent,
    Throttled,
    Unknown,
}

pub struct CommandThrottler {
    sink: Arc<dyn CommandSink>,
    interval: Duration,
    /// Time of the last accepted movement command
    last_accepted: Mutex<Option<Instant>>,
}

impl CommandThrottler {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self::with_interval(sink, THROTTLE_INTERVAL)
    }

    pub fn with_interval(sink: Arc<dyn CommandSink>, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            last_accepted: Mutex::new(None),
        }
    }

    /// Map a raw token and forward it unless throttled
    pub fn submit(&self, token: &str) -> SubmitOutcome {
        self.submit_at(token, Instant::now())
    }

    fn submit_at(&self, token: &str, now: Instant) -> SubmitOutcome {
        let command = match token.parse::<DroneCommand>() {
            Ok(command) => command,
            Err(e) => {
                warn!("Dropping operator command: {}", e);
                return SubmitOutcome::Unknown;
            }
        };

        if command.is_movement() {
            let mut last = self.last_accepted.lock();
            if let Some(prev) = *last {
                if now.saturating_duration_since(prev) < self.interval {
                    debug!("Too often, ignoring command [{}]", command);
                    return SubmitOutcome::Throttled;
                }
            }
            *last = Some(now);
        }

        self.sink.send(&command.instruction());
        SubmitOutcome::Sent
    }
}
