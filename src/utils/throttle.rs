//! Log throttling
//!
//! Limits how often the same log message is recorded so a dead video link
//! does not flood the log once per read timeout.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Remembers when each message key was last logged
///
/// # Example
///
/// ```rust
/// use drone_teleop::utils::LogThrottler;
/// use std::time::Duration;
///
/// let throttler = LogThrottler::new(Duration::from_secs(5));
///
/// assert!(throttler.should_log("video_timeout"));
/// assert!(!throttler.should_log("video_timeout"));
/// assert!(throttler.should_log("video_recv"));
/// ```
pub struct LogThrottler {
    last_logged: Mutex<HashMap<String, Instant>>,
    interval: Duration,
}

impl LogThrottler {
    /// Create a throttler
    ///
    /// # Arguments
    ///
    /// * `interval` - Minimum time between two messages with the same key
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: Mutex::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// `true` if `key` may be logged now; records the time when it may
    ///
    /// # Arguments
    ///
    /// * `key` - Identifier of the message kind, not of one occurrence
    pub fn should_log(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.last_logged.lock();
        if let Some(last) = map.get(key) {
            if now.duration_since(*last) < self.interval {
                return false;
            }
        }
        map.insert(key.to_string(), now);
        true
    }

    /// Forget `key` so its next occurrence is logged immediately
    pub fn clear(&self, key: &str) {
        self.last_logged.lock().remove(key);
    }
}

impl Default for LogThrottler {
    fn default() -> Self {
        Self::with_secs(5)
    }
}

/// `tracing::warn!` gated by a [`LogThrottler`] key
///
/// # Example
///
/// ```rust
/// use drone_teleop::utils::LogThrottler;
/// use drone_teleop::warn_throttled;
///
/// let throttler = LogThrottler::default();
/// for _ in 0..100 {
///     // Logged once, then suppressed for five seconds
///     warn_throttled!(throttler, "video_timeout", "No video from drone");
/// }
/// ```
#[macro_export]
macro_rules! warn_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        if $throttler.should_log($key) {
            tracing::warn!($($arg)*);
        }
    };
}
