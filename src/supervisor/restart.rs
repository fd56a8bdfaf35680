//! Worker-side restart request
//!
//! Staleness is never repaired in place: the worker raises a restart
//! request once and the parent supervisor relaunches the whole process.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Line prefix the supervisor watches for on the worker's stdout
pub const RESTART_LINE_PREFIX: &str = "RESTART";

pub fn format_restart_line(pid: u32) -> String {
    format!("{} {}", RESTART_LINE_PREFIX, pid)
}

/// Parse `RESTART <pid>`
///
/// # Example
///
/// ```rust
/// use drone_teleop::supervisor::{format_restart_line, parse_restart_line};
///
/// assert_eq!(parse_restart_line(&format_restart_line(4242)), Some(4242));
/// assert_eq!(parse_restart_line("INFO worker ready"), None);
/// ```
pub fn parse_restart_line(line: &str) -> Option<u32> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(RESTART_LINE_PREFIX), Some(pid), None) => pid.parse().ok(),
        _ => None,
    }
}

pub struct RestartSignal {
    /// Set as soon as a restart is requested or scheduled
    requested: AtomicBool,
    /// Set once the single request went out
    emitted: AtomicBool,
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl RestartSignal {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            requested: AtomicBool::new(false),
            emitted: AtomicBool::new(false),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Ask for a restart now; only the first request is delivered
    pub fn request(&self, reason: &str) {
        self.requested.store(true, Ordering::SeqCst);
        if self.emitted.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!("Restart requested: {}", reason);
        let _ = self.tx.send(reason.to_string());
    }

    /// Mark the worker as restarting now and deliver the request after `delay`
    ///
    /// # Arguments
    ///
    /// * `delay` - Time left for in-flight responses before the worker is replaced
    /// * `reason` - Logged with the restart line
    pub fn schedule(self: &Arc<Self>, delay: Duration, reason: &str) {
        self.requested.store(true, Ordering::SeqCst);
        info!("Restart scheduled in {:?}: {}", delay, reason);

        let this = self.clone();
        let reason = reason.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.request(&reason);
        });
    }

    /// Receiver of restart requests; can be taken once
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.rx.lock().take()
    }
}

impl Default for RestartSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for the first restart request and pass it to the supervisor
pub async fn report_restart(mut rx: mpsc::UnboundedReceiver<String>) {
    let Some(reason) = rx.recv().await else {
        return;
    };

    let line = format_restart_line(std::process::id());
    info!("Reporting restart to supervisor ({})", reason);

    let mut stdout = tokio::io::stdout();
    let written = async {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await
    };
    if let Err(e) = written.await {
        warn!("Failed to report restart: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_line() {
        assert_eq!(parse_restart_line(&format_restart_line(4242)), Some(4242));
        assert_eq!(parse_restart_line("RESTART"), None);
        assert_eq!(parse_restart_line("RESTART abc"), None);
        assert_eq!(parse_restart_line("RESTART 1 2"), None);
        assert_eq!(parse_restart_line("listening on 8080"), None);
    }

    #[tokio::test]
    async fn test_request_is_single_shot() {
        let signal = RestartSignal::new();
        let mut rx = signal.take_receiver().unwrap();
        assert!(signal.take_receiver().is_none());
        assert!(!signal.is_requested());

        signal.request("first");
        signal.request("second");

        assert!(signal.is_requested());
        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_sets_flag_before_emitting() {
        let signal = Arc::new(RestartSignal::new());
        let mut rx = signal.take_receiver().unwrap();

        signal.schedule(Duration::from_secs(1), "page reload");
        assert!(signal.is_requested());
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(rx.recv().await.as_deref(), Some("page reload"));
    }
}
