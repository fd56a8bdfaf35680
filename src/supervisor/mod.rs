//! Parent process that keeps one worker alive
//!
//! The worker is this same binary started with `--worker`. Its stdout is
//! reserved for control lines; logs go to stderr, which is inherited.

pub mod restart;

pub use restart::{format_restart_line, parse_restart_line, report_restart, RestartSignal};

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};

/// Pause between killing a worker and starting the next one
pub const RELAUNCH_DELAY: Duration = Duration::from_secs(3);

/// Why a worker run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Worker asked to be restarted (it has been killed)
    RestartRequested { pid: u32 },
    /// Worker exited by itself
    Exited(Option<i32>),
}

pub struct ProcessSupervisor {
    program: PathBuf,
    args: Vec<OsString>,
    relaunch_delay: Duration,
}

impl ProcessSupervisor {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
            relaunch_delay: RELAUNCH_DELAY,
        }
    }

    /// Supervise the running binary with its own arguments
    pub fn for_current_exe() -> Result<Self> {
        let program = std::env::current_exe()?;
        let args = std::env::args_os()
            .skip(1)
            .filter(|arg| arg != "--worker")
            .collect();
        Ok(Self::new(program, args))
    }

    pub fn with_relaunch_delay(mut self, delay: Duration) -> Self {
        self.relaunch_delay = delay;
        self
    }

    /// Relaunch workers until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        loop {
            let exit = tokio::select! {
                exit = self.run_worker_once() => exit,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down supervisor");
                    return Ok(());
                }
            };

            match exit {
                Ok(WorkerExit::RestartRequested { pid }) => {
                    info!("Worker {} killed for restart", pid)
                }
                Ok(WorkerExit::Exited(code)) => warn!("Worker exited with {:?}", code),
                Err(e) => error!("Worker failed: {}", e),
            }

            info!("Relaunching worker in {:?}", self.relaunch_delay);
            tokio::select! {
                _ = tokio::time::sleep(self.relaunch_delay) => {}
                _ = tokio::signal::ctrl_c() => return Ok(()),
            }
        }
    }

    /// Start one worker and wait until it asks for a restart or exits
    pub async fn run_worker_once(&self) -> Result<WorkerExit> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--worker")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        info!("Worker started (pid {:?})", child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Internal("Worker stdout not captured".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        while let Some(line) = lines.next_line().await? {
            match parse_restart_line(&line) {
                Some(pid) => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill worker {}: {}", pid, e);
                    }
                    return Ok(WorkerExit::RestartRequested { pid });
                }
                None => debug!("worker: {}", line),
            }
        }

        let status = child.wait().await?;
        Ok(WorkerExit::Exited(status.code()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> ProcessSupervisor {
        ProcessSupervisor::new("sh", vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn test_restart_line_kills_worker() {
        let supervisor = shell("echo starting; echo 'RESTART 42'; sleep 30");

        let exit = tokio::time::timeout(Duration::from_secs(10), supervisor.run_worker_once())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(exit, WorkerExit::RestartRequested { pid: 42 });
    }

    #[tokio::test]
    async fn test_worker_exit_reported() {
        let exit = shell("echo bye; exit 3").run_worker_once().await.unwrap();
        assert_eq!(exit, WorkerExit::Exited(Some(3)));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let supervisor = ProcessSupervisor::new("/nonexistent/drone-teleop", Vec::new());
        assert!(supervisor.run_worker_once().await.is_err());
    }
}
