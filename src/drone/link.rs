//! UDP command link to the vehicle
//!
//! Commands are plain ASCII datagrams. Nothing is acknowledged or retried:
//! a late movement command is worse than a lost one.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::status::DroneStatus;
use super::throttle::CommandSink;
use crate::error::{AppError, Result};
use crate::utils::bind_udp_socket;

/// Handshake command that puts the Tello into SDK mode
pub const HANDSHAKE_COMMAND: &str = "command";
/// Enables the vehicle's H.264 stream
pub const STREAM_ON_COMMAND: &str = "streamon";

/// Default keep-alive period
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
/// Largest status datagram we expect
const STATUS_PACKET_SIZE: usize = 1600;

/// Vehicle link configuration
#[derive(Debug, Clone)]
pub struct DroneConfig {
    /// Send datagrams to the vehicle (false = log only)
    pub enabled: bool,
    /// Vehicle command address
    pub vehicle_addr: SocketAddr,
    /// Local address for inbound status packets
    pub telemetry_addr: SocketAddr,
    /// Handshake re-send period
    pub keepalive_interval: Duration,
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            vehicle_addr: SocketAddr::from(([192, 168, 10, 1], 8889)),
            telemetry_addr: SocketAddr::from(([0, 0, 0, 0], 8890)),
            keepalive_interval: KEEPALIVE_INTERVAL,
        }
    }
}

pub struct DroneLink {
    config: DroneConfig,
    socket: OnceLock<Arc<UdpSocket>>,
    started: AtomicBool,
    /// Latest raw status line, overwritten on every packet
    latest_status: Arc<Mutex<Option<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DroneLink {
    pub fn new(config: DroneConfig) -> Self {
        Self {
            config,
            socket: OnceLock::new(),
            started: AtomicBool::new(false),
            latest_status: Arc::new(Mutex::new(None)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Open the link, send the handshake and start the background tasks
    ///
    /// Only the first call does anything. Must run inside a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Drone link starting (vehicle {})", self.config.vehicle_addr);

        if self.config.enabled {
            let local = match self.config.vehicle_addr {
                SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
                SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
            };
            let socket = bind_udp_socket(local)
                .and_then(UdpSocket::from_std)
                .map_err(|e| AppError::Drone(format!("Failed to open command socket: {}", e)))?;
            let _ = self.socket.set(Arc::new(socket));
        }

        self.send(HANDSHAKE_COMMAND);

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(keepalive_loop(
            Arc::downgrade(self),
            self.config.keepalive_interval,
        )));

        if self.config.enabled {
            match bind_udp_socket(self.config.telemetry_addr).and_then(UdpSocket::from_std) {
                Ok(socket) => {
                    tasks.push(tokio::spawn(telemetry_loop(
                        socket,
                        self.latest_status.clone(),
                    )));
                }
                Err(e) => warn!(
                    "Failed to listen for drone status on {}: {}",
                    self.config.telemetry_addr, e
                ),
            }
        }

        Ok(())
    }

    /// Ask the vehicle to start its video stream
    pub fn stream_on(&self) {
        self.send(STREAM_ON_COMMAND);
        info!("streamon");
    }

    /// Fire-and-forget one instruction
    pub fn send(&self, instruction: &str) {
        if !self.config.enabled {
            info!("Send command [{}] (vehicle link disabled)", instruction);
            return;
        }

        let Some(socket) = self.socket.get() else {
            warn!("Drone link not started, dropping command [{}]", instruction);
            return;
        };

        info!("Send command [{}]", instruction);
        if let Err(e) = socket.try_send_to(instruction.as_bytes(), self.config.vehicle_addr) {
            warn!("Failed to send command [{}]: {}", instruction, e);
        }
    }

    /// Most recent status received from the vehicle
    pub fn latest_status(&self) -> Option<DroneStatus> {
        self.latest_status.lock().as_deref().map(DroneStatus::parse)
    }

    fn log_status(&self) {
        if let Some(battery) = self.latest_status().as_ref().and_then(DroneStatus::battery) {
            info!("Battery level {}%", battery);
        }
    }
}

impl CommandSink for DroneLink {
    fn send(&self, instruction: &str) {
        DroneLink::send(self, instruction);
    }
}

impl Drop for DroneLink {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn keepalive_loop(link: Weak<DroneLink>, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let Some(link) = link.upgrade() else {
            break;
        };
        link.send(HANDSHAKE_COMMAND);
        link.log_status();
    }
}

async fn telemetry_loop(socket: UdpSocket, latest: Arc<Mutex<Option<String>>>) {
    let mut buf = vec![0u8; STATUS_PACKET_SIZE];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                let message = String::from_utf8_lossy(&buf[..len]).trim().to_string();
                debug!("Drone status from {}: {}", from, message);
                *latest.lock() = Some(message);
            }
            Err(e) => {
                warn!("Drone status receive failed: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
