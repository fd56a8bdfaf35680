use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::drone::DroneConfig;
use crate::video::{CaptureConfig, Resolution};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// Resolution the Tello reports for its H.264 stream
const DRONE_VIDEO_RESOLUTION: Resolution = Resolution::new(960, 720);

/// Main application configuration
///
/// Every option can be given on the command line or through the
/// environment variable named next to it.
#[derive(Parser, Debug, Clone)]
#[command(name = "drone-teleop")]
#[command(version, about = "Tele-operate a camera drone from the browser over WebRTC", long_about = None)]
pub struct AppConfig {
    /// HTTP port
    #[arg(short = 'p', long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Listen address
    #[arg(short = 'a', long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    /// Bearer token used to obtain a start key from the signaling relay
    #[arg(long, env = "SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Base URL of the signaling relay (http(s)://host[:port])
    #[arg(long, env = "SIGNALING_ENDPOINT")]
    pub signaling_endpoint: Option<String>,

    /// Drive a real vehicle instead of the recorded-video fallback
    #[arg(long, env = "USE_DRONE", default_value_t = false, action = clap::ArgAction::Set)]
    pub use_drone: bool,

    /// Vehicle command address
    #[arg(long, env = "DRONE_ADDRESS", default_value = "192.168.10.1:8889")]
    pub drone_address: SocketAddr,

    /// Local address receiving vehicle status packets
    #[arg(long, env = "TELEMETRY_ADDRESS", default_value = "0.0.0.0:8890")]
    pub telemetry_address: SocketAddr,

    /// Local address receiving the vehicle's H.264 stream
    #[arg(long, env = "VIDEO_ADDRESS", default_value = "0.0.0.0:11111")]
    pub video_address: SocketAddr,

    /// Recorded H.264 (Annex-B) file played when no vehicle is used
    #[arg(long, env = "VIDEO_FILE", default_value = "resources/capture.h264")]
    pub video_file: PathBuf,

    /// Outbound video frame rate
    #[arg(long, env = "VIDEO_FPS", default_value_t = 30)]
    pub video_fps: u32,

    /// STUN server used when the relay did not provide ICE servers
    #[arg(long, env = "STUN_SERVER", default_value = "stun:stun.l.google.com:19302")]
    pub stun_server: String,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Run as the supervised worker process
    #[arg(long, hide = true)]
    pub worker: bool,
}

impl AppConfig {
    /// Address the HTTP server listens on
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Default STUN server, if one is configured
    pub fn default_stun(&self) -> Option<String> {
        let stun = self.stun_server.trim();
        (!stun.is_empty()).then(|| stun.to_string())
    }

    pub fn drone(&self) -> DroneConfig {
        DroneConfig {
            enabled: self.use_drone,
            vehicle_addr: self.drone_address,
            telemetry_addr: self.telemetry_address,
            ..Default::default()
        }
    }

    /// Capture source matching the vehicle toggle
    pub fn capture(&self) -> CaptureConfig {
        if self.use_drone {
            CaptureConfig::Udp {
                bind_addr: self.video_address,
                read_timeout: Duration::from_secs(1),
                resolution: DRONE_VIDEO_RESOLUTION,
            }
        } else {
            CaptureConfig::File {
                path: self.video_file.clone(),
                fps: self.video_fps,
                resolution: Resolution::VGA,
            }
        }
    }
}
