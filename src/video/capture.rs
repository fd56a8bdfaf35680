//! Capture sources feeding the frame buffer
//!
//! A source is pulled from a dedicated OS thread; `read` may block (socket
//! timeout, pacing sleep) and returns `None` when no frame could be
//! captured this time.

use bytes::Bytes;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::format::Resolution;
use super::frame::VideoFrame;
use super::h264::{read_access_units, AccessUnitAssembler};
use crate::error::{AppError, Result};
use crate::utils::{bind_blocking_udp_socket, LogThrottler};
use crate::warn_throttled;

/// Largest datagram the vehicle sends
const MAX_PACKET_SIZE: usize = 1600;
/// Socket receive buffer requested for the video stream
const RECV_BUFFER_SIZE: usize = 1 << 20;

/// Pull-style frame producer
pub trait CaptureSource: Send {
    /// Block until the next frame or a failed attempt
    fn read(&mut self) -> Option<VideoFrame>;

    /// Short label for logs
    fn name(&self) -> &str;
}

/// Which capture source a session opens
#[derive(Debug, Clone)]
pub enum CaptureConfig {
    /// Vehicle H.264 stream over UDP
    Udp {
        bind_addr: SocketAddr,
        read_timeout: Duration,
        resolution: Resolution,
    },
    /// Recorded Annex-B file, looped
    File {
        path: PathBuf,
        fps: u32,
        resolution: Resolution,
    },
}

/// Opens a fresh capture source for each session
pub type CaptureFactory = Arc<dyn Fn() -> Result<Box<dyn CaptureSource>> + Send + Sync>;

/// Open the source described by `config`
pub fn open_capture(config: &CaptureConfig) -> Result<Box<dyn CaptureSource>> {
    match config {
        CaptureConfig::Udp {
            bind_addr,
            read_timeout,
            resolution,
        } => Ok(Box::new(UdpH264Capture::bind(
            *bind_addr,
            *read_timeout,
            *resolution,
        )?)),
        CaptureConfig::File {
            path,
            fps,
            resolution,
        } => Ok(Box::new(FileH264Capture::open(path, *fps, *resolution))),
    }
}

/// Factory that opens `config` on every call
pub fn capture_factory(config: CaptureConfig) -> CaptureFactory {
    Arc::new(move || open_capture(&config))
}

/// Receives the vehicle's H.264 datagrams and groups them into access units
pub struct UdpH264Capture {
    socket: UdpSocket,
    assembler: AccessUnitAssembler,
    resolution: Resolution,
    sequence: u64,
    packet: Vec<u8>,
    log_throttler: LogThrottler,
}

impl UdpH264Capture {
    pub fn bind(addr: SocketAddr, read_timeout: Duration, resolution: Resolution) -> Result<Self> {
        let socket = bind_blocking_udp_socket(addr, read_timeout, RECV_BUFFER_SIZE)
            .map_err(|e| AppError::Video(format!("Failed to bind video socket {}: {}", addr, e)))?;

        info!("Receiving drone video on {}", addr);

        Ok(Self {
            socket,
            assembler: AccessUnitAssembler::new(),
            resolution,
            sequence: 0,
            packet: vec![0u8; MAX_PACKET_SIZE],
            log_throttler: LogThrottler::with_secs(5),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl CaptureSource for UdpH264Capture {
    fn read(&mut self) -> Option<VideoFrame> {
        loop {
            let len = match self.socket.recv_from(&mut self.packet) {
                Ok((len, _)) => len,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    warn_throttled!(self.log_throttler, "video_timeout", "No video from drone");
                    return None;
                }
                Err(e) => {
                    warn_throttled!(self.log_throttler, "video_recv", "Video receive failed: {}", e);
                    std::thread::sleep(Duration::from_millis(100));
                    return None;
                }
            };

            if let Some(unit) = self.assembler.push(&self.packet[..len]) {
                self.log_throttler.clear("video_timeout");
                self.sequence += 1;
                return Some(VideoFrame::h264(unit, self.resolution, self.sequence));
            }
        }
    }

    fn name(&self) -> &str {
        "drone-udp"
    }
}

/// Plays a recorded Annex-B file at a fixed rate, looping forever
pub struct FileH264Capture {
    units: Vec<Bytes>,
    next: usize,
    resolution: Resolution,
    interval: Duration,
    deadline: Instant,
    sequence: u64,
}

impl FileH264Capture {
    /// Load `path`; an unreadable file gives a source that only fails
    pub fn open(path: &Path, fps: u32, resolution: Resolution) -> Self {
        let units = match std::fs::File::open(path) {
            Ok(file) => {
                let units = read_access_units(io::BufReader::new(file));
                info!(
                    "Loaded {} access units from {}",
                    units.len(),
                    path.display()
                );
                units
            }
            Err(e) => {
                warn!("Cannot read video file {}: {}", path.display(), e);
                Vec::new()
            }
        };

        Self::from_units(units, fps, resolution)
    }

    pub fn from_units(units: Vec<Bytes>, fps: u32, resolution: Resolution) -> Self {
        let interval = Duration::from_secs(1) / fps.max(1);
        Self {
            units,
            next: 0,
            resolution,
            interval,
            deadline: Instant::now(),
            sequence: 0,
        }
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    fn pace(&mut self) {
        let now = Instant::now();
        if self.deadline > now {
            std::thread::sleep(self.deadline - now);
            self.deadline += self.interval;
        } else {
            // Fell behind, restart the schedule from here
            self.deadline = now + self.interval;
        }
    }
}

impl CaptureSource for FileH264Capture {
    fn read(&mut self) -> Option<VideoFrame> {
        self.pace();

        let unit = self.units.get(self.next)?.clone();
        self.next = (self.next + 1) % self.units.len();
        if self.next == 0 {
            debug!("Video file looped");
        }

        self.sequence += 1;
        Some(VideoFrame::h264(unit, self.resolution, self.sequence))
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::h264::START_CODE;
    use std::io::Write;

    fn nal(kind: u8, payload: u8) -> Vec<u8> {
        let mut v = START_CODE.to_vec();
        v.extend([kind, payload]);
        v
    }

    #[test]
    fn test_file_source_loops() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for (kind, payload) in [(0x67, 1), (0x68, 2), (0x65, 3), (0x41, 4)] {
            file.write_all(&nal(kind, payload)).unwrap();
        }
        file.flush().unwrap();

        let mut source = FileH264Capture::open(file.path(), 1000, Resolution::VGA);
        assert_eq!(source.unit_count(), 2);

        let first = source.read().unwrap();
        let second = source.read().unwrap();
        let third = source.read().unwrap();

        assert_eq!(second.data(), nal(0x41, 4).as_slice());
        assert_eq!(third.data(), first.data());
        assert_eq!(third.sequence, 3);
    }

    #[test]
    fn test_file_source_accepts_short_start_codes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&nal(0x67, 1)).unwrap();
        for (kind, payload) in [(0x68, 2), (0x65, 3), (0x41, 4), (0x41, 5)] {
            file.write_all(&[0, 0, 1, kind, payload]).unwrap();
        }
        file.flush().unwrap();

        let mut source = FileH264Capture::open(file.path(), 1000, Resolution::VGA);
        assert_eq!(source.unit_count(), 3);

        let keyframe = source.read().unwrap();
        let mut expected = nal(0x67, 1);
        expected.extend(nal(0x68, 2));
        expected.extend(nal(0x65, 3));
        assert_eq!(keyframe.data(), expected.as_slice());
        assert_eq!(source.read().unwrap().data(), nal(0x41, 4).as_slice());
    }

    #[test]
    fn test_missing_file_fails_every_read() {
        let mut source = FileH264Capture::open(Path::new("/nonexistent/capture.h264"), 1000, Resolution::VGA);

        assert_eq!(source.unit_count(), 0);
        assert!(source.read().is_none());
        assert!(source.read().is_none());
    }

    #[test]
    fn test_file_source_is_paced() {
        let units = vec![Bytes::from(nal(0x41, 1))];
        let mut source = FileH264Capture::from_units(units, 50, Resolution::VGA);

        let start = Instant::now();
        for _ in 0..4 {
            source.read().unwrap();
        }
        // First read is immediate, the next three wait 20ms each
        assert!(start.elapsed() >= Duration::from_millis(55));
    }

    #[test]
    fn test_udp_source_groups_datagrams() {
        let mut capture = UdpH264Capture::bind(
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_millis(200),
            Resolution::new(960, 720),
        )
        .unwrap();
        let target = capture.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        for packet in [nal(0x67, 1), nal(0x65, 2), vec![7, 7], nal(0x41, 3)] {
            sender.send_to(&packet, target).unwrap();
        }

        let frame = capture.read().unwrap();
        let mut expected = nal(0x67, 1);
        expected.extend(nal(0x65, 2));
        expected.extend([7, 7]);
        assert_eq!(frame.data(), expected.as_slice());
        assert_eq!(frame.resolution, Resolution::new(960, 720));

        // The trailing slice stays buffered until the next boundary
        assert!(capture.read().is_none());
    }
}
