//! Outbound frame selection
//!
//! A capture thread keeps the [`FrameBuffer`] filled while the sender pulls
//! from it at its own pace. When the latest capture failed the sender gets
//! the last good frame again, and a blank keyframe before any capture ever
//! succeeded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{info, trace};

use super::buffer::FrameBuffer;
use super::capture::CaptureSource;
use super::frame::{VideoFrame, PTS_CLOCK_RATE};
use crate::error::{AppError, Result};

/// Presentation clock, seeded by the first `recv`
#[derive(Debug, Default)]
struct PtsClock {
    start: Option<Instant>,
    last: Option<u64>,
}

impl PtsClock {
    fn next(&mut self, now: Instant) -> u64 {
        let start = *self.start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(start);
        let ticks = (elapsed.as_micros() * PTS_CLOCK_RATE as u128 / 1_000_000) as u64;
        let pts = match self.last {
            Some(last) => ticks.max(last + 1),
            None => ticks,
        };
        self.last = Some(pts);
        pts
    }
}

/// Capture thread handle; dropping it asks the thread to stop
struct Producer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // The thread may sit in a blocking read; let it finish on its own
        drop(self.handle.take());
    }
}

pub struct VideoFrameSource {
    buffer: Arc<FrameBuffer>,
    placeholder: VideoFrame,
    clock: PtsClock,
    _producer: Option<Producer>,
}

impl VideoFrameSource {
    /// Start a capture thread pulling from `capture`
    pub fn spawn(mut capture: Box<dyn CaptureSource>) -> Result<Self> {
        let buffer = Arc::new(FrameBuffer::new());
        let stop = Arc::new(AtomicBool::new(false));

        let thread_buffer = buffer.clone();
        let thread_stop = stop.clone();
        let name = capture.name().to_string();
        let handle = std::thread::Builder::new()
            .name("video-capture".to_string())
            .spawn(move || {
                info!("Video capture started ({})", name);
                while !thread_stop.load(Ordering::Relaxed) {
                    thread_buffer.write(capture.read());
                }
                info!("Video capture stopped ({})", name);
            })
            .map_err(|e| AppError::Video(format!("Failed to start capture thread: {}", e)))?;

        Ok(Self {
            _producer: Some(Producer {
                stop,
                handle: Some(handle),
            }),
            ..Self::from_buffer(buffer)
        })
    }

    /// Serve frames from a buffer someone else fills
    pub fn from_buffer(buffer: Arc<FrameBuffer>) -> Self {
        Self {
            buffer,
            placeholder: VideoFrame::placeholder(),
            clock: PtsClock::default(),
            _producer: None,
        }
    }

    /// Frame to send now; never waits for the capture side
    pub fn recv(&mut self) -> VideoFrame {
        let frame = match self.buffer.read() {
            (true, Some(frame)) => frame,
            (false, Some(held)) => {
                trace!("Capture failed, holding frame {}", held.sequence);
                held
            }
            (_, None) => {
                trace!("No frame captured yet, sending placeholder");
                self.placeholder.clone()
            }
        };

        frame.with_pts(self.clock.next(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::Resolution;
    use bytes::Bytes;
    use std::time::Duration;

    fn frame(seq: u64) -> VideoFrame {
        VideoFrame::h264(Bytes::from(vec![0, 0, 0, 1, 0x41, seq as u8]), Resolution::VGA, seq)
    }

    fn source() -> (Arc<FrameBuffer>, VideoFrameSource) {
        let buffer = Arc::new(FrameBuffer::new());
        let source = VideoFrameSource::from_buffer(buffer.clone());
        (buffer, source)
    }

    #[test]
    fn test_placeholder_before_first_capture() {
        let (buffer, mut source) = source();
        buffer.write(None);

        let frame = source.recv();
        assert!(frame.is_placeholder());
        assert_eq!(frame.resolution, Resolution::VGA);
        assert_eq!(frame.data(), VideoFrame::placeholder().data());
    }

    #[test]
    fn test_latest_then_held() {
        let (buffer, mut source) = source();

        buffer.write(Some(frame(1)));
        buffer.write(Some(frame(2)));
        assert_eq!(source.recv().sequence, 2);

        buffer.write(None);
        assert_eq!(source.recv().sequence, 2);
        assert_eq!(source.recv().sequence, 2);

        buffer.write(Some(frame(3)));
        assert_eq!(source.recv().sequence, 3);
    }

    #[test]
    fn test_failures_before_first_recv_hold_last_good_frame() {
        let (buffer, mut source) = source();

        // Nobody read frame 7 before the capture started failing
        buffer.write(Some(frame(7)));
        for _ in 0..3 {
            buffer.write(None);
        }

        for _ in 0..3 {
            let frame = source.recv();
            assert_eq!(frame.sequence, 7);
            assert!(!frame.is_placeholder());
        }
    }

    #[test]
    fn test_pts_strictly_increasing() {
        let (buffer, mut source) = source();
        buffer.write(Some(frame(1)));

        let pts: Vec<u64> = (0..50).map(|_| source.recv().pts).collect();
        assert_eq!(pts[0], 0);
        assert!(pts.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_pts_follows_wall_clock() {
        let mut clock = PtsClock::default();
        let t0 = Instant::now();

        assert_eq!(clock.next(t0), 0);
        assert_eq!(clock.next(t0 + Duration::from_millis(100)), 9_000);
        // Same instant again still advances
        assert_eq!(clock.next(t0 + Duration::from_millis(100)), 9_001);
    }

    struct Scripted {
        next: u64,
    }

    impl CaptureSource for Scripted {
        fn read(&mut self) -> Option<VideoFrame> {
            std::thread::sleep(Duration::from_millis(2));
            self.next += 1;
            Some(frame(self.next))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_spawned_producer_fills_buffer() {
        let mut source = VideoFrameSource::spawn(Box::new(Scripted { next: 0 })).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut seen = 0;
        while Instant::now() < deadline {
            seen = source.recv().sequence;
            if seen > 3 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(seen > 3);
    }
}
