//! Video: capture sources, the latest-frame buffer and outbound selection

pub mod buffer;
pub mod capture;
pub mod format;
pub mod frame;
pub mod h264;
pub mod source;

pub use buffer::FrameBuffer;
pub use capture::{
    capture_factory, open_capture, CaptureConfig, CaptureFactory, CaptureSource,
    FileH264Capture, UdpH264Capture,
};
pub use format::Resolution;
pub use frame::{VideoFrame, PTS_CLOCK_RATE};
pub use source::VideoFrameSource;
