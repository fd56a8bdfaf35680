//! Video frame data structures

use bytes::Bytes;
use std::time::Instant;

use super::format::Resolution;

/// Presentation timestamps run on the RTP video clock
pub const PTS_CLOCK_RATE: u32 = 90_000;

/// Mid-grey 640x480 picture: SPS, PPS and one IDR slice of DC-predicted
/// macroblocks with no residual (Constrained Baseline, level 3.0)
static PLACEHOLDER_IDR: &[u8] = include_bytes!("placeholder_640x480.h264");

/// Sequence number reserved for the placeholder; captures start at 1
pub const PLACEHOLDER_SEQUENCE: u64 = 0;

/// One H.264 access unit in Annex-B form, with capture metadata
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Access unit bytes, start codes included (cheap clone)
    data: Bytes,
    /// Frame resolution
    pub resolution: Resolution,
    /// Capture sequence number
    pub sequence: u64,
    /// Timestamp when frame was captured
    pub capture_ts: Instant,
    /// Presentation timestamp in [`PTS_CLOCK_RATE`] ticks, set by the consumer
    pub pts: u64,
}

impl VideoFrame {
    /// Wrap one captured access unit
    ///
    /// # Arguments
    ///
    /// * `data` - Annex-B access unit
    /// * `resolution` - Picture size announced by the source
    /// * `sequence` - Capture counter, starting at 1
    pub fn h264(data: Bytes, resolution: Resolution, sequence: u64) -> Self {
        Self {
            data,
            resolution,
            sequence,
            capture_ts: Instant::now(),
            pts: 0,
        }
    }

    /// Self-contained blank keyframe sent before any capture succeeded
    pub fn placeholder() -> Self {
        Self::h264(
            Bytes::from_static(PLACEHOLDER_IDR),
            Resolution::VGA,
            PLACEHOLDER_SEQUENCE,
        )
    }

    pub fn is_placeholder(&self) -> bool {
        self.sequence == PLACEHOLDER_SEQUENCE
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get frame data as Bytes (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Copy of this frame carrying a new presentation timestamp
    pub fn with_pts(&self, pts: u64) -> Self {
        Self {
            pts,
            ..self.clone()
        }
    }
}
