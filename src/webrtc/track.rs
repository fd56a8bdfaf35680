//! Outbound H.264 video track

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::error::{AppError, Result};
use crate::video::{VideoFrame, VideoFrameSource, PTS_CLOCK_RATE};

pub const H264_MIME_TYPE: &str = "video/H264";
const H264_FMTP: &str = "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f";
/// Repeat period of the placeholder keyframe
pub const PLACEHOLDER_REFRESH: Duration = Duration::from_secs(1);

/// Video track configuration
#[derive(Debug, Clone)]
pub struct VideoTrackConfig {
    pub track_id: String,
    pub stream_id: String,
    /// Pacing rate of the sender
    pub fps: u32,
}

impl Default for VideoTrackConfig {
    fn default() -> Self {
        Self {
            track_id: "video".to_string(),
            stream_id: "drone".to_string(),
            fps: 30,
        }
    }
}

impl VideoTrackConfig {
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

pub fn h264_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: H264_MIME_TYPE.to_string(),
        clock_rate: PTS_CLOCK_RATE,
        channels: 0,
        sdp_fmtp_line: H264_FMTP.to_string(),
        rtcp_feedback: vec![],
    }
}

/// Destination of encoded samples
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn write_sample(&self, sample: &Sample) -> Result<()>;
}

#[async_trait]
impl SampleSink for TrackLocalStaticSample {
    async fn write_sample(&self, sample: &Sample) -> Result<()> {
        TrackLocalStaticSample::write_sample(self, sample)
            .await
            .map_err(|e| AppError::WebRtc(format!("write_sample failed: {}", e)))
    }
}

/// Decides whether the frame picked on a tick is written
///
/// A captured access unit is written once; writing it again would hand the
/// decoder duplicate slices. The placeholder is a standalone keyframe and is
/// repeated every [`PLACEHOLDER_REFRESH`] so a browser that connects late
/// still gets a picture.
#[derive(Debug, Default)]
struct SampleGate {
    last_sequence: Option<u64>,
    last_write: Option<Instant>,
}

impl SampleGate {
    fn admit(&mut self, frame: &VideoFrame, now: Instant) -> bool {
        let fresh = self.last_sequence != Some(frame.sequence);
        let refresh = frame.is_placeholder()
            && self
                .last_write
                .map_or(true, |at| now.saturating_duration_since(at) >= PLACEHOLDER_REFRESH);

        if fresh || refresh {
            self.last_sequence = Some(frame.sequence);
            self.last_write = Some(now);
            true
        } else {
            false
        }
    }
}

/// Pulls a frame from the source on every tick and writes it to the track
pub struct VideoTrackPump {
    config: VideoTrackConfig,
    track: Arc<TrackLocalStaticSample>,
    running: Arc<watch::Sender<bool>>,
}

impl VideoTrackPump {
    pub fn new(config: VideoTrackConfig) -> Self {
        let track = Arc::new(TrackLocalStaticSample::new(
            h264_capability(),
            config.track_id.clone(),
            config.stream_id.clone(),
        ));
        let (running_tx, _) = watch::channel(false);

        Self {
            config,
            track,
            running: Arc::new(running_tx),
        }
    }

    pub fn track(&self) -> Arc<TrackLocalStaticSample> {
        self.track.clone()
    }

    /// Start the sender task; it owns `source` until stopped
    pub fn start(&self, source: VideoFrameSource) {
        let _ = self.running.send(true);
        let running_rx = self.running.subscribe();
        let sink: Arc<dyn SampleSink> = self.track.clone();

        info!("Starting video track sender at {} fps", self.config.fps);

        tokio::spawn(pump_frames(
            source,
            sink,
            self.config.frame_duration(),
            running_rx,
        ));
    }

    pub fn stop(&self) {
        let _ = self.running.send(false);
    }
}

impl Drop for VideoTrackPump {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn pump_frames(
    mut source: VideoFrameSource,
    sink: Arc<dyn SampleSink>,
    frame_duration: Duration,
    mut running_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(frame_duration);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut gate = SampleGate::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = source.recv();
                if !gate.admit(&frame, Instant::now()) {
                    continue;
                }

                trace!(
                    "Writing frame {} ({} bytes, age {:?})",
                    frame.sequence,
                    frame.data().len(),
                    frame.capture_ts.elapsed()
                );
                let sample = Sample {
                    data: frame.data_bytes(),
                    duration: frame_duration,
                    ..Default::default()
                };
                if let Err(e) = sink.write_sample(&sample).await {
                    debug!("{}", e);
                }
            }
            changed = running_rx.changed() => {
                if changed.is_err() || !*running_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!("Video track sender stopped");
}
