//! Seam between the session manager and the WebRTC engine

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;

use super::session::SessionState;
use super::track::{VideoTrackConfig, VideoTrackPump};
use crate::error::{AppError, Result};
use crate::video::VideoFrameSource;

/// SDP plus its type, as exchanged with the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: "offer".to_string(),
        }
    }
}

pub type StateObserver = Arc<dyn Fn(SessionState) + Send + Sync>;
pub type MessageObserver = Arc<dyn Fn(String) + Send + Sync>;

/// Observers installed on the transport when it is built
#[derive(Clone)]
pub struct PeerHooks {
    pub on_state_change: StateObserver,
    pub on_message: MessageObserver,
}

/// Everything needed to build one transport
pub struct PeerSetup {
    pub ice_servers: Vec<RTCIceServer>,
    pub hooks: PeerHooks,
    pub video: VideoFrameSource,
    pub track: VideoTrackConfig,
}

#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, setup: PeerSetup) -> Result<Arc<dyn PeerTransport>>;
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Apply the remote offer and return the local answer
    async fn answer(&self, offer: SessionDescription) -> Result<SessionDescription>;

    /// Send text on the data channel; `false` when no channel is open
    async fn send_text(&self, text: String) -> Result<bool>;
}

/// webrtc-rs backed connector
#[derive(Debug, Default, Clone, Copy)]
pub struct RtcPeerConnector;

#[async_trait]
impl PeerConnector for RtcPeerConnector {
    async fn connect(&self, setup: PeerSetup) -> Result<Arc<dyn PeerTransport>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::WebRtc(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| AppError::WebRtc(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: setup.ice_servers,
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            AppError::WebRtc(format!("Failed to create peer connection: {}", e))
        })?);

        let on_state_change = setup.hooks.on_state_change.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            on_state_change(SessionState::from(s));
            Box::pin(async {})
        }));

        let data_channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>> = Arc::new(Mutex::new(None));
        let channel_slot = data_channel.clone();
        let on_message = setup.hooks.on_message.clone();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            info!("Data channel opened: {}", dc.label());
            *channel_slot.lock() = Some(dc.clone());

            let on_message = on_message.clone();
            dc.on_message(Box::new(move |msg: DataChannelMessage| {
                if msg.is_string {
                    on_message(String::from_utf8_lossy(&msg.data).into_owned());
                } else {
                    warn!("Ignoring binary data channel message ({} bytes)", msg.data.len());
                }
                Box::pin(async {})
            }));
            Box::pin(async {})
        }));

        let pump = VideoTrackPump::new(setup.track);
        let sender = pc
            .add_track(pump.track() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| AppError::WebRtc(format!("Failed to add video track: {}", e)))?;

        // Drain RTCP so the interceptors keep running
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
            debug!("RTCP reader finished");
        });

        pump.start(setup.video);

        Ok(Arc::new(RtcPeer {
            pc,
            data_channel,
            _pump: pump,
        }))
    }
}

/// A live webrtc-rs peer connection
pub struct RtcPeer {
    pc: Arc<RTCPeerConnection>,
    data_channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    _pump: VideoTrackPump,
}

#[async_trait]
impl PeerTransport for RtcPeer {
    async fn answer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        let remote = match offer.kind.as_str() {
            "offer" => RTCSessionDescription::offer(offer.sdp)
                .map_err(|e| AppError::WebRtc(format!("Invalid SDP offer: {}", e)))?,
            other => {
                return Err(AppError::BadRequest(format!(
                    "Expected an SDP offer, got {:?}",
                    other
                )))
            }
        };

        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| AppError::WebRtc(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| AppError::WebRtc(format!("Failed to create answer: {}", e)))?;

        // The relay has no trickle ICE, so the answer must carry every candidate
        let mut gathering_complete = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| AppError::WebRtc(format!("Failed to set local description: {}", e)))?;
        let _ = gathering_complete.recv().await;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| AppError::WebRtc("No local description after gathering".to_string()))?;

        let kind = match local.sdp_type {
            RTCSdpType::Answer => "answer".to_string(),
            other => other.to_string(),
        };
        Ok(SessionDescription {
            sdp: local.sdp,
            kind,
        })
    }

    async fn send_text(&self, text: String) -> Result<bool> {
        let channel = self.data_channel.lock().clone();
        match channel {
            Some(dc) if dc.ready_state() == RTCDataChannelState::Open => {
                dc.send_text(text)
                    .await
                    .map_err(|e| AppError::WebRtc(format!("Data channel send failed: {}", e)))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory transport that records what the session manager does

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    pub(crate) struct FakeConnector {
        pub hooks: Mutex<Option<PeerHooks>>,
        pub ice_servers: Mutex<Vec<RTCIceServer>>,
        pub sent: Arc<Mutex<Vec<String>>>,
        pub channel_open: Arc<AtomicBool>,
        pub connects: Mutex<usize>,
    }

    impl FakeConnector {
        /// Simulate an engine state callback
        pub fn emit_state(&self, state: SessionState) {
            let hooks = self.hooks.lock().clone();
            if let Some(hooks) = hooks {
                (hooks.on_state_change)(state);
            }
        }

        /// Simulate an inbound data channel text message
        pub fn emit_message(&self, text: &str) {
            let hooks = self.hooks.lock().clone();
            if let Some(hooks) = hooks {
                (hooks.on_message)(text.to_string());
            }
        }
    }

    struct FakeTransport {
        sent: Arc<Mutex<Vec<String>>>,
        channel_open: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PeerConnector for FakeConnector {
        async fn connect(&self, setup: PeerSetup) -> Result<Arc<dyn PeerTransport>> {
            *self.hooks.lock() = Some(setup.hooks);
            *self.ice_servers.lock() = setup.ice_servers;
            *self.connects.lock() += 1;
            Ok(Arc::new(FakeTransport {
                sent: self.sent.clone(),
                channel_open: self.channel_open.clone(),
            }))
        }
    }

    #[async_trait]
    impl PeerTransport for FakeTransport {
        async fn answer(&self, offer: SessionDescription) -> Result<SessionDescription> {
            Ok(SessionDescription {
                sdp: format!("answer-to:{}", offer.sdp),
                kind: "answer".to_string(),
            })
        }

        async fn send_text(&self, text: String) -> Result<bool> {
            if !self.channel_open.load(Ordering::SeqCst) {
                return Ok(false);
            }
            self.sent.lock().push(text);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_description_json() {
        let desc: SessionDescription =
            serde_json::from_str(r#"{"sdp":"v=0\r\n","type":"offer"}"#).unwrap();
        assert_eq!(desc, SessionDescription::offer("v=0\r\n"));

        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["type"], "offer");
    }

    #[tokio::test]
    async fn test_rtc_peer_rejects_non_offer() {
        let hooks = PeerHooks {
            on_state_change: Arc::new(|_| {}),
            on_message: Arc::new(|_| {}),
        };
        let transport = RtcPeerConnector
            .connect(PeerSetup {
                ice_servers: Vec::new(),
                hooks,
                video: VideoFrameSource::from_buffer(Default::default()),
                track: VideoTrackConfig::default(),
            })
            .await
            .unwrap();

        let result = transport
            .answer(SessionDescription {
                sdp: String::new(),
                kind: "answer".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(!transport.send_text("{}".to_string()).await.unwrap());
    }
}
