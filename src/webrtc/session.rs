//! The single peer session of this worker
//!
//! At most one session is ever created per process. It is never torn down
//! or reset in place: when the relay brings an offer for a different peer,
//! or the current peer is gone, the manager raises a restart request and
//! the supervisor relaunches the worker.

use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use super::config::{ice_servers, IceServerInfo};
use super::peer::{PeerConnector, PeerHooks, PeerSetup, PeerTransport, SessionDescription};
use super::track::VideoTrackConfig;
use crate::drone::{CommandThrottler, DroneLink};
use crate::error::{AppError, Result};
use crate::events::{ClientEvent, ClientNotifier, DataChannelEvent, UiState};
use crate::supervisor::RestartSignal;
use crate::video::{CaptureFactory, FrameBuffer, VideoFrameSource};

/// Lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Absent,
    Negotiating,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl SessionState {
    /// The peer is gone (or going) and will not come back
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Disconnected | SessionState::Failed | SessionState::Closed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Absent => "absent",
            SessionState::Negotiating => "negotiating",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

impl From<RTCPeerConnectionState> for SessionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connected => SessionState::Connected,
            RTCPeerConnectionState::Disconnected => SessionState::Disconnected,
            RTCPeerConnectionState::Failed => SessionState::Failed,
            RTCPeerConnectionState::Closed => SessionState::Closed,
            _ => SessionState::Negotiating,
        }
    }
}

/// Identifier the relay gives the remote peer
///
/// Sent as a JSON number by the relay; strings are accepted too. Compared
/// by its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PeerConnectionId(String);

impl PeerConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PeerConnectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(serde_json::Number),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self(n.to_string()),
            Raw::Text(s) => Self(s),
        })
    }
}

/// Answer to a `canOffer` query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferDecision {
    pub can_offer: bool,
    /// A restart was requested while deciding
    pub restart: bool,
}

/// Inbound data channel payload
#[derive(Debug, Deserialize)]
struct OperatorMessage {
    command: String,
}

struct SessionRecord {
    id: Option<PeerConnectionId>,
    transport: Option<Arc<dyn PeerTransport>>,
}

/// Collaborators of the session manager
pub struct SessionDeps {
    pub connector: Arc<dyn PeerConnector>,
    pub capture: CaptureFactory,
    pub drone: Arc<DroneLink>,
    pub notifier: Arc<ClientNotifier>,
    pub restart: Arc<RestartSignal>,
    pub default_stun: Option<String>,
    pub track: VideoTrackConfig,
}

pub struct SessionLifecycleManager {
    deps: SessionDeps,
    throttler: Arc<CommandThrottler>,
    /// Relay-provided ICE servers for the next session
    ice_config: Mutex<Option<IceServerInfo>>,
    /// Id admitted by the last `canOffer`, claimed by the next offer
    candidate_id: Mutex<Option<PeerConnectionId>>,
    session: Mutex<Option<SessionRecord>>,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionLifecycleManager {
    pub fn new(deps: SessionDeps) -> Self {
        let throttler = Arc::new(CommandThrottler::new(deps.drone.clone()));
        let (state_tx, _) = watch::channel(SessionState::Absent);

        Self {
            deps,
            throttler,
            ice_config: Mutex::new(None),
            candidate_id: Mutex::new(None),
            session: Mutex::new(None),
            state: Arc::new(state_tx),
        }
    }

    /// Store ICE servers for the next session creation
    pub fn set_ice_config(&self, info: IceServerInfo) {
        info!("ICE server info received (turn: {})", !info.turn.is_empty());
        *self.ice_config.lock() = Some(info);
    }

    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn session_id(&self) -> Option<PeerConnectionId> {
        self.session.lock().as_ref().and_then(|s| s.id.clone())
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn should_close(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether an offer from `candidate` means this worker is stale
    pub fn should_restart(&self, candidate: &PeerConnectionId) -> bool {
        let session = self.session.lock();
        match session.as_ref() {
            None => false,
            Some(record) => record.id.as_ref() != Some(candidate) || self.should_close(),
        }
    }

    /// Decide a `canOffer` query, requesting a restart when stale
    pub fn admit_offer(&self, candidate: PeerConnectionId) -> OfferDecision {
        if self.should_restart(&candidate) {
            warn!(
                "Offer from peer {} while session {:?} is {}, restarting",
                candidate,
                self.session_id(),
                self.state()
            );
            self.deps.restart.request("stale peer session");
            // The relay retries against the relaunched worker
            return OfferDecision {
                can_offer: true,
                restart: true,
            };
        }

        if self.has_session() {
            return OfferDecision {
                can_offer: false,
                restart: false,
            };
        }

        *self.candidate_id.lock() = Some(candidate);
        OfferDecision {
            can_offer: true,
            restart: false,
        }
    }

    /// Create the session for `offer` and return the local answer
    pub async fn negotiate(&self, offer: SessionDescription) -> Result<SessionDescription> {
        {
            let mut session = self.session.lock();
            if session.is_some() {
                return Err(AppError::SessionExists);
            }
            *session = Some(SessionRecord {
                id: self.candidate_id.lock().take(),
                transport: None,
            });
        }
        self.publish_state(SessionState::Negotiating);
        info!("Negotiating session {:?}", self.session_id());

        match self.create_session(offer).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                // Stays in place; the next offer sees a failed session and restarts
                self.publish_state(SessionState::Failed);
                Err(e)
            }
        }
    }

    async fn create_session(&self, offer: SessionDescription) -> Result<SessionDescription> {
        self.deps.drone.start()?;
        self.deps.drone.stream_on();

        let video = match (self.deps.capture)().and_then(VideoFrameSource::spawn) {
            Ok(video) => video,
            Err(e) => {
                warn!("Video capture unavailable, sending placeholder: {}", e);
                VideoFrameSource::from_buffer(Arc::new(FrameBuffer::new()))
            }
        };

        let ice_servers = ice_servers(
            self.ice_config.lock().as_ref(),
            self.deps.default_stun.as_deref(),
        );

        let transport = self
            .deps
            .connector
            .connect(PeerSetup {
                ice_servers,
                hooks: self.hooks(),
                video,
                track: self.deps.track.clone(),
            })
            .await?;

        if let Some(record) = self.session.lock().as_mut() {
            record.transport = Some(transport.clone());
        }

        transport.answer(offer).await
    }

    fn hooks(&self) -> PeerHooks {
        let state = self.state.clone();
        let notifier = self.deps.notifier.clone();
        let throttler = self.throttler.clone();

        PeerHooks {
            on_state_change: Arc::new(move |new_state: SessionState| {
                info!("Peer connection state: {}", new_state);
                state.send_replace(new_state);
                if new_state == SessionState::Connected {
                    notifier.notify(ClientEvent::state_change(UiState::Land));
                } else if new_state.is_terminal() {
                    notifier.notify(ClientEvent::state_change(UiState::Ready));
                }
            }),
            on_message: Arc::new(move |text: String| {
                match serde_json::from_str::<OperatorMessage>(&text) {
                    Ok(msg) => {
                        throttler.submit(&msg.command);
                    }
                    Err(e) => warn!("Dropping malformed operator message {:?}: {}", text, e),
                }
            }),
        }
    }

    fn publish_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    /// Tell the browser about a takeoff/land over the data channel
    pub async fn notify_data_channel(&self, event: DataChannelEvent) -> Result<bool> {
        let transport = self
            .session
            .lock()
            .as_ref()
            .and_then(|s| s.transport.clone());

        let Some(transport) = transport else {
            return Ok(false);
        };
        transport.send_text(serde_json::to_string(&event)?).await
    }

    pub fn drone(&self) -> &Arc<DroneLink> {
        &self.deps.drone
    }
}
