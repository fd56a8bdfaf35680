use std::sync::Arc;

use crate::config::AppConfig;
use crate::drone::DroneLink;
use crate::events::ClientNotifier;
use crate::signaling::SignalingClient;
use crate::supervisor::RestartSignal;
use crate::video::capture_factory;
use crate::webrtc::{
    PeerConnector, RtcPeerConnector, SessionDeps, SessionLifecycleManager, VideoTrackConfig,
};

/// Worker-wide context shared by every handler and background task
///
/// Built once per worker process. Nothing in here is ever reset; a stale
/// worker is replaced as a whole by the supervisor.
pub struct AppState {
    pub config: AppConfig,
    /// Vehicle command link
    pub drone: Arc<DroneLink>,
    /// The single peer session
    pub sessions: Arc<SessionLifecycleManager>,
    /// Browser `/state` channel
    pub notifier: Arc<ClientNotifier>,
    /// Restart request towards the supervisor
    pub restart: Arc<RestartSignal>,
    /// Signaling relay client
    pub signaling: SignalingClient,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        Self::with_connector(config, Arc::new(RtcPeerConnector))
    }

    /// Build the state around a specific WebRTC engine
    pub fn with_connector(config: AppConfig, connector: Arc<dyn PeerConnector>) -> Arc<Self> {
        let drone = Arc::new(DroneLink::new(config.drone()));
        let notifier = Arc::new(ClientNotifier::new());
        let restart = Arc::new(RestartSignal::new());

        let sessions = Arc::new(SessionLifecycleManager::new(SessionDeps {
            connector,
            capture: capture_factory(config.capture()),
            drone: drone.clone(),
            notifier: notifier.clone(),
            restart: restart.clone(),
            default_stun: config.default_stun(),
            track: VideoTrackConfig {
                fps: config.video_fps,
                ..Default::default()
            },
        }));

        let signaling = SignalingClient::new(
            config.signaling_endpoint.clone(),
            config.secret.clone(),
            sessions.clone(),
        );

        Arc::new(Self {
            config,
            drone,
            sessions,
            notifier,
            restart,
            signaling,
        })
    }
}
