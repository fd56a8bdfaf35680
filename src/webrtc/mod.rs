//! Peer session management on top of webrtc-rs

pub mod config;
pub mod peer;
pub mod session;
pub mod track;

pub use config::{IceCredentials, IceServerInfo};
pub use peer::{
    PeerConnector, PeerHooks, PeerSetup, PeerTransport, RtcPeerConnector, SessionDescription,
};
pub use session::{
    OfferDecision, PeerConnectionId, SessionDeps, SessionLifecycleManager, SessionState,
};
pub use track::{SampleSink, VideoTrackConfig, VideoTrackPump};
