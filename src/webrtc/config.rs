//! ICE server configuration handed over by the signaling relay

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;

/// TURN credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IceCredentials {
    pub username: String,
    pub password: String,
}

/// `iceServerInfo` payload: one STUN and one TURN server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IceServerInfo {
    pub stun: String,
    pub turn: String,
    pub credentials: IceCredentials,
}

impl IceServerInfo {
    /// Engine ICE servers; empty URLs are left out
    pub fn to_rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        let mut servers = Vec::new();

        if !self.stun.is_empty() {
            servers.push(RTCIceServer {
                urls: vec![self.stun.clone()],
                ..Default::default()
            });
        }

        if !self.turn.is_empty() {
            servers.push(RTCIceServer {
                urls: vec![self.turn.clone()],
                username: self.credentials.username.clone(),
                credential: self.credentials.password.clone(),
                ..Default::default()
            });
        }

        servers
    }
}

/// ICE servers for a new session
///
/// Relay-provided info wins; without it only the default STUN server is
/// used.
pub fn ice_servers(info: Option<&IceServerInfo>, default_stun: Option<&str>) -> Vec<RTCIceServer> {
    match info {
        Some(info) => info.to_rtc_ice_servers(),
        None => default_stun
            .map(|url| {
                vec![RTCIceServer {
                    urls: vec![url.to_string()],
                    ..Default::default()
                }]
            })
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relay_payload() {
        let info: IceServerInfo = serde_json::from_str(
            r#"{"stun":"stun:s.example:3478","turn":"turn:t.example:3478",
                "credentials":{"username":"u","password":"p"}}"#,
        )
        .unwrap();

        let servers = info.to_rtc_ice_servers();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls, vec!["stun:s.example:3478"]);
        assert_eq!(servers[1].username, "u");
        assert_eq!(servers[1].credential, "p");
    }

    #[test]
    fn test_missing_fields_skipped() {
        let info: IceServerInfo = serde_json::from_str(r#"{"stun":"stun:only"}"#).unwrap();
        assert_eq!(info.to_rtc_ice_servers().len(), 1);
    }

    #[test]
    fn test_default_stun_without_relay_info() {
        let servers = ice_servers(None, Some("stun:default"));
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec!["stun:default"]);
        assert!(servers[0].username.is_empty());

        assert!(ice_servers(None, None).is_empty());
    }
}
