//! Relay wire messages
//!
//! Every frame is a JSON object tagged by `messageType`.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::webrtc::{IceServerInfo, PeerConnectionId, SessionDescription};

/// Relay → worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "camelCase")]
pub enum RelayMessage {
    IceServerInfo {
        #[serde(rename = "iceServerInfo", default)]
        ice_server_info: Option<IceServerInfo>,
    },
    CanOffer {
        #[serde(rename = "peerConnectionId")]
        peer_connection_id: PeerConnectionId,
    },
    Offer {
        offer: SessionDescription,
    },
}

/// Worker → relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "camelCase")]
pub enum ClientMessage {
    CanOffer {
        #[serde(rename = "canOffer")]
        can_offer: bool,
    },
    Answer {
        answer: SessionDescription,
    },
}

/// Body of the relay's `generateKey` response and of `/startApp`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartKey {
    #[serde(rename = "startKey")]
    pub start_key: String,
}

pub fn parse_relay_message(text: &str) -> Result<RelayMessage> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_can_offer_numeric_id() {
        let msg = parse_relay_message(r#"{"messageType":"canOffer","peerConnectionId":42}"#).unwrap();
        assert_eq!(
            msg,
            RelayMessage::CanOffer {
                peer_connection_id: PeerConnectionId::new("42")
            }
        );
    }

    #[test]
    fn test_parse_offer() {
        let msg = parse_relay_message(
            r#"{"messageType":"offer","offer":{"sdp":"v=0","type":"offer"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            RelayMessage::Offer {
                offer: SessionDescription::offer("v=0")
            }
        );
    }

    #[test]
    fn test_parse_ice_server_info() {
        let msg = parse_relay_message(
            r#"{"messageType":"iceServerInfo","iceServerInfo":{"stun":"stun:a","turn":"turn:b",
                "credentials":{"username":"u","password":"p"}}}"#,
        )
        .unwrap();
        let RelayMessage::IceServerInfo {
            ice_server_info: Some(info),
        } = msg
        else {
            panic!("unexpected message");
        };
        assert_eq!(info.turn, "turn:b");

        let empty = parse_relay_message(r#"{"messageType":"iceServerInfo"}"#).unwrap();
        assert_eq!(empty, RelayMessage::IceServerInfo { ice_server_info: None });
    }

    #[test]
    fn test_unknown_or_malformed() {
        assert!(parse_relay_message(r#"{"messageType":"candidate"}"#).is_err());
        assert!(parse_relay_message(r#"{"peerConnectionId":1}"#).is_err());
        assert!(parse_relay_message("not json").is_err());
    }

    #[test]
    fn test_client_message_json() {
        let json = serde_json::to_value(ClientMessage::CanOffer { can_offer: true }).unwrap();
        assert_eq!(json, serde_json::json!({"messageType":"canOffer","canOffer":true}));

        let answer = ClientMessage::Answer {
            answer: SessionDescription {
                sdp: "v=0".to_string(),
                kind: "answer".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(answer).unwrap(),
            serde_json::json!({"messageType":"answer","answer":{"sdp":"v=0","type":"answer"}})
        );
    }
}
