//! Messages pushed to the browser

use serde::{Deserialize, Serialize};

/// What the control page should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiState {
    /// Session connected, offer the land button
    Land,
    /// No usable session, back to the start screen
    Ready,
}

/// Event sent over the `/state` socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "camelCase")]
pub enum ClientEvent {
    StateChange { state: UiState },
}

impl ClientEvent {
    pub fn state_change(state: UiState) -> Self {
        ClientEvent::StateChange { state }
    }
}

/// Event sent to the browser over the peer data channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "lowercase")]
pub enum DataChannelEvent {
    Takeoff,
    Land,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_json() {
        let json = serde_json::to_string(&ClientEvent::state_change(UiState::Land)).unwrap();
        assert_eq!(json, r#"{"messageType":"stateChange","state":"land"}"#);
    }

    #[test]
    fn test_data_channel_event_json() {
        assert_eq!(
            serde_json::to_string(&DataChannelEvent::Takeoff).unwrap(),
            r#"{"messageType":"takeoff"}"#
        );
        let land: DataChannelEvent = serde_json::from_str(r#"{"messageType":"land"}"#).unwrap();
        assert_eq!(land, DataChannelEvent::Land);
    }
}
