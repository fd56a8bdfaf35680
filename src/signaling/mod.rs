//! Signaling relay client
//!
//! The worker obtains a start key from the relay over HTTP, then keeps one
//! outbound WebSocket open to it. Relay messages are handled strictly one
//! at a time, each reply sent before the next message is read.

pub mod protocol;

pub use protocol::{parse_relay_message, ClientMessage, RelayMessage, StartKey};

use futures::{Sink, SinkExt, Stream, StreamExt};
use reqwest::header::AUTHORIZATION;
use reqwest::Url;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};
use crate::webrtc::SessionLifecycleManager;

pub struct SignalingClient {
    endpoint: Option<String>,
    secret: Option<String>,
    http: reqwest::Client,
    sessions: Arc<SessionLifecycleManager>,
}

impl SignalingClient {
    pub fn new(
        endpoint: Option<String>,
        secret: Option<String>,
        sessions: Arc<SessionLifecycleManager>,
    ) -> Self {
        Self {
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            secret,
            http: reqwest::Client::new(),
            sessions,
        }
    }

    fn endpoint(&self) -> Result<&str> {
        self.endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AppError::Config("SIGNALING_ENDPOINT is not set".to_string()))
    }

    /// Ask the relay for a start key using the shared secret
    pub async fn request_key(&self) -> Result<StartKey> {
        let secret = self
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Config("SECRET is not set".to_string()))?;
        let url = format!("{}/generateKey", self.endpoint()?);

        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!("bearer {}", secret))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Relay(format!(
                "generateKey returned {}",
                response.status()
            )));
        }

        Ok(response.json::<StartKey>().await?)
    }

    /// Open the relay connection and start dispatching its messages
    ///
    /// Resolves once the WebSocket handshake is done; the dispatch loop keeps
    /// running in its own task.
    pub async fn start(&self, start_key: &str) -> Result<()> {
        let url = signaling_url(self.endpoint()?, start_key)?;
        info!("Connecting to signaling relay at {}", url.host_str().unwrap_or_default());

        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| AppError::Signaling(format!("Relay handshake failed: {}", e)))?;

        info!("Signaling connection established");
        tokio::spawn(dispatch_loop(ws, self.sessions.clone()));
        Ok(())
    }
}

/// `{endpoint}/signaling?startKey=...` with the scheme switched to ws(s)
pub fn signaling_url(endpoint: &str, start_key: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/signaling", endpoint.trim_end_matches('/')))
        .map_err(|e| AppError::Config(format!("Invalid signaling endpoint: {}", e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(AppError::Config(format!(
                "Unsupported signaling scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AppError::Config("Cannot switch signaling scheme".to_string()))?;
    url.query_pairs_mut().append_pair("startKey", start_key);

    Ok(url)
}

/// Read relay frames until the connection ends
pub async fn dispatch_loop<S>(ws: S, sessions: Arc<SessionLifecycleManager>)
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin,
{
    let (mut tx, mut rx) = ws.split();

    while let Some(frame) = rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                info!("Signaling relay closed the connection: {:?}", frame);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("Signaling connection error: {}", e);
                break;
            }
        };

        let message = match parse_relay_message(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping relay message: {}", e);
                continue;
            }
        };

        let Some(reply) = handle_relay_message(&sessions, message).await else {
            continue;
        };

        let json = match serde_json::to_string(&reply) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode relay reply: {}", e);
                continue;
            }
        };
        if let Err(e) = tx.send(Message::Text(json)).await {
            warn!("Failed to reply to relay: {}", e);
            break;
        }
    }

    info!("Signaling dispatch stopped");
}

/// Apply one relay message; returns the reply to send, if any
pub async fn handle_relay_message(
    sessions: &SessionLifecycleManager,
    message: RelayMessage,
) -> Option<ClientMessage> {
    match message {
        RelayMessage::IceServerInfo { ice_server_info } => {
            match ice_server_info {
                Some(info) => sessions.set_ice_config(info),
                None => debug!("iceServerInfo without payload"),
            }
            None
        }
        RelayMessage::CanOffer { peer_connection_id } => {
            let decision = sessions.admit_offer(peer_connection_id);
            Some(ClientMessage::CanOffer {
                can_offer: decision.can_offer,
            })
        }
        RelayMessage::Offer { offer } => match sessions.negotiate(offer).await {
            Ok(answer) => Some(ClientMessage::Answer { answer }),
            Err(e) => {
                error!("Negotiation failed: {}", e);
                None
            }
        },
    }
}
