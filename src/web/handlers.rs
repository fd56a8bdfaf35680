use axum::{extract::State, http::StatusCode, response::Response, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::static_files::serve_asset;
use crate::drone::DroneCommand;
use crate::error::Result;
use crate::events::DataChannelEvent;
use crate::signaling::StartKey;
use crate::state::AppState;

/// Grace period between serving the waiting page and asking for a restart
pub const RELOAD_RESTART_DELAY: Duration = Duration::from_secs(1);

/// Operator page
///
/// A reload while a peer session exists means the browser lost its page;
/// the session cannot be re-joined, so the worker is restarted.
pub async fn index(State(state): State<Arc<AppState>>) -> Response {
    if state.sessions.has_session() {
        info!("Operator page requested while a session exists");
        state
            .restart
            .schedule(RELOAD_RESTART_DELAY, "operator page reloaded during a session");
        return serve_asset("waiting.html");
    }

    serve_asset("index.html")
}

pub async fn main_js() -> Response {
    serve_asset("main.js")
}

pub async fn main_css() -> Response {
    serve_asset("main.css")
}

/// Obtain a fresh start key from the relay
pub async fn generate_key(State(state): State<Arc<AppState>>) -> Result<Json<StartKey>> {
    info!("Requesting start key from the relay");
    let key = state.signaling.request_key().await?;
    Ok(Json(key))
}

/// Join the relay room named by the start key
pub async fn start_app(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartKey>,
) -> Result<Json<Value>> {
    state.signaling.start(&body.start_key).await?;
    Ok(Json(json!({})))
}

/// Liveness probe, 503 once the worker is going away
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    if state.restart.is_requested() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})));
    }
    (StatusCode::OK, Json(json!({})))
}

pub async fn takeoff(State(state): State<Arc<AppState>>) -> Json<Value> {
    flight_command(&state, DroneCommand::Takeoff, DataChannelEvent::Takeoff).await
}

pub async fn land(State(state): State<Arc<AppState>>) -> Json<Value> {
    flight_command(&state, DroneCommand::Land, DataChannelEvent::Land).await
}

/// Send takeoff/land straight to the vehicle and tell the remote operator
async fn flight_command(
    state: &AppState,
    command: DroneCommand,
    event: DataChannelEvent,
) -> Json<Value> {
    state.drone.send(&command.instruction());

    match state.sessions.notify_data_channel(event).await {
        Ok(true) => {}
        Ok(false) => info!("No open data channel, [{}] not forwarded", command),
        Err(e) => warn!("Failed to forward [{}] to the operator: {}", command, e),
    }

    Json(json!({}))
}
