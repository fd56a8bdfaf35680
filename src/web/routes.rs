use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::ws::state_ws_handler;
use crate::state::AppState;

/// Create the worker's HTTP router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/main.js", get(handlers::main_js))
        .route("/main.css", get(handlers::main_css))
        .route("/generateKey", get(handlers::generate_key))
        .route("/startApp", post(handlers::start_app))
        .route("/healthCheck", get(handlers::health_check))
        .route("/takeoff", get(handlers::takeoff))
        .route("/land", get(handlers::land))
        .route("/state", get(state_ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
