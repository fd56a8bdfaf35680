//! Local HTTP surface for the operator's browser

mod handlers;
mod routes;
mod static_files;
mod ws;

pub use handlers::RELOAD_RESTART_DELAY;
pub use routes::create_router;
pub use static_files::{serve_asset, StaticAssets};
