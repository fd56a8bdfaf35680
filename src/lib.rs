//! drone-teleop - browser tele-operation of a camera drone
//!
//! A worker process bridges a remote operator's WebRTC session to the
//! vehicle's UDP command link and video stream. A small supervisor keeps
//! exactly one worker alive and replaces it whenever the worker reports
//! that its session has gone stale.

pub mod config;
pub mod drone;
pub mod error;
pub mod events;
pub mod signaling;
pub mod state;
pub mod supervisor;
pub mod utils;
pub mod video;
pub mod web;
pub mod webrtc;

pub use error::{AppError, Result};
