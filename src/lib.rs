//! hualai-viewer - live view for Hualai cloud cameras
//!
//! This crate provides the viewer side of a camera session: it fetches
//! ICE servers and a signed signaling URL from the cloud backend, runs the
//! WebRTC handshake over KVS signaling, and hands the received media to a
//! video sink.

pub mod cloud;
pub mod config;
pub mod error;
pub mod events;
pub mod utils;
pub mod viewer;
pub mod webrtc;

pub use error::{AppError, Result};
