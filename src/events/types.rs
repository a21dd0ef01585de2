//! Viewer event types
//!
//! Defines all event types that can be broadcast through the event bus.

use serde::{Deserialize, Serialize};

use crate::viewer::ViewerState;
use crate::webrtc::ConnectionState;

/// Viewer event (sent to subscribers)
///
/// JSON structure like:
/// ```json
/// {
///   "event": "viewer.state_changed",
///   "data": { "camera": "A4DA2220000B", "generation": 3, "state": "offer_sent" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ViewerEvent {
    /// A camera was selected and a new session attempt started
    #[serde(rename = "viewer.camera_selected")]
    CameraSelected {
        camera: String,
        generation: u64,
    },

    /// Session state machine transition
    #[serde(rename = "viewer.state_changed")]
    StateChanged {
        camera: String,
        generation: u64,
        state: ViewerState,
    },

    /// Session attempt failed (user-visible message)
    #[serde(rename = "viewer.error")]
    Error {
        camera: String,
        generation: u64,
        message: String,
    },

    /// A remote track was attached to the video sink
    #[serde(rename = "viewer.stream_started")]
    StreamStarted {
        camera: String,
        stream_id: String,
        track_id: String,
        /// "audio" or "video"
        kind: String,
        mime_type: String,
    },

    /// Signaling transport reported an error
    #[serde(rename = "signaling.error")]
    SignalingError {
        camera: String,
        message: String,
        fatal: bool,
    },

    /// Local ICE candidate gathering finished
    #[serde(rename = "webrtc.ice_complete")]
    IceGatheringComplete {
        camera: String,
    },

    /// Peer connection state changed
    #[serde(rename = "webrtc.connection_state")]
    PeerStateChanged {
        camera: String,
        state: ConnectionState,
    },
}

impl ViewerEvent {
    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::CameraSelected { .. } => "viewer.camera_selected",
            Self::StateChanged { .. } => "viewer.state_changed",
            Self::Error { .. } => "viewer.error",
            Self::StreamStarted { .. } => "viewer.stream_started",
            Self::SignalingError { .. } => "signaling.error",
            Self::IceGatheringComplete { .. } => "webrtc.ice_complete",
            Self::PeerStateChanged { .. } => "webrtc.connection_state",
        }
    }

    /// Check if event name matches a topic pattern
    ///
    /// Supports wildcards:
    /// - `*` matches all events
    /// - `viewer.*` matches all viewer events
    /// - `viewer.error` matches exact event
    pub fn matches_topic(&self, topic: &str) -> bool {
        if topic == "*" {
            return true;
        }

        let event_name = self.event_name();

        if topic.ends_with(".*") {
            let prefix = topic.trim_end_matches(".*");
            event_name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
        } else {
            event_name == topic
        }
    }
}
