//! Session state and the observable viewer status

use serde::{Deserialize, Serialize};

/// Per-session connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerState {
    #[default]
    Idle,
    /// Fetching credentials and metadata, or waiting for the signaling socket
    Connecting,
    SignalingOpen,
    OfferSent,
    Answered,
    /// Remote media attached to the sink
    Streaming,
    Closed,
}

impl ViewerState {
    /// Whether the remote description has been applied
    pub fn is_answered(&self) -> bool {
        matches!(self, ViewerState::Answered | ViewerState::Streaming)
    }
}

impl std::fmt::Display for ViewerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ViewerState::Idle => "idle",
            ViewerState::Connecting => "connecting",
            ViewerState::SignalingOpen => "signaling_open",
            ViewerState::OfferSent => "offer_sent",
            ViewerState::Answered => "answered",
            ViewerState::Streaming => "streaming",
            ViewerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What a front end shows for the current selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewerStatus {
    /// Camera of the latest selection
    pub camera: Option<String>,
    pub state: ViewerState,
    /// True from selection until a stream arrives or the attempt fails
    pub loading: bool,
    /// User-visible error of the latest attempt
    pub error: Option<String>,
}
