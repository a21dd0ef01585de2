//! WebRTC signaling types, transport traits and the KVS wire format

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// SDP type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description in browser JSON form (`{"type": "offer", "sdp": "..."}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// SDP content
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate string
    pub candidate: String,
    /// SDP mid (media ID)
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    /// SDP mline index
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    /// Username fragment
    #[serde(rename = "usernameFragment", default)]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }

    pub fn with_mid(mut self, mid: impl Into<String>, index: u16) -> Self {
        self.sdp_mid = Some(mid.into());
        self.sdp_mline_index = Some(index);
        self
    }
}

/// Peer connection state notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::New => write!(f, "new"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Events emitted by a signaling channel
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// WebSocket connected; the offer can be sent
    Open,
    /// Remote answer to our offer
    SdpAnswer(SessionDescription),
    /// Remote (trickled) ICE candidate
    IceCandidate(IceCandidate),
    /// Channel closed, by either side
    Close,
    /// Transport or protocol error
    ///
    /// `fatal` errors mean the channel is unusable (connect or socket
    /// failure); non-fatal ones are bad frames or backend status reports.
    Error { message: String, fatal: bool },
}

pub type SignalingEventSender = mpsc::UnboundedSender<SignalingEvent>;

/// One signaling channel to one camera
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Client id this channel identifies as
    fn client_id(&self) -> &str;

    /// Start connecting; completion is reported as `SignalingEvent::Open`
    async fn open(&self) -> Result<()>;

    async fn send_sdp_offer(&self, offer: &SessionDescription) -> Result<()>;

    async fn send_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    /// Close the channel; safe to call more than once
    async fn close(&self);
}

/// Creates signaling channels from a pre-signed URL
///
/// Events for the channel go to `events` from the moment it is created,
/// so the receiver is in place before `open()` is called.
pub trait SignalingConnector: Send + Sync {
    fn connect(
        &self,
        signed_url: &str,
        client_id: &str,
        events: SignalingEventSender,
    ) -> Result<Arc<dyn SignalingChannel>>;
}

// ============================================================================
// KVS wire format
// ============================================================================

/// Outbound message actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KvsAction {
    SdpOffer,
    IceCandidate,
}

/// Frame sent to the signaling service
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KvsOutboundMessage {
    pub action: KvsAction,
    /// Base64 of the JSON payload
    pub message_payload: String,
    /// Only set by the master role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_client_id: Option<String>,
}

/// Frame received from the signaling service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvsInboundMessage {
    pub message_type: String,
    #[serde(default)]
    pub message_payload: Option<String>,
    #[serde(default)]
    pub sender_client_id: Option<String>,
    #[serde(default)]
    pub status_response: Option<KvsStatusResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvsStatusResponse {
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub status_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn encode_frame<P: Serialize>(action: KvsAction, payload: &P) -> Result<String> {
    let json = serde_json::to_vec(payload)?;
    let message = KvsOutboundMessage {
        action,
        message_payload: BASE64.encode(json),
        recipient_client_id: None,
    };
    Ok(serde_json::to_string(&message)?)
}

/// Encode an SDP offer frame
pub fn encode_sdp_offer(offer: &SessionDescription) -> Result<String> {
    encode_frame(KvsAction::SdpOffer, offer)
}

/// Encode an ICE candidate frame
pub fn encode_ice_candidate(candidate: &IceCandidate) -> Result<String> {
    encode_frame(KvsAction::IceCandidate, candidate)
}

fn decode_payload<T: serde::de::DeserializeOwned>(payload: Option<&str>) -> std::result::Result<T, String> {
    let payload = payload.ok_or_else(|| "missing messagePayload".to_string())?;
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64 payload: {}", e))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("invalid payload JSON: {}", e))
}

/// Decode a text frame from the signaling service
///
/// Returns `None` for frames a viewer ignores (empty keep-alives, offers,
/// unknown message types). Frames that cannot be parsed become non-fatal
/// errors.
pub fn decode_message(text: &str) -> Option<SignalingEvent> {
    if text.trim().is_empty() {
        return None;
    }

    let message: KvsInboundMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            return Some(SignalingEvent::Error {
                message: format!("unparseable signaling frame: {}", e),
                fatal: false,
            })
        }
    };

    let payload = message.message_payload.as_deref();
    let result = match message.message_type.as_str() {
        "SDP_ANSWER" => decode_payload::<SessionDescription>(payload).map(SignalingEvent::SdpAnswer),
        "ICE_CANDIDATE" => decode_payload::<IceCandidate>(payload).map(SignalingEvent::IceCandidate),
        "STATUS_RESPONSE" => {
            let status = message.status_response;
            let description = status
                .as_ref()
                .and_then(|s| s.description.clone())
                .unwrap_or_default();
            let code = status
                .as_ref()
                .and_then(|s| s.status_code.clone())
                .unwrap_or_default();
            let kind = status
                .and_then(|s| s.error_type)
                .unwrap_or_else(|| "status".to_string());
            Err(format!("{} {}: {}", kind, code, description))
        }
        other => {
            tracing::trace!("Ignoring signaling message type {}", other);
            return None;
        }
    };

    Some(result.unwrap_or_else(|message| SignalingEvent::Error {
        message,
        fatal: false,
    }))
}
