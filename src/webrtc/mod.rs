//! WebRTC module for receiving camera streams
//!
//! This module provides the viewer side of a camera session:
//! - ICE server configuration built from backend connection info
//! - KVS signaling over a pre-signed WebSocket URL
//! - Receive-only peer connection (audio + video)
//!
//! Architecture:
//! ```text
//! Backend (ICE servers + signed URL)
//!        |
//!        v
//! PeerConfig ----------> RtcPeerConnection
//!                               |
//! Camera <---- KVS WebSocket ---+---- SDP offer / answer, ICE candidates
//!        |
//!        +------- RTP (H.264 / Opus) ------> VideoSink
//! ```

pub mod config;
pub mod kvs;
pub mod peer;
pub mod signaling;
pub mod track;

pub use config::{build_peer_config, IceServer, IceTransportPolicy, PeerConfig};
pub use kvs::{KvsSignalingClient, KvsSignalingConnector};
pub use peer::{
    PeerConnection, PeerConnectionFactory, PeerEvent, PeerEventSender, RtcPeerConnection,
    RtcPeerConnectionFactory,
};
pub use signaling::{
    ConnectionState, IceCandidate, SdpType, SessionDescription, SignalingChannel,
    SignalingConnector, SignalingEvent, SignalingEventSender,
};
pub use track::{MediaKind, MediaStream, RemoteTrack};
