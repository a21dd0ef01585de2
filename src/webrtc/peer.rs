//! WebRTC peer connection management

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::ice::mdns::MulticastDnsMode;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

use super::config::{IceServer, IceTransportPolicy, PeerConfig};
use super::signaling::{ConnectionState, IceCandidate, SdpType, SessionDescription};
use super::track::{MediaStream, RemoteTrack};
use crate::config::MdnsMode;
use crate::error::{AppError, Result};

/// Events emitted by a peer connection
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// Locally gathered candidate; `None` marks the end of gathering
    IceCandidate(Option<IceCandidate>),
    /// Remote media arrived
    Track(MediaStream),
    StateChanged(ConnectionState),
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

/// Receive-only peer connection used by the viewer
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Create an offer that receives audio and video
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    /// Current local description, including gathered candidates
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates peer connections
///
/// Events go to `events` from creation on, before any description is set.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        config: &PeerConfig,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>>;
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp),
        SdpType::Rollback => {
            return Err(AppError::WebRtcError(
                "rollback descriptions are not supported".to_string(),
            ))
        }
    };
    parsed.map_err(|e| AppError::WebRtcError(format!("Invalid SDP: {}", e)))
}

fn from_rtc_description(description: RTCSessionDescription) -> Option<SessionDescription> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        _ => return None,
    };
    Some(SessionDescription {
        sdp_type,
        sdp: description.sdp,
    })
}

fn to_rtc_ice_server(server: &IceServer) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

fn to_mdns_mode(mode: MdnsMode) -> MulticastDnsMode {
    match mode {
        MdnsMode::Disabled => MulticastDnsMode::Disabled,
        MdnsMode::QueryOnly => MulticastDnsMode::QueryOnly,
        MdnsMode::QueryAndGather => MulticastDnsMode::QueryAndGather,
    }
}

/// Peer connection backed by webrtc-rs
pub struct RtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
}

impl RtcPeerConnection {
    /// Create a new receive-only peer connection
    pub async fn new(config: &PeerConfig, events: PeerEventSender) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            AppError::WebRtcError(format!("Failed to register interceptors: {}", e))
        })?;

        let mut setting_engine = SettingEngine::default();
        let mode = to_mdns_mode(config.mdns_mode);
        setting_engine.set_ice_multicast_dns_mode(mode);
        if mode == MulticastDnsMode::QueryAndGather {
            setting_engine.set_multicast_dns_host_name(format!("{}.local", uuid::Uuid::new_v4()));
        }

        let api = APIBuilder::new()
            .with_setting_engine(setting_engine)
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config.ice_servers.iter().map(to_rtc_ice_server).collect(),
            ice_transport_policy: match config.ice_transport_policy {
                IceTransportPolicy::All => RTCIceTransportPolicy::All,
                IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
            },
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await.map_err(|e| {
            AppError::WebRtcError(format!("Failed to create peer connection: {}", e))
        })?;
        let pc = Arc::new(pc);

        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            pc.add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| {
                AppError::WebRtcError(format!("Failed to add {:?} transceiver: {}", kind, e))
            })?;
        }

        let peer = Self { pc };
        peer.setup_event_handlers(events);

        info!(
            "Peer connection created with {} ICE servers ({:?} policy)",
            config.ice_servers.len(),
            config.ice_transport_policy
        );
        Ok(peer)
    }

    /// Set up peer connection event handlers
    fn setup_event_handlers(&self, events: PeerEventSender) {
        let state_events = events.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let new_state = match s {
                    RTCPeerConnectionState::New => Some(ConnectionState::New),
                    RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
                    RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
                    RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
                    RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
                    RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
                    _ => None,
                };
                if let Some(state) = new_state {
                    let _ = state_events.send(PeerEvent::StateChanged(state));
                }
                Box::pin(async {})
            }));

        let candidate_events = events.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                match candidate.map(|c| c.to_json()) {
                    Some(Ok(init)) => {
                        let _ = candidate_events.send(PeerEvent::IceCandidate(Some(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        })));
                    }
                    Some(Err(e)) => debug!("Skipping unserializable ICE candidate: {}", e),
                    None => {
                        let _ = candidate_events.send(PeerEvent::IceCandidate(None));
                    }
                }
                Box::pin(async {})
            }));

        let track_events = events;
        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let stream_id = track.stream_id();
            match RemoteTrack::from_remote(track) {
                Some(remote) => {
                    debug!(
                        "Remote {} track {} ({}) on stream {}",
                        remote.kind, remote.id, remote.mime_type, stream_id
                    );
                    let _ = track_events.send(PeerEvent::Track(MediaStream::new(
                        stream_id,
                        vec![remote],
                    )));
                }
                None => debug!("Ignoring remote track of unknown kind"),
            }
            Box::pin(async {})
        }));
    }
}

#[async_trait]
impl PeerConnection for RtcPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create offer: {}", e)))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set local description: {}", e)))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc
            .local_description()
            .await
            .and_then(from_rtc_description)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to close peer connection: {}", e)))
    }
}

/// Creates `RtcPeerConnection`s
#[derive(Debug, Default, Clone)]
pub struct RtcPeerConnectionFactory;

#[async_trait]
impl PeerConnectionFactory for RtcPeerConnectionFactory {
    async fn create(
        &self,
        config: &PeerConfig,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>> {
        let peer = RtcPeerConnection::new(config, events).await?;
        Ok(Arc::new(peer))
    }
}
