//! WebRTC configuration

use serde::{Deserialize, Serialize};

use crate::cloud::IceUri;
use crate::config::{MdnsMode, WebRtcConfig};
use crate::error::{AppError, Result};

/// ICE server descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs (e.g. ["turn:turn.example.com:443?transport=udp"])
    pub urls: Vec<String>,
    /// Username for TURN authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Credential for TURN authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(urls: Vec<String>) -> Self {
        Self {
            urls,
            username: None,
            credential: None,
        }
    }

    pub fn turn(urls: Vec<String>, username: String, credential: String) -> Self {
        Self {
            urls,
            username: Some(username),
            credential: Some(credential),
        }
    }
}

/// ICE transport policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    #[default]
    All,
    Relay,
}

/// Everything needed to create one peer connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerConfig {
    pub ice_servers: Vec<IceServer>,
    pub ice_transport_policy: IceTransportPolicy,
    pub mdns_mode: MdnsMode,
}

/// Build the ICE server list for a camera
///
/// The STUN entry comes first, followed by every TURN entry in backend
/// order. Fewer than `min_turn_servers` TURN entries is an error; the
/// caller must not open any connection in that case.
pub fn build_peer_config(ice: &IceUri, config: &WebRtcConfig) -> Result<PeerConfig> {
    let found = ice.turn_uri_list.len();
    if found < config.min_turn_servers {
        return Err(AppError::InsufficientIceServers {
            required: config.min_turn_servers,
            found,
        });
    }

    let mut ice_servers = Vec::with_capacity(found + 1);

    if !config.force_turn && !ice.stun_uri.is_empty() {
        ice_servers.push(IceServer::stun(ice.stun_uri.clone()));
    }

    for turn in &ice.turn_uri_list {
        ice_servers.push(IceServer::turn(
            turn.uris.clone(),
            turn.username.clone(),
            turn.password.clone(),
        ));
    }

    let ice_transport_policy = if config.force_turn {
        IceTransportPolicy::Relay
    } else {
        IceTransportPolicy::All
    };

    Ok(PeerConfig {
        ice_servers,
        ice_transport_policy,
        mdns_mode: config.mdns_mode,
    })
}
