use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Cloud account settings
    pub account: AccountConfig,
    /// Peer connection and signaling settings
    pub webrtc: WebRtcConfig,
    /// Video sink settings
    pub sink: SinkConfig,
}

/// Hualai cloud account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// API host, without scheme (e.g. "api.example.com")
    pub host: String,
    /// Phone identifier registered with the account
    pub phone_id: String,
    /// Account user name
    pub username: String,
    /// Account password (plain text, hashed before login)
    pub password: String,
    /// Client signature value
    pub sc: String,
    /// Client signature version
    pub sv: String,
    /// Application package name reported to the backend
    pub app_name: String,
    /// Application version reported to the backend
    pub app_version: String,
    /// Secondary version field used by the device list endpoint
    pub app_ver: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            phone_id: String::new(),
            username: String::new(),
            password: String::new(),
            sc: String::new(),
            sv: String::new(),
            app_name: "com.hualai.geniuslife".to_string(),
            app_version: "1.0.2".to_string(),
            app_ver: "1.0.4".to_string(),
        }
    }
}

/// WebRTC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// Client id sent with camera metadata requests
    pub client_id: String,
    /// Terminal id sent with camera metadata requests (defaults to the phone id)
    pub terminal_id: Option<String>,
    /// OS name reported with camera metadata requests
    pub os_name: String,
    /// OS version reported with camera metadata requests
    pub os_version: String,
    /// Send the offer immediately and trickle candidates as they are gathered
    pub trickle_ice: bool,
    /// Relay-only ICE; the STUN entry is dropped
    pub force_turn: bool,
    /// Minimum number of TURN descriptors required to attempt a connection
    pub min_turn_servers: usize,
    /// mDNS candidate handling for the local peer
    pub mdns_mode: MdnsMode,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            client_id: "229285051375271936".to_string(),
            terminal_id: None,
            os_name: "Android".to_string(),
            os_version: "4.19.132".to_string(),
            trickle_ice: true,
            force_turn: false,
            min_turn_servers: 2,
            mdns_mode: MdnsMode::default(),
        }
    }
}

/// mDNS mode for ICE host candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MdnsMode {
    Disabled,
    #[default]
    QueryOnly,
    QueryAndGather,
}

/// Video sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Directory for recorded tracks; tracks are only drained when unset
    pub output_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Check that the account section can be used for a login
    pub fn validate(&self) -> crate::Result<()> {
        let account = &self.account;
        let missing: Vec<&str> = [
            ("account.host", account.host.is_empty()),
            ("account.username", account.username.is_empty()),
            ("account.password", account.password.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(crate::AppError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        if self.webrtc.min_turn_servers == 0 {
            return Err(crate::AppError::Config(
                "webrtc.min_turn_servers must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Terminal id for metadata requests
    pub fn terminal_id(&self) -> String {
        self.webrtc
            .terminal_id
            .clone()
            .unwrap_or_else(|| self.account.phone_id.clone())
    }
}
