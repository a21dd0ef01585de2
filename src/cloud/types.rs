//! Cloud API request and response types

use serde::{Deserialize, Deserializer, Serialize};

/// Response envelope shared by all cloud endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    /// Result code; the backend sends it as a string or a number
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

/// Login request body
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub phone_id: String,
    pub app_name: String,
    pub app_version: String,
    pub login_type: u8,
    pub sc: String,
    pub sv: String,
    /// `md5_hex(md5_hex(password))`
    pub password: String,
    pub user_name: String,
    pub phone_system_type: u8,
    pub ts: i64,
}

/// Login response data
#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Device list request body
#[derive(Debug, Clone, Serialize)]
pub struct DeviceListRequest {
    pub phone_id: String,
    pub app_name: String,
    pub app_ver: String,
    pub app_version: String,
    pub sc: String,
    pub sv: String,
    pub phone_system_type: u8,
    pub ts: i64,
    pub access_token: String,
}

/// Device list response data
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceListData {
    #[serde(default)]
    pub device_list: Vec<CameraDevice>,
}

/// Camera available to the account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDevice {
    /// Camera identifier (MAC)
    pub mac: String,
    pub nickname: String,
    pub product_model: String,
    pub product_type: String,
    /// 1 when the camera is online
    pub conn_state: i64,
    pub firmware_ver: String,
}

impl CameraDevice {
    pub fn is_online(&self) -> bool {
        self.conn_state == 1
    }
}

/// Camera metadata request body (`/webrtc/v1/auth/get`)
#[derive(Debug, Clone, Serialize)]
pub struct CameraInfoRequest {
    pub app_name: String,
    pub request_id: String,
    pub timestamp: i64,
    pub data: CameraInfoRequestData,
    pub app_version: String,
    pub os_name: String,
    pub os_version: String,
    pub terminal_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraInfoRequestData {
    pub device_id: String,
    pub client_id: String,
}

/// Per-camera connection metadata
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CameraConnectionInfo {
    pub ice_uri: IceUri,
    /// Pre-signed, percent-encoded signaling WebSocket URL
    pub wss_sign_url: String,
}

/// ICE server URIs returned by the backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IceUri {
    #[serde(deserialize_with = "one_or_many")]
    pub stun_uri: Vec<String>,
    #[serde(default)]
    pub turn_uri_list: Vec<TurnUri>,
}

/// TURN server entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TurnUri {
    #[serde(deserialize_with = "one_or_many")]
    pub uris: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Accept either `"uri"` or `["uri", ...]`
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(uri) => vec![uri],
        OneOrMany::Many(uris) => uris,
    })
}
