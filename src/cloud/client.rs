//! Hualai cloud HTTP client

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::types::{
    ApiResponse, CameraConnectionInfo, CameraDevice, CameraInfoRequest, CameraInfoRequestData,
    DeviceListData, DeviceListRequest, LoginData, LoginRequest,
};
use super::{CameraDirectory, CameraMetadataService, CredentialProvider};
use crate::config::AppConfig;
use crate::error::{AppError, Result};

const LOGIN_PATH: &str = "/app/v1/user/login";
const DEVICE_LIST_PATH: &str = "/app/v1/device/device_list/get";
const CAMERA_INFO_PATH: &str = "/webrtc/v1/auth/get";

/// Header carrying the bearer token on WebRTC endpoints
const ACCESS_TOKEN_HEADER: &str = "H-AccessToken";

const LOGIN_TYPE_PASSWORD: u8 = 1;
const PHONE_SYSTEM_TYPE: u8 = 2;

/// Hex MD5 of the MD5 hex digest, as the login endpoint expects
pub fn hash_password(password: &str) -> String {
    let once = hex_md5(password.as_bytes());
    hex_md5(once.as_bytes())
}

fn hex_md5(data: &[u8]) -> String {
    Md5::digest(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Client for the Hualai cloud API
///
/// Implements the three cloud collaborators the viewer needs. Tokens are
/// never cached: every `access_token()` call performs a fresh login.
pub struct HualaiClient {
    client: reqwest::Client,
    base_url: String,
    config: AppConfig,
}

impl HualaiClient {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let base_url = format!("https://{}", config.account.host.trim_end_matches('/'));
        Ok(Self::with_base_url(config, base_url))
    }

    /// Create a client against an explicit base URL (scheme included)
    pub fn with_base_url(config: AppConfig, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            config,
        }
    }

    fn login_request(&self) -> LoginRequest {
        let account = &self.config.account;
        LoginRequest {
            phone_id: account.phone_id.clone(),
            app_name: account.app_name.clone(),
            app_version: account.app_version.clone(),
            login_type: LOGIN_TYPE_PASSWORD,
            sc: account.sc.clone(),
            sv: account.sv.clone(),
            password: hash_password(&account.password),
            user_name: account.username.clone(),
            phone_system_type: PHONE_SYSTEM_TYPE,
            ts: now_millis(),
        }
    }

    fn device_list_request(&self, token: &str) -> DeviceListRequest {
        let account = &self.config.account;
        DeviceListRequest {
            phone_id: account.phone_id.clone(),
            app_name: account.app_name.clone(),
            app_ver: account.app_ver.clone(),
            app_version: account.app_version.clone(),
            sc: account.sc.clone(),
            sv: account.sv.clone(),
            phone_system_type: PHONE_SYSTEM_TYPE,
            ts: now_millis(),
            access_token: token.to_string(),
        }
    }

    fn camera_info_request(&self, camera_id: &str) -> CameraInfoRequest {
        CameraInfoRequest {
            app_name: self.config.account.app_name.clone(),
            request_id: uuid::Uuid::new_v4().simple().to_string(),
            timestamp: now_millis(),
            data: CameraInfoRequestData {
                device_id: camera_id.to_string(),
                client_id: self.config.webrtc.client_id.clone(),
            },
            app_version: self.config.account.app_version.clone(),
            os_name: self.config.webrtc.os_name.clone(),
            os_version: self.config.webrtc.os_version.clone(),
            terminal_id: self.config.terminal_id(),
        }
    }

    async fn post<B, T>(&self, path: &str, token: Option<&str>, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = token {
            request = request.header(ACCESS_TOKEN_HEADER, token);
        }

        let response = request.send().await?.error_for_status()?;
        let envelope: ApiResponse<serde_json::Value> = response.json().await?;
        unwrap_envelope(path, envelope)
    }
}

/// Extract `data` from an envelope, turning an empty payload into a backend error
fn unwrap_envelope<T: DeserializeOwned>(
    path: &str,
    envelope: ApiResponse<serde_json::Value>,
) -> Result<T> {
    let empty = match &envelope.data {
        None | Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    };

    if empty {
        let code = envelope
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string());
        return Err(AppError::Backend(format!(
            "{} returned no data (code {}): {}",
            path,
            code,
            envelope.msg.unwrap_or_default()
        )));
    }

    serde_json::from_value(envelope.data.unwrap_or_default()).map_err(AppError::from)
}

#[async_trait]
impl CredentialProvider for HualaiClient {
    async fn access_token(&self) -> Result<String> {
        info!("Logging in as {}", self.config.account.username);
        let request = self.login_request();
        let data: LoginData = self
            .post(LOGIN_PATH, None, &request)
            .await
            .map_err(|e| match e {
                AppError::Backend(msg) => AppError::AuthError(msg),
                other => other,
            })?;
        Ok(data.access_token)
    }
}

#[async_trait]
impl CameraDirectory for HualaiClient {
    async fn list_cameras(&self, token: &str) -> Result<Vec<CameraDevice>> {
        info!("Fetching camera list");
        let request = self.device_list_request(token);
        let data: DeviceListData = self.post(DEVICE_LIST_PATH, None, &request).await?;
        debug!("Account has {} devices", data.device_list.len());
        Ok(data.device_list)
    }
}

#[async_trait]
impl CameraMetadataService for HualaiClient {
    async fn camera_info(&self, token: &str, camera_id: &str) -> Result<CameraConnectionInfo> {
        info!("Fetching connection info for camera {}", camera_id);
        let request = self.camera_info_request(camera_id);
        self.post(CAMERA_INFO_PATH, Some(token), &request).await
    }
}
