//! Cloud collaborators
//!
//! The viewer only depends on the three traits below; `HualaiClient`
//! implements all of them against the Hualai HTTP API.

pub mod client;
pub mod types;

pub use client::{hash_password, HualaiClient};
pub use types::{CameraConnectionInfo, CameraDevice, IceUri, TurnUri};

use async_trait::async_trait;

use crate::error::Result;

/// Issues short-lived bearer tokens from the stored account credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Lists the cameras available to an account
#[async_trait]
pub trait CameraDirectory: Send + Sync {
    async fn list_cameras(&self, token: &str) -> Result<Vec<CameraDevice>>;
}

/// Looks up ICE servers and the signed signaling URL for one camera
#[async_trait]
pub trait CameraMetadataService: Send + Sync {
    async fn camera_info(&self, token: &str, camera_id: &str) -> Result<CameraConnectionInfo>;
}
