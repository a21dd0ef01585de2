use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend returned fewer TURN descriptors than a connection needs
    #[error("Missing ICE URLs: expected at least {required} TURN servers, got {found}")]
    InsufficientIceServers { required: usize, found: usize },

    #[error("Invalid signed URL: {0}")]
    InvalidSignedUrl(String),

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Message shown to the viewer when a session attempt fails
    ///
    /// Missing ICE metadata gets its own message; everything else is reported
    /// with the generic `Error: <detail>` prefix.
    pub fn user_message(&self) -> String {
        match self {
            Self::InsufficientIceServers { .. } => format!("{}, retry", self),
            other => format!("Error: {}", other),
        }
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;
