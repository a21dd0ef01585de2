//! One viewer session: the handle pair for one camera

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::webrtc::{PeerConnection, SignalingChannel};

/// Signaling channel and peer connection of one camera selection
///
/// Replaced wholesale on every camera switch, never mutated in place.
pub struct ViewerSession {
    camera: String,
    generation: u64,
    signaling: Option<Arc<dyn SignalingChannel>>,
    peer: Option<Arc<dyn PeerConnection>>,
    /// Stops the session's event loop
    cancel: CancellationToken,
}

impl ViewerSession {
    pub fn new(
        camera: impl Into<String>,
        generation: u64,
        signaling: Arc<dyn SignalingChannel>,
        peer: Arc<dyn PeerConnection>,
    ) -> Self {
        Self {
            camera: camera.into(),
            generation,
            signaling: Some(signaling),
            peer: Some(peer),
            cancel: CancellationToken::new(),
        }
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether any handle is still live
    pub fn is_open(&self) -> bool {
        self.signaling.is_some() || self.peer.is_some()
    }

    /// Close signaling, then the peer connection
    ///
    /// Each handle is closed at most once; later calls are no-ops.
    pub async fn close(&mut self) {
        self.cancel.cancel();

        if let Some(signaling) = self.signaling.take() {
            debug!(camera = %self.camera, "Closing signaling channel {}", signaling.client_id());
            signaling.close().await;
        }

        if let Some(peer) = self.peer.take() {
            debug!(camera = %self.camera, "Closing peer connection");
            if let Err(e) = peer.close().await {
                warn!(camera = %self.camera, "Failed to close peer connection: {}", e);
            }
        }
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
