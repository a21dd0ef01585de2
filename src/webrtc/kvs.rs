//! KVS signaling client over WebSocket
//!
//! The signed URL already carries every authorization parameter, so the
//! client only needs the URL itself. Channel ARN and region are not used.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::signaling::{
    decode_message, encode_ice_candidate, encode_sdp_offer, IceCandidate, SessionDescription,
    SignalingChannel, SignalingConnector, SignalingEvent, SignalingEventSender,
};
use crate::error::{AppError, Result};

/// Signaling channel speaking the KVS viewer protocol
pub struct KvsSignalingClient {
    url: String,
    client_id: String,
    events: SignalingEventSender,
    outbound_tx: mpsc::UnboundedSender<Message>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl KvsSignalingClient {
    pub fn new(url: impl Into<String>, client_id: impl Into<String>, events: SignalingEventSender) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            client_id: client_id.into(),
            events,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            connected: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    fn send_frame(&self, frame: String) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(AppError::Signaling(
                "connection to the signaling service is not open".to_string(),
            ));
        }
        self.outbound_tx
            .send(Message::Text(frame.into()))
            .map_err(|_| AppError::Signaling("signaling channel closed".to_string()))
    }
}

/// Connection task: connect, then pump frames both ways until closed
async fn run_connection(
    url: String,
    client_id: String,
    events: SignalingEventSender,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let connect = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = events.send(SignalingEvent::Close);
            return;
        }
        result = connect_async(url.as_str()) => result,
    };

    let ws_stream = match connect {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!("Signaling connect failed for client {}: {}", client_id, e);
            let _ = events.send(SignalingEvent::Error {
                message: format!("websocket connect failed: {}", e),
                fatal: true,
            });
            let _ = events.send(SignalingEvent::Close);
            return;
        }
    };

    info!("Signaling channel open (client {})", client_id);
    connected.store(true, Ordering::Release);
    let _ = events.send(SignalingEvent::Open);

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            Some(message) = outbound_rx.recv() => {
                if let Err(e) = ws_tx.send(message).await {
                    let _ = events.send(SignalingEvent::Error {
                        message: format!("websocket send failed: {}", e),
                        fatal: true,
                    });
                    break;
                }
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = decode_message(&text) {
                        let _ = events.send(event);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Signaling service closed the channel: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(SignalingEvent::Error {
                        message: format!("websocket read failed: {}", e),
                        fatal: true,
                    });
                    break;
                }
                None => break,
            },
        }
    }

    connected.store(false, Ordering::Release);
    info!("Signaling channel closed (client {})", client_id);
    let _ = events.send(SignalingEvent::Close);
}

#[async_trait]
impl SignalingChannel for KvsSignalingClient {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn open(&self) -> Result<()> {
        let outbound_rx = self
            .outbound_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| AppError::Signaling("signaling channel already opened".to_string()))?;

        debug!("Opening signaling channel (client {})", self.client_id);
        tokio::spawn(run_connection(
            self.url.clone(),
            self.client_id.clone(),
            self.events.clone(),
            outbound_rx,
            self.connected.clone(),
            self.cancel.clone(),
        ));
        Ok(())
    }

    async fn send_sdp_offer(&self, offer: &SessionDescription) -> Result<()> {
        self.send_frame(encode_sdp_offer(offer)?)
    }

    async fn send_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.send_frame(encode_ice_candidate(candidate)?)
    }

    async fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for KvsSignalingClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Creates `KvsSignalingClient`s
#[derive(Debug, Default, Clone)]
pub struct KvsSignalingConnector;

impl SignalingConnector for KvsSignalingConnector {
    fn connect(
        &self,
        signed_url: &str,
        client_id: &str,
        events: SignalingEventSender,
    ) -> Result<Arc<dyn SignalingChannel>> {
        if !(signed_url.starts_with("wss://") || signed_url.starts_with("ws://")) {
            return Err(AppError::InvalidSignedUrl(
                "signaling URL must use ws:// or wss://".to_string(),
            ));
        }
        Ok(Arc::new(KvsSignalingClient::new(signed_url, client_id, events)))
    }
}
