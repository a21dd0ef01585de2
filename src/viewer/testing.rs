//! In-memory collaborators for controller tests
//!
//! Every fake appends to a shared `CallLog`, so tests can assert the exact
//! order of calls across the signaling channel and the peer connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::controller::{ViewerController, ViewerDeps};
use super::sink::VideoSink;
use super::state::{ViewerState, ViewerStatus};
use crate::cloud::{
    CameraConnectionInfo, CameraMetadataService, CredentialProvider, IceUri, TurnUri,
};
use crate::config::WebRtcConfig;
use crate::error::{AppError, Result};
use crate::events::EventBus;
use crate::webrtc::{
    IceCandidate, MediaStream, PeerConfig, PeerConnection, PeerConnectionFactory, PeerEvent,
    PeerEventSender, SessionDescription, SignalingChannel, SignalingConnector, SignalingEvent,
    SignalingEventSender,
};

/// Signed URL as the backend sends it: reserved characters stay escaped
pub const SIGNED_URL: &str = "wss://m-1234.kvs-signaling.us-west-2.amazonaws.com/\
?X-Amz-ChannelARN=arn%3Aaws%3Akinesisvideo&X-Amz-Signature=sig%5Eval";

/// Ordered record of calls made on the fakes
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Number of entries starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    /// Index of the first entry starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e.starts_with(prefix))
    }
}

/// Poll `condition` until it holds, panicking after a few seconds
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Credential provider and metadata service backed by fixed data
pub struct FakeCloud {
    log: CallLog,
    turn_count: usize,
    login_fails: bool,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl FakeCloud {
    /// One STUN and two TURN entries
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            turn_count: 2,
            login_fails: false,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_turn_count(mut self, count: usize) -> Self {
        self.turn_count = count;
        self
    }

    pub fn with_login_failure(mut self) -> Self {
        self.login_fails = true;
        self
    }

    /// Hold metadata lookups for `camera` until the returned gate is notified
    pub fn gate(&self, camera: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(camera.to_string(), gate.clone());
        gate
    }

    fn ice_uri(&self) -> IceUri {
        IceUri {
            stun_uri: vec!["stun:stun.example.com:443".to_string()],
            turn_uri_list: (0..self.turn_count)
                .map(|i| TurnUri {
                    uris: vec![format!("turn:turn{}.example.com:443?transport=udp", i)],
                    username: format!("user{}", i),
                    password: format!("pass{}", i),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl CredentialProvider for FakeCloud {
    async fn access_token(&self) -> Result<String> {
        self.log.push("cloud.token");
        if self.login_fails {
            return Err(AppError::AuthError("invalid password".to_string()));
        }
        Ok("token-1".to_string())
    }
}

#[async_trait]
impl CameraMetadataService for FakeCloud {
    async fn camera_info(&self, token: &str, camera_id: &str) -> Result<CameraConnectionInfo> {
        assert_eq!(token, "token-1");
        self.log.push(format!("cloud.camera_info {}", camera_id));

        let gate = self.gates.lock().unwrap().get(camera_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        Ok(CameraConnectionInfo {
            ice_uri: self.ice_uri(),
            wss_sign_url: SIGNED_URL.to_string(),
        })
    }
}

/// Signaling channel that records what it is asked to send
pub struct FakeSignalingChannel {
    name: String,
    client_id: String,
    url: String,
    log: CallLog,
    events: SignalingEventSender,
    offers: Mutex<Vec<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
}

impl FakeSignalingChannel {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver an event as if it came from the signaling service
    pub fn emit(&self, event: SignalingEvent) {
        let _ = self.events.send(event);
    }

    pub fn offers(&self) -> Vec<SessionDescription> {
        self.offers.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalingChannel for FakeSignalingChannel {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn open(&self) -> Result<()> {
        self.log.push(format!("signaling.open {}", self.name));
        self.emit(SignalingEvent::Open);
        Ok(())
    }

    async fn send_sdp_offer(&self, offer: &SessionDescription) -> Result<()> {
        self.log.push(format!("signaling.send_offer {}", self.name));
        self.offers.lock().unwrap().push(offer.clone());
        Ok(())
    }

    async fn send_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.log.push(format!("signaling.send_candidate {}", self.name));
        self.candidates.lock().unwrap().push(candidate.clone());
        Ok(())
    }

    async fn close(&self) {
        self.log.push(format!("signaling.close {}", self.name));
        // a real socket reports its own close
        self.emit(SignalingEvent::Close);
    }
}

/// Connector handing out `FakeSignalingChannel`s named S1, S2, ...
pub struct FakeSignalingConnector {
    log: CallLog,
    channels: Mutex<Vec<Arc<FakeSignalingChannel>>>,
}

impl FakeSignalingConnector {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            channels: Mutex::new(Vec::new()),
        }
    }

    pub fn channel(&self, index: usize) -> Option<Arc<FakeSignalingChannel>> {
        self.channels.lock().unwrap().get(index).cloned()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }
}

impl SignalingConnector for FakeSignalingConnector {
    fn connect(
        &self,
        signed_url: &str,
        client_id: &str,
        events: SignalingEventSender,
    ) -> Result<Arc<dyn SignalingChannel>> {
        let mut channels = self.channels.lock().unwrap();
        let name = format!("S{}", channels.len() + 1);
        self.log.push(format!("signaling.connect {}", name));

        let channel = Arc::new(FakeSignalingChannel {
            name,
            client_id: client_id.to_string(),
            url: signed_url.to_string(),
            log: self.log.clone(),
            events,
            offers: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
        });
        channels.push(channel.clone());
        Ok(channel)
    }
}

/// Peer connection that behaves like a browser one, minus the media
pub struct FakePeerConnection {
    name: String,
    log: CallLog,
    events: PeerEventSender,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
}

impl FakePeerConnection {
    /// Deliver an event as if the WebRTC stack raised it
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    pub fn local(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    pub fn remote(&self) -> Option<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    /// Remote candidates that were applied
    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.log.push(format!("peer.create_offer {}", self.name));
        Ok(SessionDescription::offer(format!(
            "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns={}\r\n",
            self.name
        )))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.log.push(format!("peer.set_local {}", self.name));
        *self.local.lock().unwrap() = Some(description);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local()
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.log.push(format!("peer.set_remote {}", self.name));
        *self.remote.lock().unwrap() = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.log.push(format!("peer.add_candidate {}", self.name));
        if self.remote.lock().unwrap().is_none() {
            return Err(AppError::WebRtcError("remote description not set".to_string()));
        }
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.push(format!("peer.close {}", self.name));
        Ok(())
    }
}

/// Factory handing out `FakePeerConnection`s named P1, P2, ...
pub struct FakePeerFactory {
    log: CallLog,
    peers: Mutex<Vec<(PeerConfig, Arc<FakePeerConnection>)>>,
    created: AtomicUsize,
}

impl FakePeerFactory {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            peers: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        }
    }

    pub fn peer(&self, index: usize) -> Option<Arc<FakePeerConnection>> {
        self.peers.lock().unwrap().get(index).map(|(_, p)| p.clone())
    }

    pub fn config(&self, index: usize) -> Option<PeerConfig> {
        self.peers.lock().unwrap().get(index).map(|(c, _)| c.clone())
    }

    pub fn peer_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnectionFactory for FakePeerFactory {
    async fn create(
        &self,
        config: &PeerConfig,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>> {
        let name = format!("P{}", self.created.fetch_add(1, Ordering::SeqCst) + 1);
        self.log.push(format!("peer.create {}", name));

        let peer = Arc::new(FakePeerConnection {
            name,
            log: self.log.clone(),
            events,
            local: Mutex::new(None),
            remote: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
        });
        self.peers
            .lock()
            .unwrap()
            .push((config.clone(), peer.clone()));
        Ok(peer)
    }
}

/// Sink that just remembers its source
#[derive(Default)]
pub struct RecordingSink {
    source: Mutex<Option<MediaStream>>,
    hold: Mutex<Option<Arc<Notify>>>,
    held: AtomicUsize,
}

impl RecordingSink {
    pub fn source(&self) -> Option<MediaStream> {
        self.source.lock().unwrap().clone()
    }

    /// Make the next assignment wait until the returned notify fires
    pub fn hold_next_assignment(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(release.clone());
        release
    }

    /// Assignments currently waiting on a hold
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoSink for RecordingSink {
    async fn set_source(&self, source: Option<MediaStream>) {
        if source.is_some() {
            let hold = self.hold.lock().unwrap().take();
            if let Some(release) = hold {
                self.held.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
                self.held.fetch_sub(1, Ordering::SeqCst);
            }
        }
        *self.source.lock().unwrap() = source;
    }

    async fn has_source(&self) -> bool {
        self.source.lock().unwrap().is_some()
    }
}

/// Controller wired to fakes
pub struct Harness {
    pub controller: ViewerController,
    pub log: CallLog,
    pub connector: Arc<FakeSignalingConnector>,
    pub peers: Arc<FakePeerFactory>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(mut cloud: FakeCloud, config: WebRtcConfig) -> Self {
        let log = CallLog::default();
        cloud.log = log.clone();
        let cloud = Arc::new(cloud);
        let connector = Arc::new(FakeSignalingConnector::new(log.clone()));
        let peers = Arc::new(FakePeerFactory::new(log.clone()));
        let sink = Arc::new(RecordingSink::default());

        let deps = ViewerDeps {
            credentials: cloud.clone(),
            metadata: cloud,
            signaling: connector.clone(),
            peers: peers.clone(),
            sink: sink.clone(),
        };
        let controller = ViewerController::new(deps, config, Arc::new(EventBus::new()));

        Self {
            controller,
            log,
            connector,
            peers,
            sink,
        }
    }

    pub fn current_status(&self) -> ViewerStatus {
        self.controller.current_status()
    }

    pub fn current_state(&self) -> ViewerState {
        self.controller.current_status().state
    }
}
