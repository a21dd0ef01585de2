//! Viewer session controller
//!
//! Mediates exactly one active viewer connection at a time. Every camera
//! selection bumps a generation counter; asynchronous work started for an
//! older generation gives up as soon as it notices, closing whatever it
//! already created.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::session::ViewerSession;
use super::sink::VideoSink;
use super::state::{ViewerState, ViewerStatus};
use crate::cloud::{CameraMetadataService, CredentialProvider};
use crate::config::WebRtcConfig;
use crate::error::{AppError, Result};
use crate::events::{EventBus, ViewerEvent};
use crate::utils::{decode_uri, random_client_id};
use crate::webrtc::{
    build_peer_config, ConnectionState, IceCandidate, MediaStream, PeerConnection,
    PeerConnectionFactory, PeerEvent, SessionDescription, SignalingChannel, SignalingConnector,
    SignalingEvent,
};

/// Collaborators the controller is built from
pub struct ViewerDeps {
    pub credentials: Arc<dyn CredentialProvider>,
    pub metadata: Arc<dyn CameraMetadataService>,
    pub signaling: Arc<dyn SignalingConnector>,
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub sink: Arc<dyn VideoSink>,
}

struct ControllerInner {
    credentials: Arc<dyn CredentialProvider>,
    metadata: Arc<dyn CameraMetadataService>,
    connector: Arc<dyn SignalingConnector>,
    peers: Arc<dyn PeerConnectionFactory>,
    sink: Arc<dyn VideoSink>,
    config: WebRtcConfig,
    events: Arc<EventBus>,
    generation: AtomicU64,
    session: Mutex<Option<ViewerSession>>,
    status: watch::Sender<ViewerStatus>,
}

/// Viewer session controller
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct ViewerController {
    inner: Arc<ControllerInner>,
}

impl ViewerController {
    pub fn new(deps: ViewerDeps, config: WebRtcConfig, events: Arc<EventBus>) -> Self {
        let (status, _) = watch::channel(ViewerStatus::default());
        Self {
            inner: Arc::new(ControllerInner {
                credentials: deps.credentials,
                metadata: deps.metadata,
                connector: deps.signaling,
                peers: deps.peers,
                sink: deps.sink,
                config,
                events,
                generation: AtomicU64::new(0),
                session: Mutex::new(None),
                status,
            }),
        }
    }

    /// Subscribe to status changes
    pub fn status(&self) -> watch::Receiver<ViewerStatus> {
        self.inner.status.subscribe()
    }

    pub fn current_status(&self) -> ViewerStatus {
        self.inner.status.borrow().clone()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// Camera of the live session, if any
    pub async fn active_camera(&self) -> Option<String> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.camera().to_string())
    }

    /// Start viewing `camera`, replacing any current session
    ///
    /// Never fails: errors show up in the status and as `viewer.error` events.
    pub async fn select_camera(&self, camera: &str) {
        let inner = &self.inner;
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Selecting camera {} (generation {})", camera, generation);
        inner.events.publish(ViewerEvent::CameraSelected {
            camera: camera.to_string(),
            generation,
        });

        inner.stop_sessions_before(generation).await;
        if !inner.is_current(generation) {
            debug!("Selection of {} superseded during teardown", camera);
            return;
        }
        inner.sink.set_source(None).await;

        inner.status.send_replace(ViewerStatus {
            camera: Some(camera.to_string()),
            state: ViewerState::Connecting,
            loading: true,
            error: None,
        });
        inner.publish_state(camera, generation, ViewerState::Connecting);

        if let Err(e) = inner.establish(camera, generation).await {
            inner.report_error(camera, generation, &e);
            inner.teardown_generation(generation).await;
        }
    }

    /// Close the current session, if any
    ///
    /// Safe to call with nothing active.
    pub async fn stop_current_viewer(&self) {
        self.inner.stop_sessions_before(u64::MAX).await;
    }

    /// Component teardown: abandon in-flight selections and close everything
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.generation.fetch_add(1, Ordering::SeqCst);
        inner.stop_sessions_before(u64::MAX).await;
        inner.sink.set_source(None).await;
        inner.status.send_modify(|status| {
            status.state = ViewerState::Closed;
            status.loading = false;
        });
        info!("Viewer shut down");
    }
}

impl ControllerInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn publish_state(&self, camera: &str, generation: u64, state: ViewerState) {
        self.events.publish(ViewerEvent::StateChanged {
            camera: camera.to_string(),
            generation,
            state,
        });
    }

    fn set_state(&self, camera: &str, generation: u64, state: ViewerState) {
        if !self.is_current(generation) {
            return;
        }
        debug!("Camera {} -> {}", camera, state);
        self.status.send_modify(|status| status.state = state);
        self.publish_state(camera, generation, state);
    }

    fn report_error(&self, camera: &str, generation: u64, err: &AppError) {
        if !self.is_current(generation) {
            debug!("Dropping error of superseded selection {}: {}", camera, err);
            return;
        }
        let message = err.user_message();
        error!("Viewer for {} failed: {}", camera, err);
        self.status.send_modify(|status| {
            status.error = Some(message.clone());
            status.loading = false;
        });
        self.events.publish(ViewerEvent::Error {
            camera: camera.to_string(),
            generation,
            message,
        });
    }

    /// Close the stored session if it was created before `generation`
    async fn stop_sessions_before(&self, generation: u64) {
        let session = {
            let mut slot = self.session.lock().await;
            match slot.as_ref() {
                Some(s) if s.generation() < generation => slot.take(),
                _ => None,
            }
        };
        if let Some(session) = session {
            self.close_session(session).await;
        }
    }

    /// Close the stored session only if it belongs to `generation`
    async fn teardown_generation(&self, generation: u64) {
        let session = {
            let mut slot = self.session.lock().await;
            match slot.as_ref() {
                Some(s) if s.generation() == generation => slot.take(),
                _ => None,
            }
        };
        if let Some(session) = session {
            self.close_session(session).await;
        }
    }

    async fn close_session(&self, mut session: ViewerSession) {
        info!("Stopping viewer for {}", session.camera());
        session.close().await;

        let generation = session.generation();
        if self.is_current(generation) {
            self.status.send_modify(|status| {
                status.state = ViewerState::Closed;
                status.loading = false;
            });
        }
        self.publish_state(session.camera(), generation, ViewerState::Closed);
    }

    async fn establish(self: &Arc<Self>, camera: &str, generation: u64) -> Result<()> {
        let token = self.credentials.access_token().await?;
        if !self.is_current(generation) {
            debug!("Selection of {} superseded after login", camera);
            return Ok(());
        }

        let info = self.metadata.camera_info(&token, camera).await?;
        if !self.is_current(generation) {
            debug!("Selection of {} superseded after metadata lookup", camera);
            return Ok(());
        }

        let peer_config = build_peer_config(&info.ice_uri, &self.config)?;
        let signed_url = decode_uri(&info.wss_sign_url)?;
        let client_id = random_client_id();

        let (sig_tx, sig_rx) = mpsc::unbounded_channel();
        let signaling = self.connector.connect(&signed_url, &client_id, sig_tx)?;

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let peer = match self.peers.create(&peer_config, peer_tx).await {
            Ok(peer) => peer,
            Err(e) => {
                signaling.close().await;
                return Err(e);
            }
        };

        let mut slot = self.session.lock().await;
        if !self.is_current(generation) {
            drop(slot);
            debug!("Selection of {} superseded, dropping new connections", camera);
            ViewerSession::new(camera, generation, signaling, peer)
                .close()
                .await;
            return Ok(());
        }
        if let Some(mut previous) = slot.take() {
            warn!("Replacing unexpected live session for {}", previous.camera());
            previous.close().await;
        }

        let session = ViewerSession::new(camera, generation, signaling.clone(), peer.clone());
        let handler = SessionHandler {
            inner: self.clone(),
            camera: camera.to_string(),
            generation,
            signaling: signaling.clone(),
            peer,
            trickle_ice: self.config.trickle_ice,
            state: ViewerState::Connecting,
            pending_candidates: Vec::new(),
            stream_id: None,
        };
        tokio::spawn(handler.run(sig_rx, peer_rx, session.cancel_token()));
        *slot = Some(session);
        drop(slot);

        info!(
            "Opening signaling channel for {} as client {}",
            camera, client_id
        );
        signaling.open().await
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Event reactions of one session
///
/// Runs on the session's own task; events are handled one at a time.
struct SessionHandler {
    inner: Arc<ControllerInner>,
    camera: String,
    generation: u64,
    signaling: Arc<dyn SignalingChannel>,
    peer: Arc<dyn PeerConnection>,
    trickle_ice: bool,
    state: ViewerState,
    /// Remote candidates that arrived before the answer
    pending_candidates: Vec<IceCandidate>,
    /// Stream attached to the sink
    stream_id: Option<String>,
}

impl SessionHandler {
    async fn run(
        mut self,
        mut signaling_rx: mpsc::UnboundedReceiver<SignalingEvent>,
        mut peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let flow = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(event) = signaling_rx.recv() => {
                    if !self.inner.is_current(self.generation) {
                        break;
                    }
                    self.handle_signaling(event).await
                }
                Some(event) = peer_rx.recv() => {
                    if !self.inner.is_current(self.generation) {
                        break;
                    }
                    self.handle_peer(event).await
                }
            };
            if let Flow::Stop = flow {
                break;
            }
        }
        debug!("Event loop for {} (generation {}) finished", self.camera, self.generation);
    }

    async fn handle_signaling(&mut self, event: SignalingEvent) -> Flow {
        let result = match event {
            SignalingEvent::Open => self.on_signaling_open().await,
            SignalingEvent::SdpAnswer(answer) => self.on_sdp_answer(answer).await,
            SignalingEvent::IceCandidate(candidate) => {
                self.on_remote_candidate(candidate).await;
                Ok(())
            }
            SignalingEvent::Close => {
                self.on_signaling_close().await;
                return Flow::Stop;
            }
            SignalingEvent::Error { message, fatal } => {
                return self.on_signaling_error(message, fatal).await;
            }
        };
        self.settle(result).await
    }

    async fn handle_peer(&mut self, event: PeerEvent) -> Flow {
        match event {
            PeerEvent::IceCandidate(candidate) => {
                let result = self.on_local_candidate(candidate).await;
                self.settle(result).await
            }
            PeerEvent::Track(stream) => {
                self.on_track(stream).await;
                Flow::Continue
            }
            PeerEvent::StateChanged(state) => {
                self.on_peer_state(state);
                Flow::Continue
            }
        }
    }

    /// Report a failed reaction and tear the session down
    async fn settle(&mut self, result: Result<()>) -> Flow {
        match result {
            Ok(()) => Flow::Continue,
            Err(e) => {
                self.inner.report_error(&self.camera, self.generation, &e);
                self.inner.teardown_generation(self.generation).await;
                Flow::Stop
            }
        }
    }

    fn transition(&mut self, state: ViewerState) {
        self.state = state;
        self.inner.set_state(&self.camera, self.generation, state);
    }

    async fn on_signaling_open(&mut self) -> Result<()> {
        info!("Connected to signaling service for {}", self.camera);
        self.transition(ViewerState::SignalingOpen);

        let offer = self.peer.create_offer().await?;
        self.peer.set_local_description(offer.clone()).await?;

        if self.trickle_ice {
            debug!("Sending SDP offer for {}", self.camera);
            self.signaling.send_sdp_offer(&offer).await?;
            self.transition(ViewerState::OfferSent);
        } else {
            debug!("Gathering ICE candidates before sending the offer");
        }
        Ok(())
    }

    async fn on_sdp_answer(&mut self, answer: SessionDescription) -> Result<()> {
        info!("Received SDP answer for {}", self.camera);
        self.peer.set_remote_description(answer).await?;
        if !self.state.is_answered() {
            self.transition(ViewerState::Answered);
        }

        for candidate in std::mem::take(&mut self.pending_candidates) {
            self.apply_remote_candidate(candidate).await;
        }
        Ok(())
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.state.is_answered() {
            self.apply_remote_candidate(candidate).await;
        } else {
            debug!("Holding remote ICE candidate until the answer arrives");
            self.pending_candidates.push(candidate);
        }
    }

    async fn apply_remote_candidate(&self, candidate: IceCandidate) {
        if let Err(e) = self.peer.add_ice_candidate(candidate).await {
            warn!("Failed to add remote ICE candidate for {}: {}", self.camera, e);
        }
    }

    async fn on_local_candidate(&mut self, candidate: Option<IceCandidate>) -> Result<()> {
        match candidate {
            Some(candidate) => {
                if self.trickle_ice {
                    if let Err(e) = self.signaling.send_ice_candidate(&candidate).await {
                        warn!("Failed to send ICE candidate for {}: {}", self.camera, e);
                    }
                }
                Ok(())
            }
            None => {
                debug!("All ICE candidates have been generated for {}", self.camera);
                self.inner.events.publish(ViewerEvent::IceGatheringComplete {
                    camera: self.camera.clone(),
                });

                if !self.trickle_ice && self.state == ViewerState::SignalingOpen {
                    let offer = self.peer.local_description().await.ok_or_else(|| {
                        AppError::WebRtcError("local description missing after gathering".to_string())
                    })?;
                    debug!("Sending SDP offer for {}", self.camera);
                    self.signaling.send_sdp_offer(&offer).await?;
                    self.transition(ViewerState::OfferSent);
                }
                Ok(())
            }
        }
    }

    async fn on_track(&mut self, stream: MediaStream) {
        if let Some(current) = &self.stream_id {
            if *current != stream.id {
                debug!("Ignoring track of second stream {}", stream.id);
                return;
            }
        }

        // Attach only while this session still owns the slot. A newer
        // selection clears the sink after taking the slot.
        let slot = self.inner.session.lock().await;
        let owns_slot = slot
            .as_ref()
            .is_some_and(|s| s.generation() == self.generation);
        if !owns_slot || !self.inner.is_current(self.generation) {
            debug!("Dropping track of superseded session for {}", self.camera);
            return;
        }
        self.stream_id = Some(stream.id.clone());

        for track in &stream.tracks {
            info!(
                "Received remote {} track {} ({}) for {}",
                track.kind, track.id, track.mime_type, self.camera
            );
            self.inner.events.publish(ViewerEvent::StreamStarted {
                camera: self.camera.clone(),
                stream_id: stream.id.clone(),
                track_id: track.id.clone(),
                kind: track.kind.to_string(),
                mime_type: track.mime_type.clone(),
            });
        }

        self.inner.sink.set_source(Some(stream)).await;
        drop(slot);

        if self.inner.is_current(self.generation) {
            self.inner.status.send_modify(|status| {
                status.loading = false;
                status.error = None;
            });
        }
        if self.state != ViewerState::Streaming {
            self.transition(ViewerState::Streaming);
        }
    }

    fn on_peer_state(&self, state: ConnectionState) {
        info!("Peer connection for {} is {}", self.camera, state);
        self.inner.events.publish(ViewerEvent::PeerStateChanged {
            camera: self.camera.clone(),
            state,
        });
    }

    async fn on_signaling_close(&mut self) {
        info!("Disconnected from signaling channel for {}", self.camera);
        self.inner.teardown_generation(self.generation).await;
    }

    async fn on_signaling_error(&mut self, message: String, fatal: bool) -> Flow {
        self.inner.events.publish(ViewerEvent::SignalingError {
            camera: self.camera.clone(),
            message: message.clone(),
            fatal,
        });

        if fatal {
            let err = AppError::Signaling(message);
            self.inner.report_error(&self.camera, self.generation, &err);
            self.inner.teardown_generation(self.generation).await;
            Flow::Stop
        } else {
            warn!("Signaling client error for {}: {}", self.camera, message);
            Flow::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::testing::{wait_until, FakeCloud, Harness};
    use crate::webrtc::{MediaKind, RemoteTrack};

    const CAMERA: &str = "A4DA2220000B";

    fn video_stream(id: &str) -> MediaStream {
        MediaStream::new(
            id,
            vec![RemoteTrack::detached("video0", MediaKind::Video, "video/H264")],
        )
    }

    async fn select_and_wait_for_offer(h: &Harness, camera: &str, channel: usize) {
        h.controller.select_camera(camera).await;
        wait_until("offer sent", || {
            h.connector
                .channel(channel)
                .is_some_and(|c| c.offers().len() == 1)
        })
        .await;
    }

    #[tokio::test]
    async fn test_end_to_end_camera_selection() {
        let h = Harness::new(FakeCloud::new(), WebRtcConfig::default());
        let mut events = h.controller.events().subscribe();

        select_and_wait_for_offer(&h, CAMERA, 0).await;

        let signaling = h.connector.channel(0).unwrap();
        let peer = h.peers.peer(0).unwrap();
        assert!(signaling.url().contains("X-Amz-Signature=sig^val"));
        assert!(signaling.url().contains("arn%3Aaws"));
        assert_eq!(h.current_state(), ViewerState::OfferSent);
        assert!(h.current_status().loading);

        assert_eq!(
            h.log.entries(),
            vec![
                "cloud.token".to_string(),
                format!("cloud.camera_info {}", CAMERA),
                "signaling.connect S1".to_string(),
                "peer.create P1".to_string(),
                "signaling.open S1".to_string(),
                "peer.create_offer P1".to_string(),
                "peer.set_local P1".to_string(),
                "signaling.send_offer S1".to_string(),
            ]
        );

        signaling.emit(SignalingEvent::SdpAnswer(SessionDescription::answer("v=0 answer")));
        wait_until("answer applied", || peer.remote().is_some()).await;
        wait_until("answered", || h.current_state() == ViewerState::Answered).await;

        peer.emit(PeerEvent::Track(video_stream("stream-1")));
        wait_until("sink assigned", || h.sink.source().is_some()).await;
        wait_until("streaming", || h.current_state() == ViewerState::Streaming).await;

        let status = h.current_status();
        assert!(!status.loading);
        assert!(status.error.is_none());
        assert_eq!(status.camera.as_deref(), Some(CAMERA));
        assert_eq!(h.sink.source().unwrap().id, "stream-1");

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.event_name());
        }
        assert_eq!(names.first(), Some(&"viewer.camera_selected"));
        assert!(names.contains(&"viewer.stream_started"));
    }

    #[tokio::test]
    async fn test_ice_servers_are_stun_then_turn() {
        let h = Harness::new(FakeCloud::new(), WebRtcConfig::default());
        select_and_wait_for_offer(&h, CAMERA, 0).await;

        let config = h.peers.config(0).unwrap();
        assert_eq!(config.ice_servers.len(), 3);
        assert_eq!(config.ice_servers[0].urls, vec!["stun:stun.example.com:443"]);
        assert!(config.ice_servers[0].username.is_none());
        for (i, server) in config.ice_servers[1..].iter().enumerate() {
            assert_eq!(server.username.as_deref(), Some(format!("user{}", i).as_str()));
            assert_eq!(server.credential.as_deref(), Some(format!("pass{}", i).as_str()));
        }
    }

    #[tokio::test]
    async fn test_insufficient_turn_creates_no_connection() {
        let h = Harness::new(FakeCloud::new().with_turn_count(1), WebRtcConfig::default());
        h.controller.select_camera(CAMERA).await;

        assert_eq!(h.log.count("signaling."), 0);
        assert_eq!(h.log.count("peer."), 0);
        assert!(h.controller.active_camera().await.is_none());

        let status = h.current_status();
        assert!(!status.loading);
        let message = status.error.unwrap();
        assert!(message.contains("Missing ICE URLs"));
    }

    #[tokio::test]
    async fn test_switch_closes_previous_exactly_once_first() {
        let h = Harness::new(FakeCloud::new(), WebRtcConfig::default());
        select_and_wait_for_offer(&h, CAMERA, 0).await;
        select_and_wait_for_offer(&h, "B0B0B0B0B0B0", 1).await;

        assert_eq!(h.log.count("signaling.close S1"), 1);
        assert_eq!(h.log.count("peer.close P1"), 1);

        let created = h.log.position("signaling.connect S2").unwrap();
        assert!(h.log.position("signaling.close S1").unwrap() < created);
        assert!(h.log.position("peer.close P1").unwrap() < created);

        // the old channel's close event must not reach the new session
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(h.log.count("signaling.close S2"), 0);
        assert_eq!(h.controller.active_camera().await.as_deref(), Some("B0B0B0B0B0B0"));
        assert_eq!(h.current_state(), ViewerState::OfferSent);
    }

    #[tokio::test]
    async fn test_teardown_without_session_is_noop() {
        let h = Harness::new(FakeCloud::new(), WebRtcConfig::default());
        h.controller.stop_current_viewer().await;
        h.controller.stop_current_viewer().await;

        assert!(h.log.entries().is_empty());
        assert_eq!(h.current_state(), ViewerState::Idle);
    }

    #[tokio::test]
    async fn test_stale_selection_is_abandoned() {
        let cloud = FakeCloud::new();
        let gate = cloud.gate("SLOWCAMERA00");
        let h = Harness::new(cloud, WebRtcConfig::default());

        let controller = h.controller.clone();
        let slow = tokio::spawn(async move { controller.select_camera("SLOWCAMERA00").await });
        wait_until("slow lookup started", || {
            h.log.count("cloud.camera_info SLOWCAMERA00") == 1
        })
        .await;

        select_and_wait_for_offer(&h, CAMERA, 0).await;

        gate.notify_one();
        slow.await.unwrap();

        assert_eq!(h.connector.channel_count(), 1);
        assert_eq!(h.peers.peer_count(), 1);
        assert_eq!(h.controller.active_camera().await.as_deref(), Some(CAMERA));

        let status = h.current_status();
        assert_eq!(status.camera.as_deref(), Some(CAMERA));
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_track_of_superseded_session_never_reaches_sink() {
        let h = Harness::new(FakeCloud::new(), WebRtcConfig::default());
        let mut events = h.controller.events().subscribe();
        select_and_wait_for_offer(&h, CAMERA, 0).await;

        let release = h.sink.hold_next_assignment();
        h.peers.peer(0).unwrap().emit(PeerEvent::Track(video_stream("stream-A")));
        wait_until("assignment in progress", || h.sink.held() == 1).await;

        let controller = h.controller.clone();
        let switch = tokio::spawn(async move { controller.select_camera("B0B0B0B0B0B0").await });
        loop {
            if let ViewerEvent::CameraSelected { camera, .. } = events.recv().await.unwrap() {
                if camera == "B0B0B0B0B0B0" {
                    break;
                }
            }
        }

        release.notify_one();
        wait_until("second offer sent", || {
            h.connector.channel(1).is_some_and(|c| c.offers().len() == 1)
        })
        .await;
        switch.await.unwrap();

        assert_eq!(h.controller.active_camera().await.as_deref(), Some("B0B0B0B0B0B0"));
        assert!(h.sink.source().is_none());
        assert_eq!(h.log.count("signaling.close S1"), 1);

        let status = h.current_status();
        assert_eq!(status.state, ViewerState::OfferSent);
        assert!(status.loading);
    }

    #[tokio::test]
    async fn test_signaling_close_tears_down_session() {
        let h = Harness::new(FakeCloud::new(), WebRtcConfig::default());
        select_and_wait_for_offer(&h, CAMERA, 0).await;

        h.connector.channel(0).unwrap().emit(SignalingEvent::Close);
        wait_until("closed", || h.current_state() == ViewerState::Closed).await;

        assert!(h.controller.active_camera().await.is_none());
        assert_eq!(h.log.count("signaling.close S1"), 1);
        assert_eq!(h.log.count("peer.close P1"), 1);
        assert!(!h.current_status().loading);
    }

    #[tokio::test]
    async fn test_signaling_error_policy() {
        let h = Harness::new(FakeCloud::new(), WebRtcConfig::default());
        select_and_wait_for_offer(&h, CAMERA, 0).await;
        let signaling = h.connector.channel(0).unwrap();

        signaling.emit(SignalingEvent::Error {
            message: "bad frame".to_string(),
            fatal: false,
        });
        signaling.emit(SignalingEvent::SdpAnswer(SessionDescription::answer("v=0")));
        wait_until("answered", || h.current_state() == ViewerState::Answered).await;
        assert!(h.current_status().error.is_none());
        assert!(h.controller.active_camera().await.is_some());

        signaling.emit(SignalingEvent::Error {
            message: "socket reset".to_string(),
            fatal: true,
        });
        wait_until("closed", || h.current_state() == ViewerState::Closed).await;
        assert!(h.controller.active_camera().await.is_none());
        assert_eq!(
            h.current_status().error.as_deref(),
            Some("Error: Signaling error: socket reset")
        );
    }

    #[tokio::test]
    async fn test_trickle_sends_local_candidates() {
        let h = Harness::new(FakeCloud::new(), WebRtcConfig::default());
        select_and_wait_for_offer(&h, CAMERA, 0).await;

        let peer = h.peers.peer(0).unwrap();
        peer.emit(PeerEvent::IceCandidate(Some(
            IceCandidate::new("candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host").with_mid("0", 0),
        )));
        peer.emit(PeerEvent::IceCandidate(None));

        let signaling = h.connector.channel(0).unwrap();
        wait_until("candidate sent", || signaling.candidates().len() == 1).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(signaling.offers().len(), 1);
        assert_eq!(signaling.candidates().len(), 1);
    }

    #[tokio::test]
    async fn test_non_trickle_sends_offer_after_gathering() {
        let config = WebRtcConfig {
            trickle_ice: false,
            ..Default::default()
        };
        let h = Harness::new(FakeCloud::new(), config);
        h.controller.select_camera(CAMERA).await;

        wait_until("local description set", || h.log.count("peer.set_local P1") == 1).await;
        let signaling = h.connector.channel(0).unwrap();
        let peer = h.peers.peer(0).unwrap();
        assert!(signaling.offers().is_empty());
        assert_eq!(h.current_state(), ViewerState::SignalingOpen);

        peer.emit(PeerEvent::IceCandidate(Some(IceCandidate::new(
            "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host",
        ))));
        peer.emit(PeerEvent::IceCandidate(None));

        wait_until("offer sent", || signaling.offers().len() == 1).await;
        assert!(signaling.candidates().is_empty());
        assert_eq!(h.current_state(), ViewerState::OfferSent);
        assert_eq!(signaling.offers()[0], peer.local().unwrap());
    }

    #[tokio::test]
    async fn test_remote_candidates_wait_for_answer() {
        let h = Harness::new(FakeCloud::new(), WebRtcConfig::default());
        select_and_wait_for_offer(&h, CAMERA, 0).await;
        let signaling = h.connector.channel(0).unwrap();
        let peer = h.peers.peer(0).unwrap();

        signaling.emit(SignalingEvent::IceCandidate(IceCandidate::new(
            "candidate:2 1 udp 1686052607 203.0.113.7 40000 typ srflx",
        )));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(peer.candidates().is_empty());

        signaling.emit(SignalingEvent::SdpAnswer(SessionDescription::answer("v=0")));
        wait_until("candidate applied", || peer.candidates().len() == 1).await;

        signaling.emit(SignalingEvent::IceCandidate(IceCandidate::new(
            "candidate:3 1 udp 41885439 198.51.100.1 3478 typ relay",
        )));
        wait_until("second candidate applied", || peer.candidates().len() == 2).await;
    }

    #[tokio::test]
    async fn test_setup_failure_reports_error() {
        let h = Harness::new(FakeCloud::new().with_login_failure(), WebRtcConfig::default());
        h.controller.select_camera(CAMERA).await;

        let status = h.current_status();
        assert!(!status.loading);
        assert_eq!(
            status.error.as_deref(),
            Some("Error: Authentication failed: invalid password")
        );
        assert_eq!(h.log.count("signaling."), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let h = Harness::new(FakeCloud::new(), WebRtcConfig::default());
        select_and_wait_for_offer(&h, CAMERA, 0).await;
        h.peers.peer(0).unwrap().emit(PeerEvent::Track(video_stream("stream-1")));
        wait_until("sink assigned", || h.sink.source().is_some()).await;

        h.controller.shutdown().await;

        assert!(h.controller.active_camera().await.is_none());
        assert!(h.sink.source().is_none());
        assert_eq!(h.log.count("signaling.close S1"), 1);
        assert_eq!(h.log.count("peer.close P1"), 1);
        assert_eq!(h.current_state(), ViewerState::Closed);
    }
}
