//! Remote media tracks and streams

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A track received from the camera
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: MediaKind,
    /// Negotiated codec (e.g. "video/H264")
    pub mime_type: String,
    /// Underlying RTP source; absent for tracks that carry no media
    pub remote: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    /// Describe a track without an RTP source
    pub fn detached(id: impl Into<String>, kind: MediaKind, mime_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            mime_type: mime_type.into(),
            remote: None,
        }
    }

    pub fn from_remote(track: Arc<TrackRemote>) -> Option<Self> {
        let kind = match track.kind() {
            RTPCodecType::Audio => MediaKind::Audio,
            RTPCodecType::Video => MediaKind::Video,
            _ => return None,
        };
        Some(Self {
            id: track.id(),
            kind,
            mime_type: track.codec().capability.mime_type,
            remote: Some(track),
        })
    }
}

impl std::fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("mime_type", &self.mime_type)
            .field("attached", &self.remote.is_some())
            .finish()
    }
}

/// Remote media stream, as delivered by a track event
#[derive(Debug, Clone)]
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<RemoteTrack>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<RemoteTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &RemoteTrack> {
        self.tracks.iter().filter(|t| t.kind == MediaKind::Video)
    }
}
