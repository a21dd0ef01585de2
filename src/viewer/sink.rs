//! Video sink: where remote media ends up
//!
//! The controller only assigns and clears the sink's source. `TrackSink`
//! drains the RTP of every attached track and can record H.264 and Opus to
//! disk.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rtp::packet::Packet;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::media::io::h264_writer::H264Writer;
use webrtc::media::io::ogg_writer::OggWriter;
use webrtc::media::io::Writer;
use webrtc::track::track_remote::TrackRemote;

use crate::error::{AppError, Result};
use crate::webrtc::{MediaStream, RemoteTrack};

/// Opus always runs at 48 kHz on the wire
const OPUS_SAMPLE_RATE: u32 = 48_000;
const OPUS_CHANNELS: u8 = 2;

/// Packets buffered between a track reader and its recorder
const RECORDER_QUEUE: usize = 256;

/// An object whose media source can be assigned and cleared
#[async_trait]
pub trait VideoSink: Send + Sync {
    /// Assign (`Some`) or clear (`None`) the source
    async fn set_source(&self, source: Option<MediaStream>);

    async fn has_source(&self) -> bool;
}

/// File extension for a recordable codec
fn recording_extension(mime_type: &str) -> Option<&'static str> {
    match mime_type.to_ascii_lowercase().as_str() {
        "video/h264" => Some("h264"),
        "audio/opus" => Some("ogg"),
        _ => None,
    }
}

/// Writes RTP of one track to a file
///
/// All methods do blocking file I/O; `spawn` runs them on the blocking pool.
struct TrackRecorder {
    path: PathBuf,
    writer: Box<dyn Writer + Send>,
}

impl TrackRecorder {
    /// Open a recorder for a track, if its codec can be recorded
    fn open(dir: &Path, stream_id: &str, track: &RemoteTrack) -> Result<Option<Self>> {
        let Some(ext) = recording_extension(&track.mime_type) else {
            return Ok(None);
        };

        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "{}_{}_{}.{}",
            sanitize(stream_id),
            track.kind,
            chrono::Local::now().format("%Y%m%d-%H%M%S"),
            ext
        ));
        let file = File::create(&path)?;

        let writer: Box<dyn Writer + Send> = match ext {
            "h264" => Box::new(H264Writer::new(file)),
            _ => Box::new(
                OggWriter::new(file, OPUS_SAMPLE_RATE, OPUS_CHANNELS)
                    .map_err(|e| AppError::WebRtcError(format!("Failed to open ogg writer: {}", e)))?,
            ),
        };

        info!("Recording {} track {} to {}", track.kind, track.id, path.display());
        Ok(Some(Self { path, writer }))
    }

    /// Record a track on the blocking pool
    ///
    /// Returns `None` for codecs that cannot be recorded.
    fn spawn(dir: PathBuf, stream_id: String, track: RemoteTrack) -> Option<RecorderFeed> {
        recording_extension(&track.mime_type)?;

        let (tx, mut rx) = mpsc::channel::<Packet>(RECORDER_QUEUE);
        let task = tokio::task::spawn_blocking(move || {
            let mut recorder = match TrackRecorder::open(&dir, &stream_id, &track) {
                Ok(Some(recorder)) => recorder,
                Ok(None) => return None,
                Err(e) => {
                    warn!("Cannot record {} track {}: {}", track.kind, track.id, e);
                    return None;
                }
            };

            while let Some(packet) = rx.blocking_recv() {
                if let Err(e) = recorder.write_packet(&packet) {
                    warn!("{}; recording stopped", e);
                    break;
                }
            }

            let path = recorder.path.clone();
            recorder.close();
            Some(path)
        });

        Some(RecorderFeed { tx, task })
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.writer
            .write_rtp(packet)
            .map_err(|e| AppError::WebRtcError(format!("Failed to write {}: {}", self.path.display(), e)))
    }

    fn close(mut self) {
        if let Err(e) = self.writer.close() {
            warn!("Failed to finish {}: {}", self.path.display(), e);
        }
    }
}

/// Sending half of a recorder running on the blocking pool
struct RecorderFeed {
    tx: mpsc::Sender<Packet>,
    task: JoinHandle<Option<PathBuf>>,
}

impl RecorderFeed {
    /// Queue a packet; false once the recorder has stopped
    async fn push(&self, packet: Packet) -> bool {
        self.tx.send(packet).await.is_ok()
    }

    /// Stop feeding and wait for the file to be finished
    async fn finish(self) -> Option<PathBuf> {
        drop(self.tx);
        match self.task.await {
            Ok(path) => path,
            Err(e) => {
                warn!("Recorder task failed: {}", e);
                None
            }
        }
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "stream".to_string()
    } else {
        cleaned
    }
}

/// Read RTP from one remote track until cancelled or the track ends
async fn drain_track(
    track: Arc<TrackRemote>,
    mut recorder: Option<RecorderFeed>,
    packets: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let track_id = track.id();
    let mut count: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = track.read_rtp() => match result {
                Ok((packet, _)) => {
                    count += 1;
                    packets.fetch_add(1, Ordering::Relaxed);
                    if let Some(feed) = recorder.as_ref() {
                        if !feed.push(packet).await {
                            if let Some(feed) = recorder.take() {
                                feed.finish().await;
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!("Track {} ended: {}", track_id, e);
                    break;
                }
            },
        }
    }

    if let Some(feed) = recorder {
        if let Some(path) = feed.finish().await {
            debug!("Finished recording {}", path.display());
        }
    }
    debug!("Reader for track {} stopped after {} packets", track_id, count);
}

#[derive(Default)]
struct SinkState {
    source: Option<MediaStream>,
    cancel: CancellationToken,
    readers: Vec<JoinHandle<()>>,
}

impl SinkState {
    fn stop_readers(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.readers.clear();
    }
}

/// Sink that consumes remote tracks, optionally recording them
pub struct TrackSink {
    output_dir: Option<PathBuf>,
    state: Mutex<SinkState>,
    packets: Arc<AtomicU64>,
}

impl TrackSink {
    pub fn new(output_dir: Option<PathBuf>) -> Self {
        Self {
            output_dir,
            state: Mutex::new(SinkState::default()),
            packets: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current source, with every track attached so far
    pub async fn source(&self) -> Option<MediaStream> {
        self.state.lock().await.source.clone()
    }

    /// RTP packets received over the sink's lifetime
    pub fn packets_received(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    fn start_reader(&self, state: &mut SinkState, stream_id: &str, track: &RemoteTrack) {
        let Some(remote) = track.remote.clone() else {
            return;
        };

        let recorder = self.output_dir.as_ref().and_then(|dir| {
            TrackRecorder::spawn(dir.clone(), stream_id.to_string(), track.clone())
        });
        if recorder.is_none() && self.output_dir.is_some() {
            debug!("Codec {} is drained without recording", track.mime_type);
        }

        state.readers.push(tokio::spawn(drain_track(
            remote,
            recorder,
            self.packets.clone(),
            state.cancel.clone(),
        )));
    }
}

impl Default for TrackSink {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl VideoSink for TrackSink {
    async fn set_source(&self, source: Option<MediaStream>) {
        let mut state = self.state.lock().await;

        let Some(stream) = source else {
            if state.source.take().is_some() {
                debug!("Sink source cleared");
            }
            state.stop_readers();
            return;
        };

        let same_stream = state
            .source
            .as_ref()
            .is_some_and(|current| current.id == stream.id);
        if !same_stream {
            state.stop_readers();
            state.source = Some(MediaStream::new(stream.id.clone(), Vec::new()));
            info!("Sink attached to stream {}", stream.id);
        }

        for track in stream.tracks {
            let known = state
                .source
                .as_ref()
                .is_some_and(|s| s.tracks.iter().any(|t| t.id == track.id));
            if known {
                continue;
            }
            self.start_reader(&mut state, &stream.id, &track);
            if let Some(current) = state.source.as_mut() {
                current.tracks.push(track);
            }
        }
    }

    async fn has_source(&self) -> bool {
        self.state.lock().await.source.is_some()
    }
}

impl Drop for TrackSink {
    fn drop(&mut self) {
        self.state.get_mut().cancel.cancel();
    }
}
