// Device stream ownership for a live session
//
// Tracks must be stopped explicitly on every teardown path; a track left
// running keeps the OS capture indicator lit after the session ends. The
// provider trait keeps acquisition behind a seam so the engine runs against
// real capture hardware or fixture-backed fakes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::file::AudioFixture;
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Handle to one device track. Cloneable so the orchestrator can keep a
/// stop handle while the capture pump owns the data side.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    kind: TrackKind,
    label: String,
    stopped: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Stop the track. Idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("Stopped {} track: {}", kind_name(self.kind), self.label);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

fn kind_name(kind: TrackKind) -> &'static str {
    match kind {
        TrackKind::Audio => "audio",
        TrackKind::Video => "video",
    }
}

/// Fixed-size block of float samples from the microphone.
#[derive(Debug, Clone)]
pub struct CaptureBlock {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub timestamp_ms: u64,
}

/// One already-encoded frame from the camera (opaque payload).
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub timestamp_ms: u64,
}

/// The device streams owned by one session: microphone always, camera in
/// video mode only. Never shared across sessions.
pub struct DeviceStreams {
    pub mic_track: MediaTrack,
    pub mic_rx: mpsc::Receiver<CaptureBlock>,
    pub camera_track: Option<MediaTrack>,
    pub camera_rx: Option<mpsc::Receiver<VideoFrame>>,
}

impl DeviceStreams {
    /// Stop handles for every acquired track.
    pub fn tracks(&self) -> Vec<MediaTrack> {
        let mut tracks = vec![self.mic_track.clone()];
        if let Some(camera) = &self.camera_track {
            tracks.push(camera.clone());
        }
        tracks
    }
}

/// Acquires device streams for a session.
///
/// Permission denial surfaces as `DevicePermissionDenied`; implementations
/// must stop any partially-acquired track before returning an error.
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    async fn acquire(&self, video: bool) -> Result<DeviceStreams, SessionError>;
}

/// Fixture-backed provider: plays a WAV file as the microphone and, in
/// video mode, synthesizes opaque camera frames. Used by the driver binary
/// and the integration tests (the teacher keeps a file source around for
/// exactly this purpose).
pub struct FixtureDevices {
    mic_samples: Vec<f32>,
    sample_rate: u32,
    block_size: usize,
    /// Pace block delivery in real time (binary) or flat out (tests)
    paced: bool,
}

impl FixtureDevices {
    pub fn from_fixture(
        fixture: &AudioFixture,
        capture_rate: u32,
        block_size: usize,
        paced: bool,
    ) -> Result<Self, SessionError> {
        let mic_samples = fixture
            .mono_f32_at(capture_rate)
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;

        Ok(Self {
            mic_samples,
            sample_rate: capture_rate,
            block_size,
            paced,
        })
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, block_size: usize) -> Self {
        Self {
            mic_samples: samples,
            sample_rate,
            block_size,
            paced: false,
        }
    }
}

#[async_trait]
impl DeviceProvider for FixtureDevices {
    async fn acquire(&self, video: bool) -> Result<DeviceStreams, SessionError> {
        let mic_track = MediaTrack::new(TrackKind::Audio, "fixture-mic");
        let (mic_tx, mic_rx) = mpsc::channel(64);

        let samples = self.mic_samples.clone();
        let block_size = self.block_size;
        let sample_rate = self.sample_rate;
        let paced = self.paced;
        let track = mic_track.clone();

        tokio::spawn(async move {
            let block_ms = (block_size as u64 * 1000) / sample_rate as u64;
            let mut timestamp_ms = 0u64;

            for chunk in samples.chunks(block_size) {
                if track.is_stopped() {
                    break;
                }

                let block = CaptureBlock {
                    samples: chunk.to_vec(),
                    sample_rate,
                    timestamp_ms,
                };
                if mic_tx.send(block).await.is_err() {
                    break;
                }
                timestamp_ms += block_ms;

                if paced {
                    tokio::time::sleep(Duration::from_millis(block_ms)).await;
                }
            }
            debug!("Fixture microphone drained");
        });

        let (camera_track, camera_rx) = if video {
            let track = MediaTrack::new(TrackKind::Video, "fixture-camera");
            let (cam_tx, cam_rx) = mpsc::channel(16);

            let cam_track = track.clone();
            let paced = self.paced;
            tokio::spawn(async move {
                // ~5 fps of opaque placeholder frames
                let mut timestamp_ms = 0u64;
                for i in 0u32..25 {
                    if cam_track.is_stopped() {
                        break;
                    }
                    let frame = VideoFrame {
                        data: i.to_le_bytes().to_vec(),
                        timestamp_ms,
                    };
                    if cam_tx.send(frame).await.is_err() {
                        break;
                    }
                    timestamp_ms += 200;
                    if paced {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                }
            });

            (Some(track), Some(cam_rx))
        } else {
            (None, None)
        };

        Ok(DeviceStreams {
            mic_track,
            mic_rx,
            camera_track,
            camera_rx,
        })
    }
}

/// Provider that always denies permission (tests the fail-fast path).
pub struct DeniedDevices;

#[async_trait]
impl DeviceProvider for DeniedDevices {
    async fn acquire(&self, _video: bool) -> Result<DeviceStreams, SessionError> {
        Err(SessionError::DevicePermissionDenied(
            "user denied capture permission".to_string(),
        ))
    }
}
