// Chunked recording of the composite session stream
//
// The recorder drains the mixer's composite frames (plus the camera track
// in video mode) into encoded chunks, kept in production order. Assembly is
// pure concatenation: the first chunk carries the container header, so the
// joined chunks ARE the artifact. The final chunk only exists after the
// drain task acknowledges the stop signal; stop() awaits that ack.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::codec::samples_to_i16_bytes;
use super::devices::VideoFrame;
use super::graph::MixFrame;

/// Encoding of the assembled artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Voice session: streaming WAV (mono S16LE)
    Audio,
    /// Video session: interleaved container of audio blocks + camera frames
    AudioVideo,
}

impl ArtifactKind {
    pub fn mime(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio/wav",
            ArtifactKind::AudioVideo => "video/x-interleaved",
        }
    }
}

/// The assembled recording. Immutable once produced; ownership moves to the
/// orchestrator and then to the surrounding application.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    pub kind: ArtifactKind,
    pub data: Vec<u8>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub kind: ArtifactKind,
    pub sample_rate: u32,
    pub chunk_duration_secs: u64,
}

/// Record framing inside the interleaved (video) container.
const TRACK_AUDIO: u8 = 0x01;
const TRACK_VIDEO: u8 = 0x02;
const ILV_MAGIC: &[u8; 4] = b"ILV1";

pub struct ChunkedRecorder;

impl ChunkedRecorder {
    /// Begin chunked recording of the composite stream. The returned handle
    /// is the only way to stop the recorder and obtain the artifact.
    pub fn start(
        config: RecorderConfig,
        composite_rx: mpsc::Receiver<MixFrame>,
        video_rx: Option<mpsc::Receiver<VideoFrame>>,
    ) -> RecorderHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let kind = config.kind;

        info!(
            "Chunked recorder started: {:?} ({}s chunks)",
            kind, config.chunk_duration_secs
        );

        let task = tokio::spawn(drain(config, composite_rx, video_rx, stop_rx));

        RecorderHandle {
            kind,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Handle to a running (or finished) recorder.
pub struct RecorderHandle {
    kind: ArtifactKind,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<(Vec<Vec<u8>>, u64)>>,
}

impl RecorderHandle {
    /// A handle that was never started; stop() on it is a no-op.
    pub fn inert(kind: ArtifactKind) -> Self {
        Self {
            kind,
            stop_tx: None,
            task: None,
        }
    }

    /// Stop recording, await the final-chunk flush, and assemble the
    /// artifact. Returns `None` if no data was ever produced, or on any
    /// repeated call. Never an error: stopping an already-stopped or
    /// never-started recorder is a no-op.
    pub async fn stop(&mut self) -> Option<RecordingArtifact> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The drain task may already have exited (inputs closed)
            let _ = stop_tx.send(());
        }

        let task = self.task.take()?;
        let (chunks, duration_ms) = match task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Recorder task panicked: {}", e);
                return None;
            }
        };

        if chunks.is_empty() {
            info!("Recorder produced no data, no artifact assembled");
            return None;
        }

        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let mut data = Vec::with_capacity(total);
        for chunk in &chunks {
            data.extend_from_slice(chunk);
        }

        info!(
            "Recording assembled: {} chunks, {} bytes, {:.1}s, {}",
            chunks.len(),
            data.len(),
            duration_ms as f64 / 1000.0,
            self.kind.mime()
        );

        Some(RecordingArtifact {
            kind: self.kind,
            data,
            duration_ms,
        })
    }
}

async fn drain(
    config: RecorderConfig,
    mut composite_rx: mpsc::Receiver<MixFrame>,
    video_rx: Option<mpsc::Receiver<VideoFrame>>,
    mut stop_rx: oneshot::Receiver<()>,
) -> (Vec<Vec<u8>>, u64) {
    let mut encoder = ChunkEncoder::new(config);
    let mut video_rx = video_rx;
    let mut audio_open = true;
    let mut video_open = video_rx.is_some();

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                debug!("Recorder received stop signal");
                break;
            }
            frame = composite_rx.recv(), if audio_open => {
                match frame {
                    Some(frame) => encoder.push_audio(&frame),
                    None => audio_open = false,
                }
            }
            frame = async { video_rx.as_mut().unwrap().recv().await }, if video_open => {
                match frame {
                    Some(frame) => encoder.push_video(&frame),
                    None => video_open = false,
                }
            }
            else => break,
        }
    }

    // Frames already queued when the stop signal landed belong to the
    // recording; pull them before flushing the final chunk.
    while let Ok(frame) = composite_rx.try_recv() {
        encoder.push_audio(&frame);
    }
    if let Some(rx) = video_rx.as_mut() {
        while let Ok(frame) = rx.try_recv() {
            encoder.push_video(&frame);
        }
    }

    encoder.finish()
}

/// Encodes composite frames into self-concatenating chunks.
struct ChunkEncoder {
    config: RecorderConfig,
    chunks: Vec<Vec<u8>>,
    current: Vec<u8>,
    header_written: bool,
    samples_in_chunk: u64,
    total_samples: u64,
}

impl ChunkEncoder {
    fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            chunks: Vec::new(),
            current: Vec::new(),
            header_written: false,
            samples_in_chunk: 0,
            total_samples: 0,
        }
    }

    fn push_audio(&mut self, frame: &MixFrame) {
        self.ensure_header();
        self.maybe_rotate();

        let bytes = samples_to_i16_bytes(&frame.samples);
        match self.config.kind {
            ArtifactKind::Audio => self.current.extend_from_slice(&bytes),
            ArtifactKind::AudioVideo => self.write_record(TRACK_AUDIO, &bytes),
        }

        self.samples_in_chunk += frame.samples.len() as u64;
        self.total_samples += frame.samples.len() as u64;
    }

    fn push_video(&mut self, frame: &VideoFrame) {
        if self.config.kind != ArtifactKind::AudioVideo {
            return;
        }
        self.ensure_header();
        self.write_record(TRACK_VIDEO, &frame.data);
    }

    fn write_record(&mut self, tag: u8, payload: &[u8]) {
        self.current.push(tag);
        self.current
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.current.extend_from_slice(payload);
    }

    /// Lazily open chunk 0 with the container header, so an aborted session
    /// with no data produces no chunks at all.
    fn ensure_header(&mut self) {
        if self.header_written {
            return;
        }
        match self.config.kind {
            ArtifactKind::Audio => {
                let header = streaming_wav_header(self.config.sample_rate);
                self.current.extend_from_slice(&header);
            }
            ArtifactKind::AudioVideo => {
                self.current.extend_from_slice(ILV_MAGIC);
            }
        }
        self.header_written = true;
    }

    fn maybe_rotate(&mut self) {
        let chunk_samples = self.config.chunk_duration_secs * self.config.sample_rate as u64;
        if chunk_samples > 0 && self.samples_in_chunk >= chunk_samples && !self.current.is_empty() {
            debug!(
                "Rotating chunk {} ({} bytes)",
                self.chunks.len(),
                self.current.len()
            );
            self.chunks.push(std::mem::take(&mut self.current));
            self.samples_in_chunk = 0;
        }
    }

    fn finish(mut self) -> (Vec<Vec<u8>>, u64) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
        }

        let duration_ms = if self.config.sample_rate > 0 {
            self.total_samples * 1000 / self.config.sample_rate as u64
        } else {
            0
        };

        debug!(
            "Recorder flushed: {} chunks, {:.1}s of audio",
            self.chunks.len(),
            duration_ms as f64 / 1000.0
        );

        (self.chunks, duration_ms)
    }
}

/// 44-byte RIFF/WAVE header with unknown-length size fields, the streaming
/// convention: size slots hold 0xFFFFFFFF because the total is not known
/// while chunks are still being produced.
fn streaming_wav_header(sample_rate: u32) -> [u8; 44] {
    let mut header = [0u8; 44];
    let channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * block_align as u32;

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&u32::MAX.to_le_bytes());

    header
}
