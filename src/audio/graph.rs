// Capture -> mixer -> playback routing for a live session
//
// One mixing sink produces the recordable composite. The microphone feeds
// ONLY the mixer, never the playback destination, so the candidate does not
// hear themselves. Each decoded agent buffer feeds BOTH the playback
// destination and the mixer; that dual connection is what yields a single
// composite recording without an audio loopback device.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::codec::PcmBuffer;
use super::devices::CaptureBlock;
use super::playback::{PlaybackClock, PlaybackScheduler, ScheduledSource};
use crate::error::SessionError;

/// Which stream a mix-domain frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MixSource {
    Microphone,
    Agent,
}

/// Float-domain frame inside the mixing graph.
#[derive(Debug, Clone)]
pub struct MixFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub timestamp_ms: u64,
    pub source: MixSource,
}

/// An agent buffer together with its playback placement, delivered to the
/// output device.
#[derive(Debug, Clone)]
pub struct ScheduledBuffer {
    pub placement: ScheduledSource,
    pub buffer: PcmBuffer,
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Rate of the composite mix (the agent's output rate)
    pub mix_rate: u32,
    /// Frames older than this are dropped to bound buffering
    pub max_buffer_delay_ms: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            mix_rate: 24_000,
            max_buffer_delay_ms: 400,
        }
    }
}

/// Cloneable handle to the session's audio graph.
#[derive(Clone)]
pub struct AudioGraph {
    mixer_tx: mpsc::Sender<MixFrame>,
    speaker_tx: mpsc::Sender<ScheduledBuffer>,
    scheduler: Arc<Mutex<PlaybackScheduler>>,
    mix_rate: u32,
}

impl AudioGraph {
    /// Build the graph and spawn its mixer task.
    ///
    /// Returns the handle, the composite stream for the recorder, and the
    /// playback destination stream for the output device. Fails fast on a
    /// config that cannot produce a mix; the caller stops any acquired
    /// tracks before surfacing the error.
    pub fn build(
        config: GraphConfig,
        clock: Arc<dyn PlaybackClock>,
    ) -> Result<
        (
            AudioGraph,
            mpsc::Receiver<MixFrame>,
            mpsc::Receiver<ScheduledBuffer>,
        ),
        SessionError,
    > {
        if config.mix_rate == 0 {
            return Err(SessionError::Config("mix rate must be non-zero".into()));
        }

        let (mixer_tx, mixer_rx) = mpsc::channel(256);
        let (composite_tx, composite_rx) = mpsc::channel(256);
        let (speaker_tx, speaker_rx) = mpsc::channel(64);

        let mixer = Mixer::new(config.clone());
        tokio::spawn(mixer.run(mixer_rx, composite_tx));

        info!("Audio graph built: mix rate {}Hz", config.mix_rate);

        Ok((
            AudioGraph {
                mixer_tx,
                speaker_tx,
                scheduler: Arc::new(Mutex::new(PlaybackScheduler::new(clock))),
                mix_rate: config.mix_rate,
            },
            composite_rx,
            speaker_rx,
        ))
    }

    /// Route one microphone block into the mixer (and nowhere else).
    pub async fn push_mic(&self, block: CaptureBlock) {
        let samples = resample_linear(&block.samples, block.sample_rate, self.mix_rate);
        let frame = MixFrame {
            samples,
            sample_rate: self.mix_rate,
            timestamp_ms: block.timestamp_ms,
            source: MixSource::Microphone,
        };
        if self.mixer_tx.send(frame).await.is_err() {
            debug!("Mixer closed, dropping microphone block");
        }
    }

    /// Schedule one decoded agent buffer for playback AND feed it to the
    /// mixer so the recording captures the agent's voice.
    pub async fn play_agent(&self, buffer: PcmBuffer) -> ScheduledSource {
        let placement = {
            let mut scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
            scheduler.schedule(&buffer)
        };

        // Playback destination: lossy on purpose. If the output device is
        // not draining we drop rather than stall the inbound protocol task.
        if self
            .speaker_tx
            .try_send(ScheduledBuffer {
                placement: placement.clone(),
                buffer: buffer.clone(),
            })
            .is_err()
        {
            warn!("Playback destination not draining, dropping agent buffer");
        }

        let frame = MixFrame {
            samples: buffer.samples,
            sample_rate: buffer.sample_rate,
            timestamp_ms: (placement.start_secs * 1000.0) as u64,
            source: MixSource::Agent,
        };
        if self.mixer_tx.send(frame).await.is_err() {
            debug!("Mixer closed, dropping agent buffer");
        }

        placement
    }

    /// Barge-in: cut off everything scheduled and rewind the cursor.
    pub fn interrupt(&self) -> usize {
        let mut scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
        scheduler.interrupt()
    }

    pub fn active_playback_count(&self) -> usize {
        let mut scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
        scheduler.active_count()
    }

    pub fn playback_cursor_secs(&self) -> f64 {
        let scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
        scheduler.cursor_secs()
    }
}

/// Linear-interpolation rate conversion for mono float samples.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }

    let out_len = (input.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = input[idx.min(input.len() - 1)];
            let b = input[(idx + 1).min(input.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// The mixing sink: buffers frames per source, aligns them by timestamp,
/// and sums with saturation into composite output frames.
///
/// Staleness is tracked per source: microphone timestamps are capture
/// relative while agent timestamps follow the playback clock, so the two
/// timebases must never bound each other.
struct Mixer {
    config: GraphConfig,
    buffers: HashMap<MixSource, VecDeque<MixFrame>>,
    positions: HashMap<MixSource, u64>,
}

impl Mixer {
    fn new(config: GraphConfig) -> Self {
        let mut buffers = HashMap::new();
        buffers.insert(MixSource::Microphone, VecDeque::new());
        buffers.insert(MixSource::Agent, VecDeque::new());

        Self {
            config,
            buffers,
            positions: HashMap::new(),
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<MixFrame>, tx: mpsc::Sender<MixFrame>) {
        debug!("Mixer task started");

        while let Some(frame) = rx.recv().await {
            self.buffer_frame(frame);

            if let Some(mixed) = self.mix_next_chunk() {
                if tx.send(mixed).await.is_err() {
                    debug!("Composite consumer gone, stopping mixer");
                    return;
                }
            }
        }

        // Flush whatever is still buffered once inputs close
        while let Some(mixed) = self.mix_next_chunk() {
            if tx.send(mixed).await.is_err() {
                break;
            }
        }

        debug!("Mixer task stopped");
    }

    fn buffer_frame(&mut self, frame: MixFrame) {
        if frame.sample_rate != self.config.mix_rate {
            warn!(
                "Frame sample rate mismatch: expected {}, got {}. Dropping frame.",
                self.config.mix_rate, frame.sample_rate
            );
            return;
        }

        if let Some(buffer) = self.buffers.get_mut(&frame.source) {
            buffer.push_back(frame);
        }

        self.cleanup_old_frames();
    }

    fn cleanup_old_frames(&mut self) {
        for (source, buffer) in &mut self.buffers {
            let position = self.positions.get(source).copied().unwrap_or(0);
            let cutoff = position.saturating_sub(self.config.max_buffer_delay_ms);

            while let Some(frame) = buffer.front() {
                if frame.timestamp_ms < cutoff {
                    warn!(
                        "Dropping old {:?} frame at {}ms (position {}ms)",
                        source, frame.timestamp_ms, position
                    );
                    buffer.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    fn mix_next_chunk(&mut self) -> Option<MixFrame> {
        let mut frames: Vec<MixFrame> = Vec::new();
        for buffer in self.buffers.values_mut() {
            if let Some(frame) = buffer.pop_front() {
                frames.push(frame);
            }
        }

        if frames.is_empty() {
            return None;
        }

        for frame in &frames {
            self.positions.insert(frame.source, frame.timestamp_ms);
        }

        if frames.len() == 1 {
            return frames.into_iter().next();
        }

        Some(self.mix_frames(&frames))
    }

    fn mix_frames(&self, frames: &[MixFrame]) -> MixFrame {
        let timestamp_ms = frames.iter().map(|f| f.timestamp_ms).min().unwrap_or(0);
        let max_len = frames.iter().map(|f| f.samples.len()).max().unwrap_or(0);

        let mut samples = Vec::with_capacity(max_len);
        for i in 0..max_len {
            let sum: f32 = frames
                .iter()
                .map(|f| f.samples.get(i).copied().unwrap_or(0.0))
                .sum();
            samples.push(sum.clamp(-1.0, 1.0));
        }

        MixFrame {
            samples,
            sample_rate: self.config.mix_rate,
            timestamp_ms,
            source: MixSource::Agent,
        }
    }
}
