// Playback scheduling for inbound agent audio
//
// Frames arrive over the network at irregular intervals but must play back
// gap-free and strictly sequential. Each buffer is scheduled at
// max(cursor, clock-now) and the cursor advances by the buffer's duration.
// Playing frames "immediately" instead produces overlapping, jumbled audio.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::codec::PcmBuffer;

/// Clock of the playback context. Behind a trait so tests control time.
pub trait PlaybackClock: Send + Sync {
    /// Seconds since the playback context was created.
    fn now_secs(&self) -> f64;
}

/// Wall-clock playback time, anchored at context creation.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock for SystemClock {
    fn now_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Test clock advanced by hand. Stored as microseconds in an atomic so the
/// handle is cheaply shareable across tasks.
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            micros: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, secs: f64) {
        self.micros
            .fetch_add((secs * 1_000_000.0) as u64, Ordering::SeqCst);
    }

    pub fn set(&self, secs: f64) {
        self.micros
            .store((secs * 1_000_000.0) as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock for ManualClock {
    fn now_secs(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}

/// One buffer scheduled on the playback destination.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSource {
    pub id: u64,
    pub start_secs: f64,
    pub duration_secs: f64,
}

impl ScheduledSource {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }
}

/// Sequences inbound buffers onto the playback timeline and tracks which
/// sources are still live so an interruption can cut them all off.
pub struct PlaybackScheduler {
    clock: Arc<dyn PlaybackClock>,
    next_start: f64,
    next_id: u64,
    sources: HashMap<u64, ScheduledSource>,
}

impl PlaybackScheduler {
    pub fn new(clock: Arc<dyn PlaybackClock>) -> Self {
        Self {
            clock,
            next_start: 0.0,
            next_id: 0,
            sources: HashMap::new(),
        }
    }

    /// Schedule one decoded buffer. Returns the placement so the caller can
    /// hand it to the output device.
    pub fn schedule(&mut self, buffer: &PcmBuffer) -> ScheduledSource {
        self.reap_finished();

        let start = self.next_start.max(self.clock.now_secs());
        let source = ScheduledSource {
            id: self.next_id,
            start_secs: start,
            duration_secs: buffer.duration_secs(),
        };
        self.next_id += 1;
        self.next_start = source.end_secs();
        self.sources.insert(source.id, source.clone());

        debug!(
            "Scheduled source {} at {:.4}s for {:.4}s ({} active)",
            source.id,
            source.start_secs,
            source.duration_secs,
            self.sources.len()
        );

        source
    }

    /// Barge-in: stop and discard every tracked source and rewind the
    /// cursor so the agent's next utterance starts immediately.
    pub fn interrupt(&mut self) -> usize {
        let cleared = self.sources.len();
        self.sources.clear();
        self.next_start = 0.0;
        debug!("Interrupted playback, cleared {} sources", cleared);
        cleared
    }

    /// Drop sources whose scheduled end has passed.
    fn reap_finished(&mut self) {
        let now = self.clock.now_secs();
        self.sources.retain(|_, s| s.end_secs() > now);
    }

    pub fn active_count(&mut self) -> usize {
        self.reap_finished();
        self.sources.len()
    }

    pub fn cursor_secs(&self) -> f64 {
        self.next_start
    }
}
