// Interview session orchestration
//
// Sequences one interview attempt end to end: device acquisition, audio
// graph construction, recording, the live connection, event pumping, and
// finalization. Resource safety hangs on a single idempotent cleanup
// routine invoked from every exit path; duplicating teardown per path is
// how camera and microphone locks get leaked.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::context::{InterviewContext, InterviewMode};
use super::transcript::{Speaker, Transcript, Turn};
use crate::audio::devices::{DeviceProvider, MediaTrack};
use crate::audio::graph::{AudioGraph, GraphConfig, ScheduledBuffer};
use crate::audio::playback::PlaybackClock;
use crate::audio::recorder::{
    ArtifactKind, ChunkedRecorder, RecorderConfig, RecorderHandle, RecordingArtifact,
};
use crate::config::{AudioConfig, LiveConfig};
use crate::error::SessionError;
use crate::protocol::client::{LiveClient, SessionEvent};
use crate::protocol::transport::LiveConnector;

/// Where the session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    ModeSelection,
    DeviceSetup,
    Connecting,
    InSession,
    Finalizing,
    Complete,
    Failed,
    Aborted,
}

/// What a finished session hands back to the surrounding application.
/// Produced exactly once per session, by `finish()` or `abort()`.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: String,
    pub transcript: Vec<Turn>,
    pub artifact: Option<RecordingArtifact>,
}

/// Engine settings for one session, usually lifted straight from `Config`.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub live: LiveConfig,
    pub audio: AudioConfig,
}

/// One interview attempt. Owns the device tracks, the audio graph, the
/// recorder, and the protocol client for its whole lifetime; none of them
/// are ever shared with another session.
pub struct InterviewSession {
    id: String,
    context: InterviewContext,
    settings: SessionSettings,
    devices: Arc<dyn DeviceProvider>,
    connector: Arc<dyn LiveConnector>,
    clock: Arc<dyn PlaybackClock>,

    phase: SessionPhase,
    status: String,
    mode: Option<InterviewMode>,
    transcript: Transcript,

    /// Bumped on cleanup; stale async callbacks compare their captured
    /// token against this and no-op.
    generation: Arc<AtomicU64>,
    cleaned_up: bool,
    completed: bool,

    tracks: Vec<MediaTrack>,
    client: Option<LiveClient>,
    recorder: Option<RecorderHandle>,
    capture_task: Option<JoinHandle<()>>,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    artifact: Option<RecordingArtifact>,
}

impl InterviewSession {
    pub fn new(
        context: InterviewContext,
        settings: SessionSettings,
        devices: Arc<dyn DeviceProvider>,
        connector: Arc<dyn LiveConnector>,
        clock: Arc<dyn PlaybackClock>,
    ) -> Self {
        let id = format!("interview-{}", Uuid::new_v4());
        info!("Created interview session: {}", id);

        Self {
            id,
            context,
            settings,
            devices,
            connector,
            clock,
            phase: SessionPhase::ModeSelection,
            status: String::new(),
            mode: None,
            transcript: Transcript::new(),
            generation: Arc::new(AtomicU64::new(0)),
            cleaned_up: false,
            completed: false,
            tracks: Vec::new(),
            client: None,
            recorder: None,
            capture_task: None,
            events_rx: None,
            artifact: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn transcript(&self) -> &[Turn] {
        self.transcript.turns()
    }

    /// Stop handles for every acquired device track (empty before setup).
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Run device setup and connect. On success the session is live and the
    /// returned receiver is the playback destination: the output device
    /// drains scheduled agent buffers from it.
    ///
    /// On any failure the session has already been fully torn down (every
    /// acquired track stopped, no lingering connection) and the phase is
    /// `Failed`.
    pub async fn start(
        &mut self,
        mode: InterviewMode,
    ) -> Result<mpsc::Receiver<ScheduledBuffer>, SessionError> {
        if self.phase != SessionPhase::ModeSelection {
            return Err(SessionError::Config(format!(
                "cannot start session in phase {:?}",
                self.phase
            )));
        }

        self.mode = Some(mode);
        self.phase = SessionPhase::DeviceSetup;
        self.status = "Requesting Device Permissions...".to_string();
        info!("Starting {} interview: {}", mode.label(), self.id);

        let mut streams = match self.devices.acquire(mode.is_video()).await {
            Ok(streams) => streams,
            Err(e) => return Err(self.fail_setup(e).await),
        };
        self.tracks = streams.tracks();

        let graph_config = GraphConfig {
            mix_rate: self.settings.audio.playback_rate,
            ..GraphConfig::default()
        };
        let (graph, composite_rx, speaker_rx) =
            match AudioGraph::build(graph_config, Arc::clone(&self.clock)) {
                Ok(parts) => parts,
                Err(e) => return Err(self.fail_setup(e).await),
            };

        let kind = if mode.is_video() {
            ArtifactKind::AudioVideo
        } else {
            ArtifactKind::Audio
        };
        self.recorder = Some(ChunkedRecorder::start(
            RecorderConfig {
                kind,
                sample_rate: self.settings.audio.playback_rate,
                chunk_duration_secs: self.settings.audio.chunk_duration_secs,
            },
            composite_rx,
            streams.camera_rx.take(),
        ));

        self.phase = SessionPhase::Connecting;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_rx = Some(events_rx);

        let setup = self.context.session_setup(mode, &self.settings.live);
        let mut client = LiveClient::new(
            setup,
            self.settings.live.connect_timeout(),
            graph.clone(),
            Arc::clone(&self.generation),
            events_tx,
        );

        if let Err(e) = client.connect(self.connector.as_ref()).await {
            // Keep the client so cleanup disconnects whatever half-opened
            self.client = Some(client);
            return Err(self.fail_setup(e).await);
        }

        // Capture pump: microphone blocks go to the wire and to the mixer.
        // The pump captures the generation token and dies quietly once the
        // session is superseded.
        let sender = client.audio_sender();
        let pump_graph = graph.clone();
        let generation = Arc::clone(&self.generation);
        let token = generation.load(Ordering::SeqCst);
        let mut mic_rx = streams.mic_rx;

        self.capture_task = Some(tokio::spawn(async move {
            while let Some(block) = mic_rx.recv().await {
                if generation.load(Ordering::SeqCst) != token {
                    break;
                }
                if let Some(sender) = &sender {
                    sender.send(&block.samples);
                }
                pump_graph.push_mic(block).await;
            }
        }));

        self.client = Some(client);
        self.phase = SessionPhase::InSession;
        Ok(speaker_rx)
    }

    /// Apply protocol events to the session until the link closes or
    /// fails. Returns immediately if the session is not live. The caller
    /// decides what happens next (`finish()` or `abort()`).
    pub async fn pump_events(&mut self) {
        if self.phase != SessionPhase::InSession {
            return;
        }

        let Some(events_rx) = self.events_rx.as_mut() else {
            return;
        };

        while let Some(event) = events_rx.recv().await {
            match event {
                SessionEvent::Status(status) => {
                    self.status = status;
                }
                SessionEvent::AgentText(text) => {
                    self.transcript.push(Speaker::Agent, text);
                }
                SessionEvent::AgentAudio(_) | SessionEvent::Interrupted => {}
                SessionEvent::Closed => {
                    info!("Live link closed for {}", self.id);
                    break;
                }
                SessionEvent::Error(e) => {
                    warn!("Session {} failed in flight: {}", self.id, e);
                    self.status = e.user_message();
                    break;
                }
            }
        }
    }

    /// Normal completion. Tears everything down, assembles the recording,
    /// and hands back the outcome. Exactly one of `finish()`/`abort()`
    /// produces an outcome; later calls return `None`.
    pub async fn finish(&mut self) -> Option<SessionOutcome> {
        if self.completed {
            return None;
        }
        self.completed = true;

        self.phase = SessionPhase::Finalizing;
        self.cleanup().await;

        if self.artifact.is_some() {
            let mode = self.mode.unwrap_or(InterviewMode::Voice);
            self.transcript.push(
                Speaker::Marker,
                format!("*** {} SESSION RECORDED ***", mode.label().to_uppercase()),
            );
            self.transcript.push(Speaker::Agent, "Interview submitted.");
        }

        self.phase = SessionPhase::Complete;
        info!("Session complete: {}", self.id);

        Some(SessionOutcome {
            session_id: self.id.clone(),
            transcript: std::mem::take(&mut self.transcript).into_turns(),
            artifact: self.artifact.take(),
        })
    }

    /// Explicit user abort from a live session. Same teardown, no recorded
    /// artifact is kept.
    pub async fn abort(&mut self) -> Option<SessionOutcome> {
        if self.completed {
            return None;
        }
        self.completed = true;

        info!("Session aborted by user: {}", self.id);
        self.cleanup().await;
        self.artifact = None;
        self.phase = SessionPhase::Aborted;

        Some(SessionOutcome {
            session_id: self.id.clone(),
            transcript: std::mem::take(&mut self.transcript).into_turns(),
            artifact: None,
        })
    }

    /// Convert a setup failure into the user-facing failed state and run
    /// full teardown. Returns the error for the caller to propagate.
    async fn fail_setup(&mut self, error: SessionError) -> SessionError {
        warn!("Session setup failed: {}", error);
        self.status = error.user_message();
        self.cleanup().await;
        self.phase = SessionPhase::Failed;
        error
    }

    /// The one teardown routine, invoked from every exit path. Idempotent:
    /// the first call releases everything, later calls do nothing.
    async fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        // Invalidate every async callback issued under this session first,
        // so nothing touches the resources we are about to release.
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(client) = self.client.as_mut() {
            client.disconnect();
        }

        for track in &self.tracks {
            track.stop();
        }

        if let Some(task) = self.capture_task.take() {
            task.abort();
        }

        if let Some(recorder) = self.recorder.as_mut() {
            self.artifact = recorder.stop().await;
        }

        info!("Session resources released: {}", self.id);
    }
}

impl Drop for InterviewSession {
    /// Unmount path: if the session is dropped without `finish()`/`abort()`
    /// the tracks and the link still get released. The artifact is lost
    /// (assembly needs an async flush) but no device stays locked.
    fn drop(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(client) = self.client.as_mut() {
            client.disconnect();
        }
        for track in &self.tracks {
            track.stop();
        }
        if let Some(task) = self.capture_task.take() {
            task.abort();
        }
    }
}
