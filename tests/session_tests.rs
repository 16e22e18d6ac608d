// End-to-end interview session tests against fake devices and an
// in-memory agent peer: the full happy path, every failure path, and the
// teardown guarantees.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use warren_live::audio::codec::samples_to_i16_bytes;
use warren_live::audio::devices::DeniedDevices;
use warren_live::protocol::{ChannelConnector, ClientMessage, ServerMessage};
use warren_live::{
    ArtifactKind, FixtureDevices, InterviewContext, InterviewMode, InterviewSession, ManualClock,
    MediaTrack, SessionError, SessionPhase, SessionSettings, Speaker,
};

fn context() -> InterviewContext {
    InterviewContext {
        job_title: "Platform Engineer".to_string(),
        company: "Initech".to_string(),
        requirements: vec!["Rust".to_string(), "async".to_string()],
        candidate_name: "Alex".to_string(),
        candidate_skills: vec!["Rust".to_string(), "Kafka".to_string()],
    }
}

fn settings(timeout_secs: u64) -> SessionSettings {
    let mut settings = SessionSettings::default();
    settings.live.connect_timeout_secs = timeout_secs;
    settings.audio.chunk_duration_secs = 1;
    settings
}

/// One second of quiet candidate audio at the capture rate.
fn mic_devices() -> Arc<FixtureDevices> {
    Arc::new(FixtureDevices::from_samples(vec![0.05; 16_000], 16_000, 4096))
}

fn agent_audio(samples: usize) -> ServerMessage {
    let tone = vec![0.2f32; samples];
    let data = base64::engine::general_purpose::STANDARD.encode(samples_to_i16_bytes(&tone));
    ServerMessage::with_audio(data, "audio/pcm;rate=24000")
}

fn agent_text(text: &str) -> ServerMessage {
    use warren_live::protocol::{ModelTurn, Part, ServerContent};
    ServerMessage {
        server_content: Some(ServerContent {
            model_turn: Some(ModelTurn {
                parts: vec![Part {
                    inline_data: None,
                    text: Some(text.to_string()),
                }],
            }),
            interrupted: None,
            turn_complete: Some(true),
        }),
    }
}

#[tokio::test(start_paused = true)]
async fn voice_session_end_to_end() {
    let (connector, mut accepted_rx) = ChannelConnector::accepting();
    let mut session = InterviewSession::new(
        context(),
        settings(15),
        mic_devices(),
        Arc::new(connector),
        Arc::new(ManualClock::new()),
    );

    let mut speaker_rx = session.start(InterviewMode::Voice).await.unwrap();
    assert_eq!(session.phase(), SessionPhase::InSession);

    let mut peer = accepted_rx.recv().await.unwrap();

    // Handshake order: session configuration, then the kickstart text
    assert!(matches!(
        peer.client_rx.recv().await.unwrap(),
        ClientMessage::Setup { .. }
    ));
    assert!(matches!(
        peer.client_rx.recv().await.unwrap(),
        ClientMessage::Text { .. }
    ));

    // The candidate's microphone reaches the wire tagged at 16kHz
    let mut saw_mic_frame = false;
    for _ in 0..8 {
        match peer.client_rx.recv().await {
            Some(ClientMessage::Realtime { media }) => {
                assert_eq!(media.mime_type, "audio/pcm;rate=16000");
                saw_mic_frame = true;
                break;
            }
            Some(_) => continue,
            None => break,
        }
    }
    assert!(saw_mic_frame, "expected captured audio on the wire");

    // The agent speaks and greets; its audio lands on the playback
    // destination (the recording side is asserted via the artifact below)
    peer.server_tx.send(Ok(agent_audio(4800))).unwrap();
    peer.server_tx
        .send(Ok(agent_text("Hello Alex, can you hear me?")))
        .unwrap();

    let scheduled = speaker_rx.recv().await.unwrap();
    assert!((scheduled.buffer.duration_secs() - 0.2).abs() < 1e-9);

    // Agent hangs up; let the pipeline drain before finalizing
    drop(peer.server_tx);
    session.pump_events().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let outcome = session.finish().await.expect("first finish yields outcome");
    assert_eq!(session.phase(), SessionPhase::Complete);

    // Exactly-once completion
    assert!(session.finish().await.is_none());
    assert!(session.abort().await.is_none());

    // Transcript: the agent's greeting, then the synthesized recording
    // marker turns appended at finalization
    let texts: Vec<&str> = outcome.transcript.iter().map(|t| t.text.as_str()).collect();
    assert!(texts.contains(&"Hello Alex, can you hear me?"));
    assert!(texts.contains(&"*** VOICE SESSION RECORDED ***"));
    assert!(texts.contains(&"Interview submitted."));
    let marker = outcome
        .transcript
        .iter()
        .find(|t| t.text.contains("RECORDED"))
        .unwrap();
    assert_eq!(marker.speaker, Speaker::Marker);

    // The recording captured both sides into one audio artifact
    let artifact = outcome.artifact.expect("recording expected");
    assert_eq!(artifact.kind, ArtifactKind::Audio);
    assert_eq!(artifact.kind.mime(), "audio/wav");
    assert!(artifact.data.len() > 44, "artifact must carry sample data");
    assert_eq!(&artifact.data[0..4], b"RIFF");

    // Every device track is released
    for track in session.tracks() {
        assert!(track.is_stopped());
    }
}

#[tokio::test(start_paused = true)]
async fn video_session_tags_artifact_as_video() {
    let (connector, mut accepted_rx) = ChannelConnector::accepting();
    let mut session = InterviewSession::new(
        context(),
        settings(15),
        mic_devices(),
        Arc::new(connector),
        Arc::new(ManualClock::new()),
    );

    let _speaker_rx = session.start(InterviewMode::Video).await.unwrap();
    assert_eq!(session.tracks().len(), 2, "mic and camera in video mode");

    let peer = accepted_rx.recv().await.unwrap();
    peer.server_tx.send(Ok(agent_audio(2400))).unwrap();

    drop(peer.server_tx);
    session.pump_events().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let outcome = session.finish().await.unwrap();
    let artifact = outcome.artifact.expect("recording expected");
    assert_eq!(artifact.kind, ArtifactKind::AudioVideo);
    assert_eq!(artifact.kind.mime(), "video/x-interleaved");
    assert_eq!(&artifact.data[0..4], b"ILV1");
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_fails_session_with_timeout_message() {
    let mut session = InterviewSession::new(
        context(),
        settings(1),
        mic_devices(),
        Arc::new(ChannelConnector::hanging()),
        Arc::new(ManualClock::new()),
    );

    let err = session.start(InterviewMode::Voice).await.unwrap_err();

    assert!(matches!(err, SessionError::ConnectionTimeout(1)));
    assert_eq!(session.phase(), SessionPhase::Failed);
    assert!(
        session.status().contains("timed out"),
        "timeout must not surface as a generic connection error, got {:?}",
        session.status()
    );

    // Teardown before connect resolved: every acquired track is stopped
    assert!(!session.tracks().is_empty());
    for track in session.tracks() {
        assert!(track.is_stopped());
    }
}

#[tokio::test]
async fn denied_device_permission_aborts_setup() {
    let (connector, _accepted_rx) = ChannelConnector::accepting();
    let mut session = InterviewSession::new(
        context(),
        settings(15),
        Arc::new(DeniedDevices),
        Arc::new(connector),
        Arc::new(ManualClock::new()),
    );

    let err = session.start(InterviewMode::Video).await.unwrap_err();

    assert!(matches!(err, SessionError::DevicePermissionDenied(_)));
    assert_eq!(session.phase(), SessionPhase::Failed);
    assert!(session.status().contains("permissions"));
}

#[tokio::test(start_paused = true)]
async fn user_abort_releases_everything_without_artifact() {
    let (connector, mut accepted_rx) = ChannelConnector::accepting();
    let mut session = InterviewSession::new(
        context(),
        settings(15),
        mic_devices(),
        Arc::new(connector),
        Arc::new(ManualClock::new()),
    );

    session.start(InterviewMode::Voice).await.unwrap();
    let _peer = accepted_rx.recv().await.unwrap();

    let outcome = session.abort().await.expect("abort yields outcome once");
    assert_eq!(session.phase(), SessionPhase::Aborted);
    assert!(outcome.artifact.is_none());

    for track in session.tracks() {
        assert!(track.is_stopped());
    }

    assert!(session.abort().await.is_none());
    assert!(session.finish().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn dropping_a_live_session_stops_device_tracks() {
    let (connector, mut accepted_rx) = ChannelConnector::accepting();
    let mut session = InterviewSession::new(
        context(),
        settings(15),
        mic_devices(),
        Arc::new(connector),
        Arc::new(ManualClock::new()),
    );

    session.start(InterviewMode::Video).await.unwrap();
    let _peer = accepted_rx.recv().await.unwrap();

    let tracks: Vec<MediaTrack> = session.tracks().to_vec();
    assert!(tracks.iter().all(|t| !t.is_stopped()));

    drop(session);

    assert!(tracks.iter().all(|t| t.is_stopped()));
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    let (connector, mut accepted_rx) = ChannelConnector::accepting();
    let mut session = InterviewSession::new(
        context(),
        settings(15),
        mic_devices(),
        Arc::new(connector),
        Arc::new(ManualClock::new()),
    );

    session.start(InterviewMode::Voice).await.unwrap();
    let _peer = accepted_rx.recv().await.unwrap();

    assert!(session.start(InterviewMode::Voice).await.is_err());
}
