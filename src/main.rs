use anyhow::Result;
use base64::Engine;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use warren_live::audio::codec::samples_to_i16_bytes;
use warren_live::protocol::{ChannelConnector, ClientMessage, ServerMessage};
use warren_live::{
    AudioFixture, Config, FixtureDevices, InterviewContext, InterviewMode, InterviewSession,
    LiveConnector, SessionSettings, SystemClock, WsConnector,
};

/// Drive one live interview session end to end.
///
/// Without --endpoint this runs against a built-in scripted agent over an
/// in-memory link, which exercises the whole engine (devices, graph,
/// recorder, protocol client, teardown) with no network.
#[derive(Parser, Debug)]
#[command(name = "warren-live", version)]
struct Args {
    /// Config file (falls back to built-in defaults if absent)
    #[arg(long, default_value = "config/warren-live")]
    config: String,

    /// WAV file to play as the candidate's microphone
    #[arg(long)]
    fixture: Option<String>,

    /// Run a video session instead of voice
    #[arg(long)]
    video: bool,

    /// Connect to a real live endpoint instead of the scripted agent
    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long, default_value = "Staff Engineer")]
    job: String,

    #[arg(long, default_value = "Initech")]
    company: String,

    #[arg(long, default_value = "Candidate")]
    candidate: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let settings = match Config::load(&args.config) {
        Ok(cfg) => {
            info!("Loaded config: {}", cfg.service.name);
            SessionSettings {
                live: cfg.live,
                audio: cfg.audio,
            }
        }
        Err(e) => {
            info!("No config file ({}), using defaults", e);
            SessionSettings::default()
        }
    };

    let context = InterviewContext {
        job_title: args.job,
        company: args.company,
        requirements: vec!["communication".to_string()],
        candidate_name: args.candidate,
        candidate_skills: vec!["general".to_string()],
    };

    let devices = match &args.fixture {
        Some(path) => {
            let fixture = AudioFixture::open(path)?;
            Arc::new(FixtureDevices::from_fixture(
                &fixture,
                settings.audio.capture_rate,
                settings.audio.capture_block_size,
                true,
            )?)
        }
        None => {
            // Two seconds of a quiet 220Hz hum as the candidate's voice
            let rate = settings.audio.capture_rate;
            let samples: Vec<f32> = (0..rate * 2)
                .map(|i| (i as f32 * 220.0 * std::f32::consts::TAU / rate as f32).sin() * 0.1)
                .collect();
            Arc::new(FixtureDevices::from_samples(
                samples,
                rate,
                settings.audio.capture_block_size,
            ))
        }
    };

    let connector: Arc<dyn LiveConnector> = match &args.endpoint {
        Some(endpoint) => Arc::new(WsConnector::new(endpoint.clone())),
        None => {
            let (connector, mut accepted_rx) = ChannelConnector::accepting();
            tokio::spawn(async move {
                if let Some(peer) = accepted_rx.recv().await {
                    run_scripted_agent(peer).await;
                }
            });
            Arc::new(connector)
        }
    };

    let mode = if args.video {
        InterviewMode::Video
    } else {
        InterviewMode::Voice
    };

    let mut session = InterviewSession::new(
        context,
        settings,
        devices,
        connector,
        Arc::new(SystemClock::new()),
    );

    let mut speaker_rx = session.start(mode).await?;

    // Stand-in for the output device: drain scheduled agent buffers
    let playback = tokio::spawn(async move {
        let mut buffers = 0usize;
        while let Some(scheduled) = speaker_rx.recv().await {
            buffers += 1;
            info!(
                "Playback: buffer {} at {:.3}s ({:.3}s long)",
                buffers, scheduled.placement.start_secs, scheduled.placement.duration_secs
            );
        }
        buffers
    });

    session.pump_events().await;
    let outcome = session.finish().await.expect("first finish yields outcome");

    // The session owns the last clone of the playback sender; releasing it
    // lets the drain task finish.
    drop(session);
    let buffers = playback.await?;
    info!("Session {} finished", outcome.session_id);
    info!("Heard {} agent buffers", buffers);
    for turn in &outcome.transcript {
        info!("[{:?}] {}", turn.speaker, turn.text);
    }
    match &outcome.artifact {
        Some(artifact) => info!(
            "Recording: {} bytes, {:.1}s, {}",
            artifact.data.len(),
            artifact.duration_ms as f64 / 1000.0,
            artifact.kind.mime()
        ),
        None => info!("No recording produced"),
    }

    Ok(())
}

/// The built-in agent: greets, speaks half a second of tone, then hangs up.
async fn run_scripted_agent(mut peer: warren_live::protocol::ChannelPeer) {
    // Wait for the kickstart instruction before speaking
    while let Some(msg) = peer.client_rx.recv().await {
        if matches!(msg, ClientMessage::Text { .. }) {
            break;
        }
    }

    let tone: Vec<f32> = (0..12_000)
        .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 24_000.0).sin() * 0.3)
        .collect();
    let data = base64::engine::general_purpose::STANDARD.encode(samples_to_i16_bytes(&tone));

    let _ = peer
        .server_tx
        .send(Ok(ServerMessage::with_audio(data, "audio/pcm;rate=24000")));

    let greeting = ServerMessage {
        server_content: Some(warren_live::protocol::ServerContent {
            model_turn: Some(warren_live::protocol::ModelTurn {
                parts: vec![warren_live::protocol::Part {
                    inline_data: None,
                    text: Some("Hello, I am Warren. Can you hear me?".to_string()),
                }],
            }),
            interrupted: None,
            turn_complete: Some(true),
        }),
    };
    let _ = peer.server_tx.send(Ok(greeting));

    // Let the candidate talk for a moment, then end the session
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    drop(peer.server_tx);
}
