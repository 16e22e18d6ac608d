// Protocol client for the live agent link
//
// Owns the connection state machine and the single I/O task that drives the
// transport. Inbound audio is decoded and scheduled through the audio graph;
// everything the orchestrator needs to know arrives as `SessionEvent`s over
// a channel, so the client has no dependency on UI state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, ServerMessage, SessionSetup};
use super::transport::LiveConnector;
use crate::audio::codec::{decode_frame, encode_frame, AGENT_OUTPUT_RATE};
use crate::audio::graph::AudioGraph;
use crate::audio::playback::ScheduledSource;
use crate::error::SessionError;

/// Text instruction sent at connection open so the agent speaks first
/// instead of waiting on the candidate (dead-air avoidance).
const KICKSTART: &str = "System: Session started. Introduce yourself.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting,
    Active,
    /// The candidate barged in; playback is cut until new frames resume.
    Interrupted,
    Closing,
    Closed,
    Errored,
}

/// What the protocol client reports to the orchestrator.
#[derive(Debug)]
pub enum SessionEvent {
    Status(String),
    AgentAudio(ScheduledSource),
    AgentText(String),
    Interrupted,
    Closed,
    Error(SessionError),
}

pub struct LiveClient {
    setup: SessionSetup,
    connect_timeout: Duration,
    graph: AudioGraph,
    state: Arc<Mutex<ClientState>>,
    generation: Arc<AtomicU64>,
    token: u64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    outbound_tx: Option<mpsc::UnboundedSender<ClientMessage>>,
    io_task: Option<JoinHandle<()>>,
}

impl LiveClient {
    /// `generation` is the session-generation cell owned by the
    /// orchestrator; the client captures its value now and every async
    /// callback checks it before touching shared state, so completions
    /// from a superseded session cannot corrupt the next one.
    pub fn new(
        setup: SessionSetup,
        connect_timeout: Duration,
        graph: AudioGraph,
        generation: Arc<AtomicU64>,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let token = generation.load(Ordering::SeqCst);
        Self {
            setup,
            connect_timeout,
            graph,
            state: Arc::new(Mutex::new(ClientState::Idle)),
            generation,
            token,
            events_tx,
            outbound_tx: None,
            io_task: None,
        }
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock().expect("state lock poisoned")
    }

    fn set_state(&self, next: ClientState) {
        *self.state.lock().expect("state lock poisoned") = next;
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Open the streaming link, raced against the connect timeout. On
    /// success the setup configuration and the kickstart instruction have
    /// been sent and the I/O task is running. On timeout the attempt is
    /// abandoned and reported as `ConnectionTimeout`; the caller must then
    /// run full teardown.
    pub async fn connect(&mut self, connector: &dyn LiveConnector) -> Result<(), SessionError> {
        if self.state() != ClientState::Idle {
            return Err(SessionError::Connection("client already started".to_string()));
        }

        self.set_state(ClientState::Connecting);
        self.emit(SessionEvent::Status("Connecting to Warren...".to_string()));

        let attempt = timeout(self.connect_timeout, connector.connect(&self.setup)).await;

        let mut transport = match attempt {
            Err(_elapsed) => {
                self.set_state(ClientState::Errored);
                return Err(SessionError::ConnectionTimeout(
                    self.connect_timeout.as_secs(),
                ));
            }
            Ok(Err(e)) => {
                self.set_state(ClientState::Errored);
                return Err(e);
            }
            Ok(Ok(transport)) => transport,
        };

        // Session configuration first, then kickstart the conversation so
        // the candidate is not staring at silence.
        let handshake = async {
            transport
                .send(ClientMessage::Setup {
                    setup: self.setup.clone(),
                })
                .await?;
            transport
                .send(ClientMessage::Text {
                    text: KICKSTART.to_string(),
                })
                .await
        };
        if let Err(e) = handshake.await {
            self.set_state(ClientState::Errored);
            return Err(e);
        }

        self.set_state(ClientState::Active);
        self.emit(SessionEvent::Status(
            "Connected. Warren is listening...".to_string(),
        ));

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound_tx = Some(outbound_tx);

        let io = IoLoop {
            state: Arc::clone(&self.state),
            graph: self.graph.clone(),
            events_tx: self.events_tx.clone(),
            generation: Arc::clone(&self.generation),
            token: self.token,
        };
        self.io_task = Some(tokio::spawn(io.run(transport, outbound_rx)));

        Ok(())
    }

    /// Transmit one captured block, fire-and-forget. Frames flow only
    /// while the session is active (`Interrupted` is the playback-side
    /// sub-state of active: the candidate is speaking over the agent and
    /// the service needs exactly those frames). Dropped silently in any
    /// other state; never an error when the channel is momentarily busy.
    pub fn send_audio_frame(&self, samples: &[f32]) {
        if let Some(sender) = self.audio_sender() {
            sender.send(samples);
        }
    }

    /// Cloneable handle for the capture pump. `None` before `connect()`.
    pub fn audio_sender(&self) -> Option<AudioFrameSender> {
        self.outbound_tx.as_ref().map(|tx| AudioFrameSender {
            state: Arc::clone(&self.state),
            outbound_tx: tx.clone(),
        })
    }

    /// Tear the link down. Safe to call repeatedly and from any state,
    /// including before `connect()` ever resolved.
    pub fn disconnect(&mut self) {
        let already_closed = {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state == ClientState::Closed {
                true
            } else {
                *state = ClientState::Closing;
                false
            }
        };
        if already_closed {
            return;
        }

        // Dropping the outbound side wakes the I/O task, which closes the
        // transport and finishes on its own.
        self.outbound_tx = None;
        self.io_task = None;
        self.set_state(ClientState::Closed);
        info!("Live client disconnected");
    }
}

/// Sends captured blocks into the live link, gated on session state.
#[derive(Clone)]
pub struct AudioFrameSender {
    state: Arc<Mutex<ClientState>>,
    outbound_tx: mpsc::UnboundedSender<ClientMessage>,
}

impl AudioFrameSender {
    pub fn send(&self, samples: &[f32]) {
        let state = *self.state.lock().expect("state lock poisoned");
        match state {
            ClientState::Active | ClientState::Interrupted => {}
            other => {
                debug!("Not sending audio frame in state {:?}", other);
                return;
            }
        }

        let frame = encode_frame(samples);
        let _ = self.outbound_tx.send(ClientMessage::Realtime {
            media: frame.into(),
        });
    }
}

struct IoLoop {
    state: Arc<Mutex<ClientState>>,
    graph: AudioGraph,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    generation: Arc<AtomicU64>,
    token: u64,
}

impl IoLoop {
    fn stale(&self) -> bool {
        self.generation.load(Ordering::SeqCst) != self.token
    }

    fn current(&self) -> ClientState {
        *self.state.lock().expect("state lock poisoned")
    }

    fn set_state(&self, next: ClientState) {
        *self.state.lock().expect("state lock poisoned") = next;
    }

    async fn run(
        self,
        mut transport: Box<dyn super::transport::LiveTransport>,
        mut outbound_rx: mpsc::UnboundedReceiver<ClientMessage>,
    ) {
        debug!("Protocol I/O task started");

        loop {
            tokio::select! {
                out = outbound_rx.recv() => match out {
                    Some(msg) => {
                        if let Err(e) = transport.send(msg).await {
                            self.fail(e);
                            break;
                        }
                    }
                    None => {
                        // Orchestrator disconnected us
                        let _ = transport.close().await;
                        break;
                    }
                },
                inbound = transport.next() => match inbound {
                    Some(Ok(msg)) => {
                        if self.stale() {
                            debug!("Dropping inbound message for superseded session");
                            break;
                        }
                        self.handle_server_message(msg).await;
                    }
                    Some(Err(e)) if !e.is_fatal() => {
                        warn!("Dropping malformed inbound frame: {}", e);
                    }
                    Some(Err(e)) => {
                        self.fail(e);
                        break;
                    }
                    None => {
                        if !self.stale() && self.current() != ClientState::Errored {
                            self.set_state(ClientState::Closed);
                            let _ = self.events_tx.send(SessionEvent::Status(
                                "Session Ended.".to_string(),
                            ));
                            let _ = self.events_tx.send(SessionEvent::Closed);
                        }
                        break;
                    }
                },
            }
        }

        debug!("Protocol I/O task stopped");
    }

    fn fail(&self, error: SessionError) {
        if self.stale() {
            return;
        }
        warn!("Live link error: {}", error);
        self.set_state(ClientState::Errored);
        let _ = self
            .events_tx
            .send(SessionEvent::Status("Connection Error.".to_string()));
        let _ = self.events_tx.send(SessionEvent::Error(error));
    }

    async fn handle_server_message(&self, msg: ServerMessage) {
        if msg.is_interrupted() {
            let cleared = self.graph.interrupt();
            debug!("Agent interrupted, discarded {} scheduled buffers", cleared);
            if self.current() == ClientState::Active {
                self.set_state(ClientState::Interrupted);
            }
            let _ = self.events_tx.send(SessionEvent::Interrupted);
        }

        for data in msg.audio_parts() {
            match decode_frame(data, AGENT_OUTPUT_RATE) {
                Ok(buffer) => {
                    let placement = self.graph.play_agent(buffer).await;
                    // New frames resume normal playback after a barge-in
                    if self.current() == ClientState::Interrupted {
                        self.set_state(ClientState::Active);
                    }
                    let _ = self.events_tx.send(SessionEvent::AgentAudio(placement));
                }
                Err(e) => {
                    warn!("Dropping malformed audio part: {}", e);
                }
            }
        }

        for text in msg.text_parts() {
            let _ = self
                .events_tx
                .send(SessionEvent::AgentText(text.to_string()));
        }
    }
}
