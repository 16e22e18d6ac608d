pub mod audio;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;

pub use audio::{
    AudioFixture, AudioGraph, ArtifactKind, ChunkedRecorder, DeviceProvider, DeviceStreams,
    FixtureDevices, GraphConfig, ManualClock, MediaTrack, PcmBuffer, PlaybackScheduler,
    RecorderConfig, RecorderHandle, RecordingArtifact, SystemClock,
};
pub use config::Config;
pub use error::SessionError;
pub use protocol::{
    ChannelConnector, ClientState, LiveClient, LiveConnector, LiveTransport, ServerMessage,
    SessionEvent, SessionSetup, WsConnector,
};
pub use session::{
    InterviewContext, InterviewMode, InterviewSession, SessionOutcome, SessionPhase,
    SessionSettings, Speaker, Transcript, Turn,
};
