pub mod codec;
pub mod devices;
pub mod file;
pub mod graph;
pub mod playback;
pub mod recorder;

pub use codec::{decode_frame, encode_frame, PcmBuffer, WireFrame, AGENT_OUTPUT_RATE, CAPTURE_RATE, WIRE_MIME};
pub use devices::{CaptureBlock, DeviceProvider, DeviceStreams, FixtureDevices, MediaTrack, TrackKind, VideoFrame};
pub use file::AudioFixture;
pub use graph::{AudioGraph, GraphConfig, MixFrame, MixSource, ScheduledBuffer};
pub use playback::{ManualClock, PlaybackClock, PlaybackScheduler, ScheduledSource, SystemClock};
pub use recorder::{ArtifactKind, ChunkedRecorder, RecorderConfig, RecorderHandle, RecordingArtifact};
