//! Interview session orchestration
//!
//! This module provides the `InterviewSession` abstraction that manages:
//! - Device acquisition and the audio routing graph
//! - Chunked recording of the composite stream
//! - The live connection to the agent service
//! - Transcript collection and session state
//! - Guaranteed resource teardown on every exit path

mod context;
mod orchestrator;
mod transcript;

pub use context::{InterviewContext, InterviewMode};
pub use orchestrator::{InterviewSession, SessionOutcome, SessionPhase, SessionSettings};
pub use transcript::{Speaker, Transcript, Turn};
