//! Typed session error taxonomy (spec §7) with user-facing `Display` strings.

use thiserror::Error;

/// Failure domains that can surface during an interview session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The capture device could not be acquired.
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The user (or OS) denied capture permission.
    #[error("Capture permission denied: {0}")]
    DevicePermissionDenied(String),

    /// The live connection could not be established before the deadline.
    #[error("Connection timed out after {0}s")]
    ConnectionTimeout(u64),

    /// The live connection failed or dropped.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A wire frame could not be parsed.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Invalid or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Whether this failure must tear down the session. Malformed inbound
    /// frames are recoverable (the caller drops the frame and keeps the
    /// link alive, spec §6/§7); every other variant is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::MalformedFrame(_))
    }

    /// A user-facing status string describing the failure, surfaced on the
    /// session's failed state ("Could not initialize interview…", spec §7).
    pub fn user_message(&self) -> String {
        match self {
            SessionError::DeviceUnavailable(_) => {
                "Could not initialize interview: the audio device is unavailable.".to_string()
            }
            SessionError::DevicePermissionDenied(_) => {
                "Could not initialize interview: microphone and camera permissions were denied."
                    .to_string()
            }
            SessionError::ConnectionTimeout(_) => {
                "Could not initialize interview: the connection to the live service timed out."
                    .to_string()
            }
            SessionError::Connection(_) => {
                "Could not initialize interview: the connection to the live service failed."
                    .to_string()
            }
            SessionError::MalformedFrame(_) => {
                "The live service sent an unreadable message.".to_string()
            }
            SessionError::Config(_) => {
                "Could not initialize interview: the configuration is invalid.".to_string()
            }
        }
    }
}
