//! Streaming protocol to the live agent service
//!
//! This module provides the session protocol client:
//! - Wire message types (setup, realtime media, server content)
//! - A transport seam with WebSocket and in-memory implementations
//! - The connection state machine with timeout, barge-in, and teardown

pub mod client;
pub mod messages;
pub mod transport;

pub use client::{AudioFrameSender, ClientState, LiveClient, SessionEvent};
pub use messages::{ClientMessage, MediaBlob, ModelTurn, Part, ServerContent, ServerMessage, SessionSetup};
pub use transport::{channel_pair, ChannelConnector, ChannelPeer, ChannelTransport, LiveConnector, LiveTransport, WsConnector, WsTransport};
