// Transport seam for the live streaming link
//
// The protocol client talks to `LiveTransport`/`LiveConnector` trait
// objects, never to a socket directly, so sessions run against the real
// WebSocket link or an in-memory channel pair interchangeably.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, ServerMessage, SessionSetup};
use crate::error::SessionError;

/// One open bidirectional link to the agent service.
#[async_trait]
pub trait LiveTransport: Send {
    async fn send(&mut self, msg: ClientMessage) -> Result<(), SessionError>;

    /// Next inbound message. `None` means the peer closed the link.
    /// A `MalformedFrame` item is recoverable; anything else is fatal.
    async fn next(&mut self) -> Option<Result<ServerMessage, SessionError>>;

    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens transports. The connect attempt itself may hang; the protocol
/// client races it against the configured timeout.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    async fn connect(&self, setup: &SessionSetup) -> Result<Box<dyn LiveTransport>, SessionError>;
}

/// WebSocket transport over tokio-tungstenite.
pub struct WsTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl LiveTransport for WsTransport {
    async fn send(&mut self, msg: ClientMessage) -> Result<(), SessionError> {
        let json = serde_json::to_string(&msg)
            .map_err(|e| SessionError::Connection(format!("serialize: {}", e)))?;
        self.ws
            .send(Message::Text(json))
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))
    }

    async fn next(&mut self) -> Option<Result<ServerMessage, SessionError>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(
                        serde_json::from_str(&text)
                            .map_err(|e| SessionError::MalformedFrame(e.to_string())),
                    );
                }
                Ok(Message::Close(_)) => return None,
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Ok(other) => {
                    debug!("Ignoring non-text frame: {:?}", other);
                    continue;
                }
                Err(e) => return Some(Err(SessionError::Connection(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.ws
            .close(None)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))
    }
}

/// Connects to the configured endpoint over WebSocket.
pub struct WsConnector {
    endpoint: String,
}

impl WsConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl LiveConnector for WsConnector {
    async fn connect(&self, setup: &SessionSetup) -> Result<Box<dyn LiveTransport>, SessionError> {
        info!("Connecting to live endpoint: {} ({})", self.endpoint, setup.model);

        let (ws, _response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;

        info!("Live link open");
        Ok(Box::new(WsTransport { ws }))
    }
}

/// In-memory transport half used by tests and local development: the
/// "client" side the protocol client drives.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<ClientMessage>,
    rx: mpsc::UnboundedReceiver<Result<ServerMessage, SessionError>>,
}

/// The "service" side of an in-memory link: everything the client sent,
/// and a sender for scripted server traffic.
pub struct ChannelPeer {
    pub client_rx: mpsc::UnboundedReceiver<ClientMessage>,
    pub server_tx: mpsc::UnboundedSender<Result<ServerMessage, SessionError>>,
}

/// Build a connected in-memory transport/peer pair.
pub fn channel_pair() -> (ChannelTransport, ChannelPeer) {
    let (client_tx, client_rx) = mpsc::unbounded_channel();
    let (server_tx, server_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport {
            tx: client_tx,
            rx: server_rx,
        },
        ChannelPeer {
            client_rx,
            server_tx,
        },
    )
}

#[async_trait]
impl LiveTransport for ChannelTransport {
    async fn send(&mut self, msg: ClientMessage) -> Result<(), SessionError> {
        self.tx
            .send(msg)
            .map_err(|_| SessionError::Connection("peer gone".to_string()))
    }

    async fn next(&mut self) -> Option<Result<ServerMessage, SessionError>> {
        self.rx.recv().await
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.rx.close();
        Ok(())
    }
}

/// How a `ChannelConnector` answers connection attempts.
enum ConnectBehavior {
    Accept,
    /// Never resolves; exercises the connect-timeout race
    Hang,
    Refuse,
}

/// In-memory connector. Accepted peers are handed out on a channel so the
/// test can script the service side of each session.
pub struct ChannelConnector {
    behavior: ConnectBehavior,
    accepted_tx: mpsc::UnboundedSender<ChannelPeer>,
}

impl ChannelConnector {
    pub fn accepting() -> (Self, mpsc::UnboundedReceiver<ChannelPeer>) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        (
            Self {
                behavior: ConnectBehavior::Accept,
                accepted_tx,
            },
            accepted_rx,
        )
    }

    pub fn hanging() -> Self {
        let (accepted_tx, _) = mpsc::unbounded_channel();
        Self {
            behavior: ConnectBehavior::Hang,
            accepted_tx,
        }
    }

    pub fn refusing() -> Self {
        let (accepted_tx, _) = mpsc::unbounded_channel();
        Self {
            behavior: ConnectBehavior::Refuse,
            accepted_tx,
        }
    }
}

#[async_trait]
impl LiveConnector for ChannelConnector {
    async fn connect(&self, _setup: &SessionSetup) -> Result<Box<dyn LiveTransport>, SessionError> {
        match self.behavior {
            ConnectBehavior::Accept => {
                let (transport, peer) = channel_pair();
                if self.accepted_tx.send(peer).is_err() {
                    warn!("No one is listening for accepted peers");
                }
                Ok(Box::new(transport))
            }
            ConnectBehavior::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            ConnectBehavior::Refuse => {
                Err(SessionError::Connection("connection refused".to_string()))
            }
        }
    }
}
