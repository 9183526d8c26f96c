pub mod channel;
pub mod manager;
pub mod sse;
pub mod state;
pub mod stream;
pub mod websocket;

pub use channel::{ChannelAcceptor, ChannelBinding, ChannelPeer};
pub use manager::{TransportEvent, TransportManager};
pub use sse::SseBinding;
pub use state::{Backoff, BackoffPolicy, ConnectionSignal, ConnectionState};
pub use websocket::WebSocketBinding;

use futures::future::BoxFuture;
use futures::{Sink, Stream};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use thiserror::Error;

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Duplex socket; accepts `send`.
    WebSocket,
    /// Legacy unidirectional event stream; never accepts `send`.
    Sse,
}

impl TransportKind {
    pub fn is_duplex(self) -> bool {
        matches!(self, TransportKind::WebSocket)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => f.write_str("websocket"),
            TransportKind::Sse => f.write_str("sse"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("cannot connect to '{url}': {message}")]
    Connect { url: String, message: String },
    #[error("endpoint '{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("connection closed by peer")]
    ClosedByPeer,
    #[error("stream read failed: {0}")]
    Read(String),
    #[error("stream write failed: {0}")]
    Write(String),
    #[error("transport is not connected")]
    NotConnected,
    #[error("{0} transport does not accept outbound frames")]
    SendUnsupported(TransportKind),
}

/// A live connection produced by a binding. `outbound` is `None` for
/// receive-only transports.
pub struct OpenConnection {
    pub frames: FrameStream,
    pub outbound: Option<FrameSink>,
}

/// One way of reaching the producer. The manager owns reconnect policy;
/// bindings only know how to open a single connection.
pub trait TransportBinding: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn open(&self) -> BoxFuture<'_, Result<OpenConnection, TransportError>>;
}
