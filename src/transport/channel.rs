//! In-process binding. Each `open()` hands a fresh [`ChannelPeer`] to whoever
//! holds the [`ChannelAcceptor`], which plays the producer side.

use super::{OpenConnection, TransportBinding, TransportError, TransportKind};
use futures::channel::mpsc as fmpsc;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const CHANNEL_URL: &str = "memory://channel";

pub struct ChannelBinding {
    kind: TransportKind,
    accept_tx: mpsc::UnboundedSender<ChannelPeer>,
    accepting: Arc<AtomicBool>,
    opened: Arc<AtomicUsize>,
}

/// Producer side of a [`ChannelBinding`].
pub struct ChannelAcceptor {
    accept_rx: Mutex<mpsc::UnboundedReceiver<ChannelPeer>>,
    accepting: Arc<AtomicBool>,
    opened: Arc<AtomicUsize>,
}

impl ChannelBinding {
    /// `kind` decides whether connections carry an outbound half.
    pub fn new(kind: TransportKind) -> (Self, ChannelAcceptor) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let accepting = Arc::new(AtomicBool::new(true));
        let opened = Arc::new(AtomicUsize::new(0));
        (
            Self {
                kind,
                accept_tx,
                accepting: Arc::clone(&accepting),
                opened: Arc::clone(&opened),
            },
            ChannelAcceptor {
                accept_rx: Mutex::new(accept_rx),
                accepting,
                opened,
            },
        )
    }
}

impl TransportBinding for ChannelBinding {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn open(&self) -> BoxFuture<'_, Result<OpenConnection, TransportError>> {
        Box::pin(async move {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if !self.accepting.load(Ordering::SeqCst) {
                return Err(TransportError::Connect {
                    url: CHANNEL_URL.to_string(),
                    message: "connection refused".to_string(),
                });
            }

            let (frames_tx, frames_rx) = fmpsc::unbounded::<Result<String, TransportError>>();
            let (outbound, peer_outbound) = if self.kind.is_duplex() {
                let (tx, rx) = fmpsc::unbounded::<String>();
                let sink = tx.sink_map_err(|err| TransportError::Write(err.to_string()));
                (Some(Box::pin(sink) as super::FrameSink), Some(rx))
            } else {
                (None, None)
            };

            let peer = ChannelPeer {
                frames_tx,
                outbound_rx: peer_outbound,
            };
            self.accept_tx
                .send(peer)
                .map_err(|_| TransportError::Connect {
                    url: CHANNEL_URL.to_string(),
                    message: "acceptor dropped".to_string(),
                })?;

            Ok(OpenConnection {
                frames: Box::pin(frames_rx),
                outbound,
            })
        })
    }
}

impl ChannelAcceptor {
    /// Waits for the client's next connection attempt.
    pub async fn accept(&self) -> Option<ChannelPeer> {
        self.accept_rx.lock().await.recv().await
    }

    /// While false, `open()` fails with a connect error.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Number of `open()` calls so far, refused ones included.
    pub fn open_attempts(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

/// One accepted connection, seen from the producer.
pub struct ChannelPeer {
    frames_tx: fmpsc::UnboundedSender<Result<String, TransportError>>,
    outbound_rx: Option<fmpsc::UnboundedReceiver<String>>,
}

impl ChannelPeer {
    pub fn send_frame(&self, frame: impl Into<String>) -> bool {
        self.frames_tx.unbounded_send(Ok(frame.into())).is_ok()
    }

    pub fn send_json<T: Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.send_frame(text),
            Err(_) => false,
        }
    }

    /// Ends the connection with a read error instead of a clean close.
    pub fn fail(self, message: &str) {
        let _ = self
            .frames_tx
            .unbounded_send(Err(TransportError::Read(message.to_string())));
    }

    /// Next frame the client sent. `None` once the client side is gone or the
    /// connection is receive-only.
    pub async fn recv_outbound(&mut self) -> Option<String> {
        match self.outbound_rx.as_mut() {
            Some(rx) => rx.next().await,
            None => None,
        }
    }

    pub fn is_duplex(&self) -> bool {
        self.outbound_rx.is_some()
    }
}
