use super::state::{Backoff, BackoffPolicy, ConnectionSignal, ConnectionState};
use super::{OpenConnection, TransportBinding, TransportError, TransportKind};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything the connection loop reports. `generation` increases by one per
/// connection attempt; consumers drop frames whose generation is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connecting { generation: u64, attempt: u32 },
    Connected { generation: u64 },
    Frame { generation: u64, text: String },
    Disconnected { generation: u64, error: String },
    Closed,
}

struct Shared {
    binding: Arc<dyn TransportBinding>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    state_tx: watch::Sender<ConnectionState>,
    foreground: Notify,
    cancel: CancellationToken,
}

impl Shared {
    fn signal(&self, signal: ConnectionSignal) {
        self.state_tx.send_if_modified(|state| {
            let next = state.on_signal(signal);
            if next == *state {
                return false;
            }
            debug!(from = ?*state, to = ?next, ?signal, "connection state changed");
            *state = next;
            true
        });
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event);
    }
}

enum PumpExit {
    Cancelled,
    Lost(TransportError),
}

/// Owns at most one live connection for a session and reconnects it until
/// disposed.
pub struct TransportManager {
    shared: Arc<Shared>,
    policy: BackoffPolicy,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TransportManager {
    pub fn new(
        binding: Arc<dyn TransportBinding>,
        policy: BackoffPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            binding,
            events_tx,
            state_tx,
            foreground: Notify::new(),
            cancel: CancellationToken::new(),
        });
        (
            Self {
                shared,
                policy,
                outbound_tx,
                outbound_rx: Mutex::new(Some(outbound_rx)),
                task: Mutex::new(None),
            },
            events_rx,
        )
    }

    pub fn kind(&self) -> TransportKind {
        self.shared.binding.kind()
    }

    pub fn is_duplex(&self) -> bool {
        self.kind().is_duplex()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Starts the connection loop. Only the first call from `Idle` has any
    /// effect.
    pub fn connect(&self) {
        if self.state() != ConnectionState::Idle {
            return;
        }
        let Some(outbound_rx) = take_slot(&self.outbound_rx) else {
            return;
        };
        self.shared.signal(ConnectionSignal::ConnectRequested);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(run_connection_loop(shared, self.policy, outbound_rx));
        put_slot(&self.task, handle);
    }

    /// Queues a frame for the live connection. The frame is written by the
    /// connection loop; if that connection drops first the frame is discarded.
    pub fn send(&self, frame: String) -> Result<(), TransportError> {
        let kind = self.kind();
        if !kind.is_duplex() {
            return Err(TransportError::SendUnsupported(kind));
        }
        if !self.state().is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.outbound_tx
            .send(frame)
            .map_err(|_| TransportError::NotConnected)
    }

    /// Skips the remaining backoff delay when the host comes back to the
    /// foreground. Ignored unless currently disconnected; never carries over
    /// to a later disconnect.
    pub fn foreground(&self) {
        if self.state() == ConnectionState::Disconnected {
            debug!("foreground restored; retrying now");
            self.shared.foreground.notify_waiters();
        }
    }

    /// Cancels the loop and any pending retry, closes the connection and moves
    /// to `Closed`. Completes once the loop task has exited.
    pub async fn dispose(&self) {
        if self.state().is_terminal() {
            return;
        }
        self.shared.cancel.cancel();
        match take_slot(&self.task) {
            Some(task) => {
                if let Err(err) = task.await {
                    warn!(error = %err, "transport loop ended abnormally");
                    self.shared.signal(ConnectionSignal::DisposeRequested);
                    self.shared.emit(TransportEvent::Closed);
                }
            }
            None => {
                self.shared.signal(ConnectionSignal::DisposeRequested);
                self.shared.emit(TransportEvent::Closed);
            }
        }
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

async fn run_connection_loop(
    shared: Arc<Shared>,
    policy: BackoffPolicy,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let mut backoff = Backoff::new(policy);
    let mut generation = 0u64;

    loop {
        generation += 1;
        shared.emit(TransportEvent::Connecting {
            generation,
            attempt: backoff.attempt(),
        });

        let opened = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            opened = shared.binding.open() => opened,
        };

        let error = match opened {
            Ok(connection) => {
                while outbound_rx.try_recv().is_ok() {}
                match pump(&shared, generation, connection, &mut outbound_rx, &mut backoff).await {
                    PumpExit::Cancelled => break,
                    PumpExit::Lost(error) => error,
                }
            }
            Err(error) => error,
        };

        // Registered before the state reads Disconnected so no wake is missed.
        let foreground = shared.foreground.notified();
        tokio::pin!(foreground);
        shared.signal(ConnectionSignal::SocketClosed);
        warn!(generation, error = %error, "transport disconnected");
        shared.emit(TransportEvent::Disconnected {
            generation,
            error: error.to_string(),
        });

        let delay = backoff.next_delay();
        debug!(
            generation,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        let signal = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            _ = &mut foreground => ConnectionSignal::ForegroundRestored,
            _ = tokio::time::sleep(delay) => ConnectionSignal::RetryTimerFired,
        };
        shared.signal(signal);
    }

    shared.signal(ConnectionSignal::DisposeRequested);
    info!(generation, "transport closed");
    shared.emit(TransportEvent::Closed);
}

async fn pump(
    shared: &Shared,
    generation: u64,
    connection: OpenConnection,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    backoff: &mut Backoff,
) -> PumpExit {
    let OpenConnection {
        mut frames,
        mut outbound,
    } = connection;
    let mut connected = false;

    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                if let Some(sink) = outbound.as_mut() {
                    if let Err(err) = sink.close().await {
                        debug!(error = %err, "closing outbound half failed");
                    }
                }
                return PumpExit::Cancelled;
            }
            frame = frames.next() => match frame {
                Some(Ok(text)) => {
                    if !connected {
                        connected = true;
                        backoff.reset();
                        shared.signal(ConnectionSignal::FrameReceived);
                        info!(generation, kind = %shared.binding.kind(), "transport connected");
                        shared.emit(TransportEvent::Connected { generation });
                    }
                    shared.emit(TransportEvent::Frame { generation, text });
                }
                Some(Err(error)) => return PumpExit::Lost(error),
                None => return PumpExit::Lost(TransportError::ClosedByPeer),
            },
            Some(text) = outbound_rx.recv(), if connected && outbound.is_some() => {
                if let Some(sink) = outbound.as_mut() {
                    if let Err(error) = sink.send(text).await {
                        return PumpExit::Lost(error);
                    }
                }
            }
        }
    }
}

fn take_slot<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

fn put_slot<T>(slot: &Mutex<Option<T>>, value: T) {
    match slot.lock() {
        Ok(mut guard) => *guard = Some(value),
        Err(poisoned) => *poisoned.into_inner() = Some(value),
    }
}
