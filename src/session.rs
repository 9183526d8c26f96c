use crate::config::Config;
use crate::decode::decode_frame;
use crate::dispatch::{
    ActionDispatcher, Delivery, DeliveryRoute, DispatchError, FallbackChannel, HttpFallback,
    ResolutionOutcome,
};
use crate::logging::{emit_decode_error, emit_frame_debug};
use crate::state::{ResolutionStart, SessionState};
use crate::transport::{
    BackoffPolicy, ConnectionState, SseBinding, TransportBinding, TransportEvent, TransportKind,
    TransportManager, WebSocketBinding,
};
use crate::types::AuiEvent;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Things the host should surface to the user. None of them are fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    Connection(ConnectionState),
    /// A new connection began; everything hydrated so far was discarded.
    Reset { generation: u64 },
    ConnectionError { generation: u64, message: String },
    ProtocolError(String),
    DecodeError { generation: u64, message: String },
    ResolutionFailed {
        interrupt_id: String,
        error: DispatchError,
    },
}

type ResolutionReply = oneshot::Sender<Result<ResolutionOutcome, DispatchError>>;

enum SessionCommand {
    Resolve {
        action: String,
        reply: ResolutionReply,
    },
    Foreground,
}

struct SettledResolution {
    interrupt_id: String,
    result: Result<(), DispatchError>,
    reply: ResolutionReply,
}

/// A session that has been wired up but not started.
pub struct Session {
    transport: TransportManager,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    dispatcher: ActionDispatcher,
}

impl Session {
    pub fn new(
        binding: Arc<dyn TransportBinding>,
        policy: BackoffPolicy,
        dispatcher: ActionDispatcher,
    ) -> Self {
        let (transport, events) = TransportManager::new(binding, policy);
        Self {
            transport,
            events,
            dispatcher,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let binding: Arc<dyn TransportBinding> = match config.transport {
            TransportKind::WebSocket => Arc::new(WebSocketBinding::new(config.stream_url.clone())),
            TransportKind::Sse => Arc::new(SseBinding::new(config.stream_url.clone())),
        };
        let fallback = config
            .resolve_url
            .as_ref()
            .map(|url| Arc::new(HttpFallback::new(url.clone())) as Arc<dyn FallbackChannel>);
        Self::new(
            binding,
            config.backoff,
            ActionDispatcher::new(config.session_id.clone(), fallback),
        )
    }

    /// Starts the driver task and connects. Must be called inside a tokio
    /// runtime.
    pub fn spawn(self) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Arc::new(SessionState::new()));
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let connection_rx = self.transport.subscribe_state();
        let cancel = CancellationToken::new();

        let driver = SessionDriver {
            transport: self.transport,
            events: self.events,
            dispatcher: self.dispatcher,
            state: SessionState::new(),
            generation: None,
            state_tx,
            notices: notices_tx,
            inflight: JoinSet::new(),
        };
        let task = tokio::spawn(driver.run(commands_rx, cancel.clone()));

        SessionHandle {
            commands: commands_tx,
            state_rx,
            connection_rx,
            notices: Mutex::new(Some(notices_rx)),
            cancel,
            task: Mutex::new(Some(task)),
        }
    }
}

/// Caller-side view of a running session. Dropping every handle disposes the
/// session.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state_rx: watch::Receiver<Arc<SessionState>>,
    connection_rx: watch::Receiver<ConnectionState>,
    notices: Mutex<Option<mpsc::UnboundedReceiver<SessionNotice>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    /// Latest immutable snapshot.
    pub fn state(&self) -> Arc<SessionState> {
        Arc::clone(&self.state_rx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionState>> {
        self.state_rx.clone()
    }

    pub fn connection(&self) -> ConnectionState {
        *self.connection_rx.borrow()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection_rx.clone()
    }

    /// The notice stream can be taken once.
    pub fn take_notices(&self) -> Option<mpsc::UnboundedReceiver<SessionNotice>> {
        match self.notices.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Resolves the pending interrupt with `action`. Completes once the single
    /// delivery attempt has been made; a fallback request is awaited.
    pub async fn resolve_interrupt(
        &self,
        action: impl Into<String>,
    ) -> Result<ResolutionOutcome, DispatchError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Resolve {
                action: action.into(),
                reply,
            })
            .map_err(|_| DispatchError::SessionClosed)?;
        response.await.map_err(|_| DispatchError::SessionClosed)?
    }

    /// The host came back to the foreground; retry a dropped connection now.
    pub fn foreground(&self) {
        let _ = self.commands.send(SessionCommand::Foreground);
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.commands.is_closed()
    }

    /// Stops the session: cancels pending retries and fallback requests and
    /// closes the transport. No event arriving afterwards is applied.
    pub async fn dispose(&self) {
        self.cancel.cancel();
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "session driver ended abnormally");
            }
        }
    }
}

struct SessionDriver {
    transport: TransportManager,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    dispatcher: ActionDispatcher,
    state: SessionState,
    /// Connection whose frames are currently applied.
    generation: Option<u64>,
    state_tx: watch::Sender<Arc<SessionState>>,
    notices: mpsc::UnboundedSender<SessionNotice>,
    inflight: JoinSet<SettledResolution>,
}

impl SessionDriver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        cancel: CancellationToken,
    ) {
        let mut connection_rx = self.transport.subscribe_state();
        self.transport.connect();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(joined) = self.inflight.join_next(), if !self.inflight.is_empty() => {
                    self.settle(joined);
                }
                event = self.events.recv() => match event {
                    Some(TransportEvent::Closed) | None => break,
                    Some(event) => self.handle_transport_event(event),
                },
                Ok(()) = connection_rx.changed() => {
                    let state = *connection_rx.borrow_and_update();
                    self.notify(SessionNotice::Connection(state));
                }
            }
        }

        self.inflight.shutdown().await;
        self.transport.dispose().await;
        self.notify(SessionNotice::Connection(self.transport.state()));
        info!("session disposed");
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connecting {
                generation,
                attempt,
            } => debug!(generation, attempt, "connecting"),
            TransportEvent::Connected { generation } => {
                if self.generation == Some(generation) {
                    return;
                }
                self.generation = Some(generation);
                self.state.reset();
                self.publish();
                self.notify(SessionNotice::Reset { generation });
            }
            TransportEvent::Frame { generation, text } => {
                if self.generation != Some(generation) {
                    debug!(generation, "dropping frame from a stale connection");
                    return;
                }
                emit_frame_debug(generation, &text);
                match decode_frame(&text) {
                    Ok(Some(event)) => self.apply(event),
                    Ok(None) => {}
                    Err(err) => {
                        emit_decode_error(generation, &text, &err);
                        self.notify(SessionNotice::DecodeError {
                            generation,
                            message: err.to_string(),
                        });
                    }
                }
            }
            TransportEvent::Disconnected { generation, error } => {
                if self.generation == Some(generation) {
                    self.generation = None;
                }
                if self.state.is_streaming {
                    self.state.is_streaming = false;
                    self.publish();
                }
                self.notify(SessionNotice::ConnectionError {
                    generation,
                    message: error,
                });
            }
            TransportEvent::Closed => {}
        }
    }

    fn apply(&mut self, event: AuiEvent) {
        let protocol_error = match &event {
            AuiEvent::Error { message } if self.state.error.is_none() => Some(message.clone()),
            _ => None,
        };
        self.state.apply_event(&event);
        self.publish();
        if let Some(message) = protocol_error {
            self.notify(SessionNotice::ProtocolError(message));
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Foreground => self.transport.foreground(),
            SessionCommand::Resolve { action, reply } => self.resolve(action, reply),
        }
    }

    fn resolve(&mut self, action: String, reply: ResolutionReply) {
        let resolution = match self.state.begin_resolution(&action) {
            ResolutionStart::Ready(resolution) => resolution,
            ResolutionStart::AlreadySubmitted => {
                debug!(action = %action, "interrupt already submitted; ignoring");
                let _ = reply.send(Ok(ResolutionOutcome::AlreadySubmitted));
                return;
            }
            ResolutionStart::NoPendingInterrupt => {
                let _ = reply.send(Ok(ResolutionOutcome::NoPendingInterrupt));
                return;
            }
            ResolutionStart::UnknownAction => {
                let interrupt_id = self
                    .state
                    .interrupt
                    .as_ref()
                    .map(|pending| pending.interrupt.id.clone())
                    .unwrap_or_default();
                let _ = reply.send(Err(DispatchError::InvalidAction {
                    action,
                    interrupt_id,
                }));
                return;
            }
        };
        self.publish();

        match self.dispatcher.deliver(&self.transport, &resolution) {
            Ok(Delivery::Sent) => {
                let _ = reply.send(Ok(ResolutionOutcome::Delivered(DeliveryRoute::Transport)));
            }
            Ok(Delivery::Pending(request)) => {
                let interrupt_id = resolution.interrupt_id;
                self.inflight.spawn(async move {
                    SettledResolution {
                        interrupt_id,
                        result: request.await,
                        reply,
                    }
                });
            }
            Err(err) => self.fail_resolution(&resolution.interrupt_id, err, reply),
        }
    }

    fn settle(&mut self, joined: Result<SettledResolution, JoinError>) {
        let settled = match joined {
            Ok(settled) => settled,
            Err(err) => {
                warn!(error = %err, "fallback resolution task did not complete");
                return;
            }
        };
        match settled.result {
            Ok(()) => {
                info!(interrupt_id = %settled.interrupt_id, "resolution delivered via fallback");
                let _ = settled
                    .reply
                    .send(Ok(ResolutionOutcome::Delivered(DeliveryRoute::Fallback)));
            }
            Err(err) => self.fail_resolution(&settled.interrupt_id, err, settled.reply),
        }
    }

    fn fail_resolution(&mut self, interrupt_id: &str, error: DispatchError, reply: ResolutionReply) {
        warn!(interrupt_id, error = %error, "resolution delivery failed; interrupt reopened");
        if self.state.resolution_failed(interrupt_id) {
            self.publish();
        }
        self.notify(SessionNotice::ResolutionFailed {
            interrupt_id: interrupt_id.to_string(),
            error: error.clone(),
        });
        let _ = reply.send(Err(error));
    }

    fn publish(&self) {
        let state = &self.state;
        self.state_tx.send_if_modified(|current| {
            if **current == *state {
                return false;
            }
            *current = Arc::new(state.clone());
            true
        });
    }

    fn notify(&self, notice: SessionNotice) {
        let _ = self.notices.send(notice);
    }
}
