use crate::state::Resolution;
use crate::transport::{TransportError, TransportManager};
use crate::types::{ClientFrame, ResolutionRequest};
use crate::util::is_local_endpoint_url;
use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const FALLBACK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("action '{action}' is not valid for interrupt '{interrupt_id}'")]
    InvalidAction {
        action: String,
        interrupt_id: String,
    },
    #[error("transport send failed: {0}")]
    Transport(#[from] TransportError),
    #[error("cannot encode input frame: {0}")]
    Encode(String),
    #[error("transport is unavailable and no fallback resolution endpoint is configured")]
    FallbackUnavailable,
    #[error("{message}")]
    Fallback { url: String, message: String },
    #[error("fallback endpoint '{url}' returned HTTP {status}")]
    FallbackStatus { url: String, status: u16 },
    #[error("session is closed")]
    SessionClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryRoute {
    Transport,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Delivered(DeliveryRoute),
    /// The gate was already claimed; nothing was sent.
    AlreadySubmitted,
    NoPendingInterrupt,
}

/// Out-of-band resolution path used when the duplex transport cannot carry
/// the decision.
pub trait FallbackChannel: Send + Sync {
    fn resolve(&self, request: ResolutionRequest) -> BoxFuture<'static, Result<(), DispatchError>>;
}

/// POSTs the resolution as JSON; any 2xx status counts as delivered.
#[derive(Debug, Clone)]
pub struct HttpFallback {
    http: reqwest::Client,
    url: String,
}

impl HttpFallback {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

impl FallbackChannel for HttpFallback {
    fn resolve(&self, request: ResolutionRequest) -> BoxFuture<'static, Result<(), DispatchError>> {
        let http = self.http.clone();
        let url = self.url.clone();
        Box::pin(async move {
            let response = http
                .post(&url)
                .timeout(FALLBACK_TIMEOUT)
                .json(&request)
                .send()
                .await
                .map_err(|err| map_fallback_error(err, &url))?;

            let status = response.status();
            if !status.is_success() {
                return Err(DispatchError::FallbackStatus {
                    url,
                    status: status.as_u16(),
                });
            }
            Ok(())
        })
    }
}

fn map_fallback_error(error: reqwest::Error, url: &str) -> DispatchError {
    if let Some(status) = error.status() {
        return DispatchError::FallbackStatus {
            url: url.to_string(),
            status: status.as_u16(),
        };
    }
    let message = if error.is_connect() && is_local_endpoint_url(url) {
        format!(
            "cannot reach local resolution endpoint '{url}': {error}. Start the agent server or update AUI_RESOLVE_URL."
        )
    } else if error.is_connect() {
        format!("cannot reach resolution endpoint '{url}': {error}")
    } else if error.is_timeout() {
        format!("resolution request to '{url}' timed out: {error}")
    } else {
        format!("resolution request to '{url}' failed: {error}")
    };
    DispatchError::Fallback {
        url: url.to_string(),
        message,
    }
}

/// How a claimed resolution is being delivered.
pub enum Delivery {
    /// Queued on the live duplex connection.
    Sent,
    /// Out-of-band request; completes when the fallback endpoint answers.
    Pending(BoxFuture<'static, Result<(), DispatchError>>),
}

pub struct ActionDispatcher {
    session_id: String,
    fallback: Option<Arc<dyn FallbackChannel>>,
}

impl ActionDispatcher {
    pub fn new(session_id: impl Into<String>, fallback: Option<Arc<dyn FallbackChannel>>) -> Self {
        Self {
            session_id: session_id.into(),
            fallback,
        }
    }

    pub fn input_frame(&self, resolution: &Resolution) -> Result<String, DispatchError> {
        let frame = ClientFrame::Input {
            session_id: self.session_id.clone(),
            action: resolution.action.clone(),
            payload: json!({
                "interrupt_id": resolution.interrupt_id,
                "label": resolution.label,
            }),
        };
        serde_json::to_string(&frame).map_err(|err| DispatchError::Encode(err.to_string()))
    }

    pub fn fallback_request(&self, resolution: &Resolution) -> ResolutionRequest {
        ResolutionRequest {
            session_id: self.session_id.clone(),
            action: resolution.action.clone(),
            label: resolution.label.clone(),
            interrupt_id: resolution.interrupt_id.clone(),
        }
    }

    /// Makes the single delivery attempt for `resolution`: the duplex
    /// transport when it is connected, otherwise the fallback channel.
    pub fn deliver(
        &self,
        transport: &TransportManager,
        resolution: &Resolution,
    ) -> Result<Delivery, DispatchError> {
        if transport.is_duplex() && transport.state().is_connected() {
            transport.send(self.input_frame(resolution)?)?;
            info!(
                interrupt_id = %resolution.interrupt_id,
                action = %resolution.action,
                "resolution sent over transport"
            );
            return Ok(Delivery::Sent);
        }

        let Some(fallback) = self.fallback.as_ref() else {
            return Err(DispatchError::FallbackUnavailable);
        };
        info!(
            interrupt_id = %resolution.interrupt_id,
            action = %resolution.action,
            transport = %transport.kind(),
            state = ?transport.state(),
            "resolution routed to fallback"
        );
        Ok(Delivery::Pending(
            fallback.resolve(self.fallback_request(resolution)),
        ))
    }
}
