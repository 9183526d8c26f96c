use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::transport::{BackoffPolicy, TransportKind};
use crate::util::{env_flag, is_local_endpoint_url, url_scheme};

const DEFAULT_STREAM_URL: &str = "ws://localhost:8000/agui/ws";
const DEFAULT_BACKOFF_INITIAL_MS: u64 = 500;
const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub session_id: String,
    pub stream_url: String,
    pub transport: TransportKind,
    pub resolve_url: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Config {
    pub fn load() -> Result<Self> {
        let session_id = std::env::var("AUI_SESSION_ID")
            .context("AUI_SESSION_ID not set")?
            .trim()
            .to_string();
        let stream_url = non_empty_env("AUI_STREAM_URL")
            .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string());
        let transport = match non_empty_env("AUI_TRANSPORT") {
            Some(raw) => match parse_transport(&raw) {
                Some(kind) => kind,
                None => bail!("Invalid AUI_TRANSPORT '{raw}': expected 'websocket' or 'sse'"),
            },
            None => infer_transport(&stream_url),
        };
        let resolve_url = non_empty_env("AUI_RESOLVE_URL");

        let initial = millis_env("AUI_BACKOFF_INITIAL_MS", DEFAULT_BACKOFF_INITIAL_MS)?;
        let max = millis_env("AUI_BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS)?;
        let jitter = env_flag("AUI_BACKOFF_JITTER", true);

        Ok(Self {
            session_id,
            stream_url,
            transport,
            resolve_url,
            backoff: BackoffPolicy {
                initial: Duration::from_millis(initial),
                max: Duration::from_millis(max),
                jitter,
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            bail!("AUI_SESSION_ID must not be empty");
        }

        let scheme = url_scheme(&self.stream_url).unwrap_or_default();
        match self.transport {
            TransportKind::WebSocket if scheme != "ws" && scheme != "wss" => bail!(
                "Invalid AUI_STREAM_URL '{}': websocket transport expects a ws:// or wss:// URL",
                self.stream_url
            ),
            TransportKind::Sse if scheme != "http" && scheme != "https" => bail!(
                "Invalid AUI_STREAM_URL '{}': sse transport expects an http:// or https:// URL",
                self.stream_url
            ),
            _ => {}
        }

        if let Some(resolve_url) = &self.resolve_url {
            let scheme = url_scheme(resolve_url).unwrap_or_default();
            if scheme != "http" && scheme != "https" {
                bail!(
                    "Invalid AUI_RESOLVE_URL '{}': expected http:// or https:// URL",
                    resolve_url
                );
            }
        }

        if self.backoff.initial.is_zero() {
            bail!("AUI_BACKOFF_INITIAL_MS must be greater than zero");
        }
        if self.backoff.initial > self.backoff.max {
            bail!(
                "AUI_BACKOFF_INITIAL_MS ({}ms) must not exceed AUI_BACKOFF_MAX_MS ({}ms)",
                self.backoff.initial.as_millis(),
                self.backoff.max.as_millis()
            );
        }

        for url in std::iter::once(&self.stream_url).chain(self.resolve_url.as_ref()) {
            let scheme = url_scheme(url).unwrap_or_default();
            if (scheme == "ws" || scheme == "http") && !is_local_endpoint_url(url) {
                warn!(url = %url, "plaintext endpoint configured for a non-local host");
            }
        }

        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn millis_env(name: &str, default: u64) -> Result<u64> {
    match non_empty_env(name) {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("Invalid {name} '{raw}': expected milliseconds")),
        None => Ok(default),
    }
}

fn parse_transport(value: &str) -> Option<TransportKind> {
    match value.trim().to_ascii_lowercase().as_str() {
        "websocket" | "ws" | "duplex" => Some(TransportKind::WebSocket),
        "sse" | "eventsource" | "legacy" => Some(TransportKind::Sse),
        _ => None,
    }
}

fn infer_transport(stream_url: &str) -> TransportKind {
    match url_scheme(stream_url).as_deref() {
        Some("http") | Some("https") => TransportKind::Sse,
        _ => TransportKind::WebSocket,
    }
}
