use super::stream::{SseFrame, SseParser};
use super::{FrameStream, OpenConnection, TransportBinding, TransportError, TransportKind};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{stream, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;

/// Legacy receive-only binding over `text/event-stream`.
#[derive(Debug, Clone)]
pub struct SseBinding {
    http: reqwest::Client,
    url: String,
}

impl SseBinding {
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

impl TransportBinding for SseBinding {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    fn open(&self) -> BoxFuture<'_, Result<OpenConnection, TransportError>> {
        Box::pin(async move {
            let response = self
                .http
                .get(&self.url)
                .header("accept", "text/event-stream")
                .header("cache-control", "no-cache")
                .send()
                .await
                .map_err(|err| map_request_error(err, &self.url))?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status {
                    url: self.url.clone(),
                    status: status.as_u16(),
                });
            }

            Ok(OpenConnection {
                frames: sse_frames(response.bytes_stream()),
                outbound: None,
            })
        })
    }
}

/// Turns a byte stream into decoded envelope texts.
pub fn sse_frames<S, E>(bytes: S) -> FrameStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = (Box::pin(bytes), SseParser::new(), VecDeque::<String>::new());
    Box::pin(stream::unfold(
        state,
        |(mut bytes, mut parser, mut pending)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (bytes, parser, pending)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(
                        parser
                            .process(&chunk)
                            .into_iter()
                            .map(SseFrame::into_envelope_text),
                    ),
                    Some(Err(err)) => {
                        let error = TransportError::Read(err.to_string());
                        return Some((Err(error), (bytes, parser, pending)));
                    }
                    None => return None,
                }
            }
        },
    ))
}

fn map_request_error(error: reqwest::Error, url: &str) -> TransportError {
    if let Some(status) = error.status() {
        return TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        };
    }
    let message = if error.is_connect() {
        format!("connection failed: {error}")
    } else if error.is_timeout() {
        format!("timed out: {error}")
    } else {
        error.to_string()
    };
    TransportError::Connect {
        url: url.to_string(),
        message,
    }
}
