use super::{OpenConnection, TransportBinding, TransportError, TransportKind};
use futures::future::{self, BoxFuture};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

/// Duplex binding over a WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketBinding {
    url: String,
}

impl WebSocketBinding {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl TransportBinding for WebSocketBinding {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn open(&self) -> BoxFuture<'_, Result<OpenConnection, TransportError>> {
        Box::pin(async move {
            let (ws, response) =
                connect_async(self.url.as_str())
                    .await
                    .map_err(|err| TransportError::Connect {
                        url: self.url.clone(),
                        message: err.to_string(),
                    })?;
            debug!(url = %self.url, status = %response.status(), "websocket handshake complete");

            let (write, read) = ws.split();
            let frames = read.filter_map(|message| future::ready(inbound_frame(message)));
            let outbound = write
                .sink_map_err(|err| TransportError::Write(err.to_string()))
                .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text))));

            Ok(OpenConnection {
                frames: Box::pin(frames),
                outbound: Some(Box::pin(outbound)),
            })
        })
    }
}

fn inbound_frame(
    message: Result<Message, tungstenite::Error>,
) -> Option<Result<String, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(data)) => match String::from_utf8(data) {
            Ok(text) => Some(Ok(text)),
            Err(err) => {
                warn!(error = %err, "dropping non-UTF-8 binary frame");
                None
            }
        },
        Ok(Message::Close(frame)) => {
            if let Some(frame) = frame {
                debug!(code = ?frame.code, reason = %frame.reason, "websocket closed by peer");
            }
            Some(Err(TransportError::ClosedByPeer))
        }
        Ok(_) => None,
        Err(err) => Some(Err(TransportError::Read(err.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_text_and_binary_frames_become_text() {
        assert_eq!(
            inbound_frame(Ok(Message::Text("{}".to_string()))),
            Some(Ok("{}".to_string()))
        );
        assert_eq!(
            inbound_frame(Ok(Message::Binary(b"{\"type\":\"stream_end\"}".to_vec()))),
            Some(Ok("{\"type\":\"stream_end\"}".to_string()))
        );
        assert_eq!(inbound_frame(Ok(Message::Binary(vec![0xff, 0xfe]))), None);
    }

    #[test]
    fn test_control_frames_are_skipped_and_close_ends_stream() {
        assert_eq!(inbound_frame(Ok(Message::Ping(vec![1]))), None);
        assert_eq!(inbound_frame(Ok(Message::Pong(vec![]))), None);
        assert_eq!(
            inbound_frame(Ok(Message::Close(None))),
            Some(Err(TransportError::ClosedByPeer))
        );
    }
}
