use anyhow::{anyhow, Result};
use aui_sync::dispatch::{ActionDispatcher, DeliveryRoute, ResolutionOutcome};
use aui_sync::session::Session;
use aui_sync::transport::{
    BackoffPolicy, ConnectionState, TransportEvent, TransportManager, WebSocketBinding,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

const WAIT: Duration = Duration::from_secs(5);

fn policy() -> BackoffPolicy {
    BackoffPolicy {
        initial: Duration::from_millis(20),
        max: Duration::from_millis(100),
        jitter: false,
    }
}

async fn listen() -> Result<(TcpListener, String)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/agui", listener.local_addr()?);
    Ok((listener, url))
}

async fn accept_ws(listener: &TcpListener) -> Result<WebSocketStream<tokio::net::TcpStream>> {
    let (stream, _) = timeout(WAIT, listener.accept()).await??;
    Ok(accept_async(stream).await?)
}

async fn send_event(ws: &mut WebSocketStream<tokio::net::TcpStream>, event: Value) -> Result<()> {
    ws.send(Message::Text(event.to_string())).await?;
    Ok(())
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Result<TransportEvent> {
    timeout(WAIT, events.recv())
        .await?
        .ok_or_else(|| anyhow!("transport events closed"))
}

#[tokio::test]
async fn test_websocket_frames_reach_manager_and_peer_close_reconnects() -> Result<()> {
    let (listener, url) = listen().await?;
    let (manager, mut events) = TransportManager::new(Arc::new(WebSocketBinding::new(url)), policy());
    manager.connect();

    let mut ws = accept_ws(&listener).await?;
    send_event(&mut ws, json!({"type": "stream_start"})).await?;

    assert_eq!(
        next_event(&mut events).await?,
        TransportEvent::Connecting {
            generation: 1,
            attempt: 0
        }
    );
    assert_eq!(
        next_event(&mut events).await?,
        TransportEvent::Connected { generation: 1 }
    );
    assert_eq!(
        next_event(&mut events).await?,
        TransportEvent::Frame {
            generation: 1,
            text: r#"{"type":"stream_start"}"#.to_string()
        }
    );
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.send(r#"{"type":"ping"}"#.to_string())?;
    let echoed = timeout(WAIT, ws.next())
        .await?
        .ok_or_else(|| anyhow!("client went away"))??;
    assert_eq!(echoed, Message::Text(r#"{"type":"ping"}"#.to_string()));

    ws.close(None).await?;
    assert_eq!(
        next_event(&mut events).await?,
        TransportEvent::Disconnected {
            generation: 1,
            error: "connection closed by peer".to_string()
        }
    );

    let mut second = accept_ws(&listener).await?;
    assert_eq!(
        next_event(&mut events).await?,
        TransportEvent::Connecting {
            generation: 2,
            attempt: 1
        }
    );
    send_event(&mut second, json!({"type": "stream_end"})).await?;
    assert_eq!(
        next_event(&mut events).await?,
        TransportEvent::Connected { generation: 2 }
    );

    manager.dispose().await;
    assert_eq!(manager.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn test_refused_websocket_reports_connect_error() -> Result<()> {
    let (listener, url) = listen().await?;
    drop(listener);

    let (manager, mut events) =
        TransportManager::new(Arc::new(WebSocketBinding::new(url.clone())), policy());
    manager.connect();

    assert!(matches!(
        next_event(&mut events).await?,
        TransportEvent::Connecting { generation: 1, .. }
    ));
    match next_event(&mut events).await? {
        TransportEvent::Disconnected { generation, error } => {
            assert_eq!(generation, 1);
            assert!(error.starts_with(&format!("cannot connect to '{url}'")), "{error}");
        }
        other => return Err(anyhow!("unexpected event {other:?}")),
    }
    assert_ne!(manager.state(), ConnectionState::Connected);
    manager.dispose().await;
    Ok(())
}

#[tokio::test]
async fn test_session_resolves_interrupt_over_websocket() -> Result<()> {
    let (listener, url) = listen().await?;
    let handle = Session::new(
        Arc::new(WebSocketBinding::new(url)),
        policy(),
        ActionDispatcher::new("ws-session", None),
    )
    .spawn();

    let mut ws = accept_ws(&listener).await?;
    send_event(
        &mut ws,
        json!({
            "type": "interrupt",
            "interrupt_id": "i7",
            "reason": "name_story",
            "required_action": "input",
            "payload": {}
        }),
    )
    .await?;

    let mut states = handle.subscribe();
    timeout(WAIT, states.wait_for(|state| state.awaiting_decision())).await??;

    assert_eq!(
        handle.resolve_interrupt("The Fox").await?,
        ResolutionOutcome::Delivered(DeliveryRoute::Transport)
    );

    let frame = timeout(WAIT, ws.next())
        .await?
        .ok_or_else(|| anyhow!("client went away"))??;
    let Message::Text(text) = frame else {
        return Err(anyhow!("expected a text frame, got {frame:?}"));
    };
    let sent: Value = serde_json::from_str(&text)?;
    assert_eq!(sent["type"], json!("input"));
    assert_eq!(sent["session_id"], json!("ws-session"));
    assert_eq!(sent["action"], json!("The Fox"));
    assert_eq!(sent["payload"]["interrupt_id"], json!("i7"));

    handle.dispose().await;
    Ok(())
}
