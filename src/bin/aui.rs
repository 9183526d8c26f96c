use anyhow::{Context, Result};
use aui_sync::binding::ComponentRegistry;
use aui_sync::config::Config;
use aui_sync::dispatch::ResolutionOutcome;
use aui_sync::logging::init_tracing;
use aui_sync::session::{Session, SessionHandle, SessionNotice};
use aui_sync::state::SessionState;
use aui_sync::types::ComponentSpec;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Resolve(String),
    Foreground,
    State,
    Quit,
    Empty,
    Unknown(String),
}

fn parse_command(line: &str) -> CliCommand {
    let line = line.trim();
    if line.is_empty() {
        return CliCommand::Empty;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head {
        "/resolve" if !rest.is_empty() => CliCommand::Resolve(rest.to_string()),
        "/foreground" | "/fg" => CliCommand::Foreground,
        "/state" => CliCommand::State,
        "/quit" | "/exit" => CliCommand::Quit,
        _ => CliCommand::Unknown(line.to_string()),
    }
}

fn prop_text<'a>(spec: &'a ComponentSpec, key: &str) -> &'a str {
    spec.props.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn build_registry() -> ComponentRegistry<String> {
    let mut registry = ComponentRegistry::new().with_fallback(|spec: &ComponentSpec| {
        let fields = spec.props.as_object().map(|props| props.len()).unwrap_or(0);
        format!("[{}] {} field(s)", spec.component, fields)
    });
    registry.register("VocabCard", |spec: &ComponentSpec| {
        format!(
            "[VocabCard {}] {}: {}",
            spec.target_level,
            prop_text(spec, "word"),
            prop_text(spec, "definition")
        )
    });
    registry.register("StoryReader", |spec: &ComponentSpec| {
        format!(
            "[StoryReader {}] {}",
            spec.target_level,
            prop_text(spec, "title")
        )
    });
    registry
}

fn describe_interrupt(state: &SessionState) -> Option<String> {
    let pending = state.interrupt.as_ref().filter(|pending| !pending.submitted)?;
    let interrupt = &pending.interrupt;
    let choices = match interrupt.payload.options.as_deref() {
        Some(options) if !options.is_empty() => options
            .iter()
            .map(|option| format!("{} ({})", option.action, option.label))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "any text".to_string(),
    };
    Some(format!(
        "decision needed [{}]: {} -> /resolve {}",
        interrupt.id, interrupt.reason, choices
    ))
}

fn print_state(state: &SessionState, registry: &ComponentRegistry<String>) -> Result<()> {
    println!("{}", serde_json::to_string(state)?);
    if let Some(summary) = registry.render_state(state) {
        println!("{summary}");
    }
    if let Some(prompt) = describe_interrupt(state) {
        println!("{prompt}");
    }
    Ok(())
}

fn print_notice(notice: &SessionNotice) {
    match notice {
        SessionNotice::Connection(state) => eprintln!("connection: {state:?}"),
        SessionNotice::Reset { generation } => {
            eprintln!("connection #{generation} started; state cleared")
        }
        SessionNotice::ConnectionError {
            generation,
            message,
        } => eprintln!("connection #{generation} lost: {message}"),
        SessionNotice::ProtocolError(message) => eprintln!("stream error: {message}"),
        SessionNotice::DecodeError { message, .. } => eprintln!("dropped frame: {message}"),
        SessionNotice::ResolutionFailed {
            interrupt_id,
            error,
        } => eprintln!("resolution of {interrupt_id} failed: {error}; you may retry"),
    }
}

/// Runs the resolution on its own task so a slow fallback request never
/// stalls output or Ctrl-C.
fn spawn_resolve(handle: &Arc<SessionHandle>, action: String) -> JoinHandle<()> {
    let handle = Arc::clone(handle);
    tokio::spawn(async move { resolve(&handle, action).await })
}

async fn resolve(handle: &SessionHandle, action: String) {
    match handle.resolve_interrupt(action).await {
        Ok(ResolutionOutcome::Delivered(route)) => eprintln!("resolution delivered via {route:?}"),
        Ok(ResolutionOutcome::AlreadySubmitted) => eprintln!("already submitted"),
        Ok(ResolutionOutcome::NoPendingInterrupt) => eprintln!("no decision pending"),
        Err(err) => eprintln!("resolution failed: {err}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Config::load()?;
    config.validate()?;
    info!(
        session_id = %config.session_id,
        url = %config.stream_url,
        transport = %config.transport,
        "starting session"
    );

    let registry = build_registry();
    let handle = Arc::new(Session::from_config(&config).spawn());
    let mut notices = handle
        .take_notices()
        .context("session notices already taken")?;
    let mut states = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = states.borrow_and_update().clone();
                print_state(&snapshot, &registry)?;
            }
            Some(notice) = notices.recv() => print_notice(&notice),
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_command(&line) {
                    CliCommand::Resolve(action) => {
                        spawn_resolve(&handle, action);
                    }
                    CliCommand::Foreground => handle.foreground(),
                    CliCommand::State => print_state(&handle.state(), &registry)?,
                    CliCommand::Quit => break,
                    CliCommand::Empty => {}
                    CliCommand::Unknown(input) => eprintln!(
                        "unknown command '{input}'; try /resolve <action>, /foreground, /state, /quit"
                    ),
                }
            }
        }
    }

    handle.dispose().await;
    Ok(())
}
