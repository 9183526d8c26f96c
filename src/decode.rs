use crate::types::{AuiEvent, KNOWN_EVENT_TYPES};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// End-of-stream marker some producers send as a bare frame.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("frame is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
    #[error("frame has no string `type` discriminator")]
    MissingType,
    #[error("malformed `{event_type}` frame: {source}")]
    Malformed {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid `{event_type}` frame: {reason}")]
    Invalid {
        event_type: &'static str,
        reason: String,
    },
}

/// Parses one inbound frame into an event.
///
/// Unknown `type` values and the `[DONE]` sentinel yield `Ok(None)` so newer
/// producers do not break older clients. Everything else that cannot become a well-formed event is
/// an error and must not reach the reducer.
pub fn decode_frame(frame: &str) -> Result<Option<AuiEvent>, DecodeError> {
    let frame = frame.trim();
    if frame == DONE_SENTINEL {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(frame).map_err(DecodeError::InvalidJson)?;
    decode_value(value)
}

pub fn decode_value(value: Value) -> Result<Option<AuiEvent>, DecodeError> {
    let Value::Object(ref object) = value else {
        return Err(DecodeError::NotAnObject(crate::patch::value_kind(&value)));
    };
    let Some(event_type) = object.get("type").and_then(Value::as_str) else {
        return Err(DecodeError::MissingType);
    };
    if !KNOWN_EVENT_TYPES.contains(&event_type) {
        warn!(event_type, "dropping frame with unknown event type");
        return Ok(None);
    }
    let event_type = event_type.to_string();

    let event: AuiEvent = serde_json::from_value(value)
        .map_err(|source| DecodeError::Malformed { event_type, source })?;
    validate(&event)?;
    Ok(Some(event))
}

fn validate(event: &AuiEvent) -> Result<(), DecodeError> {
    let invalid = |reason: &str| DecodeError::Invalid {
        event_type: event.type_name(),
        reason: reason.to_string(),
    };

    match event {
        AuiEvent::TextMessageStart { message_id, .. }
        | AuiEvent::TextMessageEnd { message_id, .. } => {
            if message_id.trim().is_empty() {
                return Err(invalid("message_id must not be empty"));
            }
        }
        AuiEvent::TextDelta { message_id: Some(message_id), .. } if message_id.is_empty() => {
            return Err(invalid("message_id must not be empty when present"));
        }
        AuiEvent::MessagesSnapshot { messages } => {
            if messages.iter().any(|message| message.id.trim().is_empty()) {
                return Err(invalid("every message needs an id"));
            }
        }
        AuiEvent::ActivitySnapshot {
            activity_id,
            progress,
            ..
        } => {
            if activity_id.trim().is_empty() {
                return Err(invalid("activity_id must not be empty"));
            }
            if !progress.is_finite() || !(0.0..=1.0).contains(progress) {
                return Err(invalid("progress must be within [0, 1]"));
            }
        }
        AuiEvent::ActivityDelta { activity_id, .. } if activity_id.trim().is_empty() => {
            return Err(invalid("activity_id must not be empty"));
        }
        AuiEvent::Interrupt { interrupt_id, .. } if interrupt_id.trim().is_empty() => {
            return Err(invalid("interrupt_id must not be empty"));
        }
        _ => {}
    }

    if let Some((_, fields)) = event.tool_call() {
        if fields.tool_call_id.trim().is_empty() {
            return Err(invalid("tool_call_id must not be empty"));
        }
    }
    Ok(())
}
