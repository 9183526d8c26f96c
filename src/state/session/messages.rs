use super::SessionState;
use crate::patch::value_kind;
use crate::types::Message;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Props field that receives legacy deltas which name no field path.
pub const DEFAULT_FIELD_PATH: &str = "text";

#[derive(Debug, Error, PartialEq)]
enum FieldPathError {
    #[error("field path is empty or has an empty segment")]
    EmptySegment,
    #[error("segment '{0}' is not an index into an array")]
    InvalidIndex(String),
    #[error("index '{0}' is past the end of the array")]
    IndexOutOfBounds(String),
    #[error("cannot descend into a {found} at '{segment}'")]
    NotContainer {
        segment: String,
        found: &'static str,
    },
    #[error("target field is a {0}, not a string")]
    NotText(&'static str),
}

impl SessionState {
    pub(super) fn start_message(
        &mut self,
        id: &str,
        role: &str,
        metadata: Option<&Map<String, Value>>,
    ) {
        if let Some(existing) = self.message_mut(id) {
            debug!(message_id = id, "message restarted; reopening");
            existing.role = role.to_string();
            existing.is_streaming = true;
            if let Some(metadata) = metadata {
                existing.metadata = metadata.clone();
            }
            return;
        }
        self.messages.push(Message {
            id: id.to_string(),
            role: role.to_string(),
            content: String::new(),
            is_streaming: true,
            metadata: metadata.cloned().unwrap_or_default(),
        });
    }

    pub(super) fn apply_text_delta(
        &mut self,
        delta: &str,
        message_id: Option<&str>,
        field_path: Option<&str>,
    ) {
        match message_id {
            Some(id) => {
                if let Some(message) = self.message_mut(id) {
                    message.content.push_str(delta);
                    return;
                }
                debug!(message_id = id, "delta names no tracked message; routing to props");
            }
            None if field_path.is_none() => {
                if let Some(message) = self
                    .messages
                    .iter_mut()
                    .rev()
                    .find(|message| message.is_streaming)
                {
                    message.content.push_str(delta);
                    return;
                }
            }
            None => {}
        }
        self.accumulate_into_props(field_path.unwrap_or(DEFAULT_FIELD_PATH), delta);
    }

    pub(super) fn end_message(&mut self, id: &str, final_content: Option<&str>) {
        let Some(message) = self.message_mut(id) else {
            warn!(message_id = id, "text_message_end for unknown message; dropping");
            return;
        };
        if let Some(final_content) = final_content {
            message.content = final_content.to_string();
        }
        message.is_streaming = false;
    }

    pub(super) fn replace_messages(&mut self, messages: &[Message]) {
        self.messages = messages.to_vec();
    }

    fn accumulate_into_props(&mut self, field_path: &str, delta: &str) {
        let Some(spec) = self.component_spec.as_mut() else {
            warn!(field_path, "legacy text delta before any component snapshot; dropping");
            return;
        };
        let mut props = spec.props.clone();
        match append_at_field_path(&mut props, field_path, delta) {
            Ok(()) => spec.props = props,
            Err(err) => {
                warn!(field_path, error = %err, "legacy text delta rejected; keeping props")
            }
        }
    }
}

/// Appends `delta` to the string at dotted `path` inside `root`. Missing
/// object keys are created; numeric segments index existing arrays.
fn append_at_field_path(
    root: &mut Value,
    path: &str,
    delta: &str,
) -> Result<(), FieldPathError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(FieldPathError::EmptySegment);
    }
    let Some((last, parents)) = segments.split_last() else {
        return Err(FieldPathError::EmptySegment);
    };

    let mut current = root;
    for segment in parents {
        current = child_slot(current, segment, || Value::Object(Map::new()))?;
    }
    let target = child_slot(current, last, || Value::String(String::new()))?;

    if target.is_null() {
        *target = Value::String(String::new());
    }
    match target {
        Value::String(text) => {
            text.push_str(delta);
            Ok(())
        }
        other => Err(FieldPathError::NotText(value_kind(other))),
    }
}

fn child_slot<'a>(
    parent: &'a mut Value,
    segment: &str,
    missing: impl FnOnce() -> Value,
) -> Result<&'a mut Value, FieldPathError> {
    if parent.is_null() {
        *parent = Value::Object(Map::new());
    }
    match parent {
        Value::Object(map) => {
            let slot = map.entry(segment.to_string()).or_insert(Value::Null);
            if slot.is_null() {
                *slot = missing();
            }
            Ok(slot)
        }
        Value::Array(items) => {
            let index: usize = segment
                .parse()
                .map_err(|_| FieldPathError::InvalidIndex(segment.to_string()))?;
            items
                .get_mut(index)
                .ok_or_else(|| FieldPathError::IndexOutOfBounds(segment.to_string()))
        }
        other => Err(FieldPathError::NotContainer {
            segment: segment.to_string(),
            found: value_kind(other),
        }),
    }
}
