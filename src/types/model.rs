use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The declarative UI snapshot currently hydrated for the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentSpec {
    pub component: String,
    #[serde(default = "empty_object")]
    pub props: Value,
    pub intention: String,
    pub target_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "isStreaming")]
    pub is_streaming: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub status: ActivityStatus,
    pub progress: f64,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Activity {
    pub fn progress_in_range(&self) -> bool {
        self.progress.is_finite() && (0.0..=1.0).contains(&self.progress)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallPhase {
    Start,
    Args,
    End,
    Result,
}

/// One raw entry of the tool-call log. Phase-specific fields (`tool_name`,
/// `delta`, `status`, `duration_ms`, `result`, ...) stay in `fields`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallEvent {
    pub phase: ToolCallPhase,
    pub tool_call_id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl ToolCallEvent {
    pub fn tool_name(&self) -> Option<&str> {
        self.str_field("tool_name")
    }

    pub fn status(&self) -> Option<&str> {
        self.str_field("status")
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.fields.get("duration_ms").and_then(Value::as_u64)
    }

    pub fn result(&self) -> Option<&Value> {
        self.fields.get("result")
    }

    /// Argument text carried by an `args` event, either as a streamed `delta`
    /// or as a complete `args` value.
    pub fn args_fragment(&self) -> Option<String> {
        if let Some(delta) = self.str_field("delta") {
            return Some(delta.to_string());
        }
        match self.fields.get("args") {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunState {
    Started {
        task_description: Option<String>,
    },
    Finished {
        duration_ms: Option<u64>,
    },
    Error {
        error_message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterruptOption {
    pub action: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InterruptPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<InterruptOption>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interrupt {
    pub id: String,
    pub reason: String,
    pub required_action: String,
    #[serde(default)]
    pub payload: InterruptPayload,
}

impl Interrupt {
    pub fn option(&self, action: &str) -> Option<&InterruptOption> {
        self.payload
            .options
            .as_deref()
            .and_then(|options| options.iter().find(|option| option.action == action))
    }

    pub fn has_options(&self) -> bool {
        self.payload
            .options
            .as_ref()
            .is_some_and(|options| !options.is_empty())
    }
}

/// The single HITL gate slot. `submitted` flips to true exactly once per
/// delivery attempt and is only cleared when that attempt fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingInterrupt {
    pub interrupt: Interrupt,
    pub submitted: bool,
}

/// Client → server frames on duplex transports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Input {
        session_id: String,
        action: String,
        payload: Value,
    },
}

/// Out-of-band resolution body for the fallback channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub session_id: String,
    pub action: String,
    pub label: String,
    pub interrupt_id: String,
}

pub(crate) fn empty_object() -> Value {
    Value::Object(Map::new())
}
