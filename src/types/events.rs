use super::model::{
    empty_object, ActivityStatus, ComponentSpec, InterruptPayload, Message, ToolCallPhase,
};
use crate::patch::PatchOperation;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every `type` the decoder accepts. Anything else is dropped as forward-compatible noise.
pub const KNOWN_EVENT_TYPES: &[&str] = &[
    "stream_start",
    "render_snapshot",
    "state_snapshot",
    "text_delta",
    "state_delta",
    "text_message_start",
    "text_message_end",
    "messages_snapshot",
    "activity_snapshot",
    "activity_delta",
    "tool_call_start",
    "tool_call_args",
    "tool_call_end",
    "tool_call_result",
    "run_started",
    "run_finished",
    "run_error",
    "interrupt",
    "stream_end",
    "error",
];

/// Server → client envelope, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuiEvent {
    StreamStart,
    RenderSnapshot {
        ui: UiPayload,
        intention: String,
        target_level: String,
    },
    StateSnapshot {
        state: ComponentSpec,
    },
    TextDelta {
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field_path: Option<String>,
    },
    StateDelta {
        delta: Vec<PatchOperation>,
    },
    TextMessageStart {
        message_id: String,
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Map<String, Value>>,
    },
    TextMessageEnd {
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_content: Option<String>,
    },
    MessagesSnapshot {
        messages: Vec<Message>,
    },
    ActivitySnapshot {
        activity_id: String,
        name: String,
        status: ActivityStatus,
        progress: f64,
        #[serde(default)]
        current_step: Option<String>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    ActivityDelta {
        activity_id: String,
        delta: Vec<PatchOperation>,
    },
    ToolCallStart(ToolCallFields),
    ToolCallArgs(ToolCallFields),
    ToolCallEnd(ToolCallFields),
    ToolCallResult(ToolCallFields),
    RunStarted {
        #[serde(default)]
        task_description: Option<String>,
    },
    RunFinished {
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    RunError {
        #[serde(default)]
        error_message: String,
    },
    Interrupt {
        interrupt_id: String,
        reason: String,
        required_action: String,
        #[serde(default)]
        payload: InterruptPayload,
    },
    StreamEnd,
    Error {
        message: String,
    },
}

impl AuiEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            AuiEvent::StreamStart => "stream_start",
            AuiEvent::RenderSnapshot { .. } => "render_snapshot",
            AuiEvent::StateSnapshot { .. } => "state_snapshot",
            AuiEvent::TextDelta { .. } => "text_delta",
            AuiEvent::StateDelta { .. } => "state_delta",
            AuiEvent::TextMessageStart { .. } => "text_message_start",
            AuiEvent::TextMessageEnd { .. } => "text_message_end",
            AuiEvent::MessagesSnapshot { .. } => "messages_snapshot",
            AuiEvent::ActivitySnapshot { .. } => "activity_snapshot",
            AuiEvent::ActivityDelta { .. } => "activity_delta",
            AuiEvent::ToolCallStart(_) => "tool_call_start",
            AuiEvent::ToolCallArgs(_) => "tool_call_args",
            AuiEvent::ToolCallEnd(_) => "tool_call_end",
            AuiEvent::ToolCallResult(_) => "tool_call_result",
            AuiEvent::RunStarted { .. } => "run_started",
            AuiEvent::RunFinished { .. } => "run_finished",
            AuiEvent::RunError { .. } => "run_error",
            AuiEvent::Interrupt { .. } => "interrupt",
            AuiEvent::StreamEnd => "stream_end",
            AuiEvent::Error { .. } => "error",
        }
    }

    /// Tool-call events flattened into their log phase.
    pub fn tool_call(&self) -> Option<(ToolCallPhase, &ToolCallFields)> {
        match self {
            AuiEvent::ToolCallStart(fields) => Some((ToolCallPhase::Start, fields)),
            AuiEvent::ToolCallArgs(fields) => Some((ToolCallPhase::Args, fields)),
            AuiEvent::ToolCallEnd(fields) => Some((ToolCallPhase::End, fields)),
            AuiEvent::ToolCallResult(fields) => Some((ToolCallPhase::Result, fields)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiPayload {
    pub component: String,
    #[serde(default = "empty_object")]
    pub props: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallFields {
    pub tool_call_id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}
