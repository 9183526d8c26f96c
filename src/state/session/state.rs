use crate::state::tool_timeline::{timeline, ToolCallGroup};
use crate::types::{Activity, ComponentSpec, Message, PendingInterrupt, RunState, ToolCallEvent};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything hydrated from one connection's event log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    pub component_spec: Option<ComponentSpec>,
    pub messages: Vec<Message>,
    pub activities: BTreeMap<String, Activity>,
    pub tool_calls: Vec<ToolCallEvent>,
    pub run_state: Option<RunState>,
    pub interrupt: Option<PendingInterrupt>,
    pub is_streaming: bool,
    /// Set by a producer `error` event. While set, only `stream_start` is applied.
    pub error: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.activities.get(id)
    }

    pub fn tool_timeline(&self) -> Vec<ToolCallGroup> {
        timeline(&self.tool_calls)
    }

    /// True while an interrupt is installed and not yet submitted.
    pub fn awaiting_decision(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|pending| !pending.submitted)
    }

    pub(super) fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id == id)
    }
}
