use super::SessionState;
use crate::types::{ToolCallEvent, ToolCallFields, ToolCallPhase};

impl SessionState {
    /// Appends to the tool-call log. Entries are never rewritten.
    pub(super) fn record_tool_call(&mut self, phase: ToolCallPhase, fields: &ToolCallFields) {
        self.tool_calls.push(ToolCallEvent {
            phase,
            tool_call_id: fields.tool_call_id.clone(),
            fields: fields.fields.clone(),
        });
    }
}
