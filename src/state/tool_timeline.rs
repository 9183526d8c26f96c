//! Display grouping over the append-only tool-call log.

use crate::types::{ToolCallEvent, ToolCallPhase};
use serde::Serialize;
use serde_json::Value;

/// Everything known about one tool call, folded from its log entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallGroup {
    pub tool_call_id: String,
    pub tool_name: Option<String>,
    /// Concatenated `args` fragments in arrival order.
    pub args: String,
    pub status: Option<String>,
    pub duration_ms: Option<u64>,
    pub result: Option<Value>,
    pub latest_phase: ToolCallPhase,
    pub event_count: usize,
}

impl ToolCallGroup {
    fn new(event: &ToolCallEvent) -> Self {
        Self {
            tool_call_id: event.tool_call_id.clone(),
            tool_name: None,
            args: String::new(),
            status: None,
            duration_ms: None,
            result: None,
            latest_phase: event.phase,
            event_count: 0,
        }
    }

    fn absorb(&mut self, event: &ToolCallEvent) {
        self.event_count += 1;
        self.latest_phase = event.phase;
        if let Some(name) = event.tool_name() {
            self.tool_name = Some(name.to_string());
        }
        if event.phase == ToolCallPhase::Args {
            if let Some(fragment) = event.args_fragment() {
                self.args.push_str(&fragment);
            }
        }
        if let Some(status) = event.status() {
            self.status = Some(status.to_string());
        }
        if let Some(duration_ms) = event.duration_ms() {
            self.duration_ms = Some(duration_ms);
        }
        if let Some(result) = event.result() {
            self.result = Some(result.clone());
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.latest_phase, ToolCallPhase::End | ToolCallPhase::Result)
    }

    /// Arguments parsed as JSON once the producer has sent all of them.
    pub fn parsed_args(&self) -> Option<Value> {
        if self.args.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&self.args).ok()
    }
}

/// Groups log entries by `tool_call_id`, ordered by each call's first entry.
pub fn timeline(events: &[ToolCallEvent]) -> Vec<ToolCallGroup> {
    let mut groups: Vec<ToolCallGroup> = Vec::new();
    for event in events {
        let index = match groups
            .iter()
            .position(|group| group.tool_call_id == event.tool_call_id)
        {
            Some(index) => index,
            None => {
                groups.push(ToolCallGroup::new(event));
                groups.len() - 1
            }
        };
        groups[index].absorb(event);
    }
    groups
}
