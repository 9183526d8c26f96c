use super::SessionState;
use crate::patch::{self, PatchOperation};
use crate::types::{Activity, AuiEvent, ComponentSpec, Interrupt, RunState};
use tracing::{debug, warn};

/// Folds one event into `state`. Total: every event has defined behaviour and
/// failures are logged without touching already applied state.
pub fn reduce(mut state: SessionState, event: &AuiEvent) -> SessionState {
    state.apply_event(event);
    state
}

impl SessionState {
    pub fn apply_event(&mut self, event: &AuiEvent) {
        if self.error.is_some() && !matches!(event, AuiEvent::StreamStart) {
            debug!(event_type = event.type_name(), "stream errored; dropping event");
            return;
        }

        match event {
            AuiEvent::StreamStart => {
                self.reset();
                self.is_streaming = true;
            }
            AuiEvent::RenderSnapshot {
                ui,
                intention,
                target_level,
            } => {
                self.component_spec = Some(ComponentSpec {
                    component: ui.component.clone(),
                    props: ui.props.clone(),
                    intention: intention.clone(),
                    target_level: target_level.clone(),
                });
            }
            AuiEvent::StateSnapshot { state } => self.component_spec = Some(state.clone()),
            AuiEvent::TextDelta {
                delta,
                message_id,
                field_path,
            } => self.apply_text_delta(delta, message_id.as_deref(), field_path.as_deref()),
            AuiEvent::StateDelta { delta } => self.patch_component(delta),
            AuiEvent::TextMessageStart {
                message_id,
                role,
                metadata,
            } => self.start_message(message_id, role, metadata.as_ref()),
            AuiEvent::TextMessageEnd {
                message_id,
                final_content,
            } => self.end_message(message_id, final_content.as_deref()),
            AuiEvent::MessagesSnapshot { messages } => self.replace_messages(messages),
            AuiEvent::ActivitySnapshot {
                activity_id,
                name,
                status,
                progress,
                current_step,
                metadata,
            } => self.snapshot_activity(Activity {
                id: activity_id.clone(),
                name: name.clone(),
                status: *status,
                progress: *progress,
                current_step: current_step.clone(),
                metadata: metadata.clone(),
            }),
            AuiEvent::ActivityDelta { activity_id, delta } => {
                self.patch_activity(activity_id, delta)
            }
            AuiEvent::ToolCallStart(_)
            | AuiEvent::ToolCallArgs(_)
            | AuiEvent::ToolCallEnd(_)
            | AuiEvent::ToolCallResult(_) => {
                if let Some((phase, fields)) = event.tool_call() {
                    self.record_tool_call(phase, fields);
                }
            }
            AuiEvent::RunStarted { task_description } => self.set_run_state(RunState::Started {
                task_description: task_description.clone(),
            }),
            AuiEvent::RunFinished { duration_ms } => self.set_run_state(RunState::Finished {
                duration_ms: *duration_ms,
            }),
            AuiEvent::RunError { error_message } => self.set_run_state(RunState::Error {
                error_message: error_message.clone(),
            }),
            AuiEvent::Interrupt {
                interrupt_id,
                reason,
                required_action,
                payload,
            } => self.install_interrupt(Interrupt {
                id: interrupt_id.clone(),
                reason: reason.clone(),
                required_action: required_action.clone(),
                payload: payload.clone(),
            }),
            AuiEvent::StreamEnd => self.is_streaming = false,
            AuiEvent::Error { message } => {
                warn!(error = %message, "producer reported a stream error");
                self.error = Some(message.clone());
                self.is_streaming = false;
            }
        }
    }

    fn patch_component(&mut self, ops: &[PatchOperation]) {
        let Some(spec) = self.component_spec.as_ref() else {
            warn!("state_delta before any component snapshot; dropping");
            return;
        };
        match patch::apply_typed(spec, ops) {
            Ok(next) => self.component_spec = Some(next),
            Err(err) => warn!(error = %err, "state_delta rejected; keeping component state"),
        }
    }
}
