use super::*;
use crate::decode::decode_value;
use crate::types::{ActivityStatus, AuiEvent, RunState, ToolCallPhase};
use serde_json::{json, Value};
use std::path::Path;

fn event(value: Value) -> AuiEvent {
    decode_value(value)
        .expect("frame should decode")
        .expect("frame should be a known event")
}

fn replay(frames: Vec<Value>) -> SessionState {
    frames
        .into_iter()
        .map(event)
        .fold(SessionState::new(), |state, event| reduce(state, &event))
}

fn vocab_card() -> Value {
    json!({
        "type": "render_snapshot",
        "ui": {"component": "VocabCard", "props": {"word": "ephemeral", "definition": ""}},
        "intention": "teach",
        "target_level": "B2"
    })
}

fn confirm_interrupt(id: &str) -> Value {
    json!({
        "type": "interrupt",
        "interrupt_id": id,
        "reason": "save_story",
        "required_action": "confirm",
        "payload": {"options": [
            {"action": "confirm", "label": "Yes"},
            {"action": "cancel", "label": "No"}
        ]}
    })
}

#[test]
fn test_session_module_structure() {
    let _ = std::any::TypeId::of::<SessionState>();
    let _ = std::any::TypeId::of::<Resolution>();

    assert!(Path::new("src/state/session/state.rs").exists());
    assert!(Path::new("src/state/session/messages.rs").exists());
    assert!(Path::new("src/state/session/activities.rs").exists());
    assert!(Path::new("src/state/session/tool_calls.rs").exists());
    assert!(Path::new("src/state/session/run.rs").exists());
    assert!(Path::new("src/state/session/reducer.rs").exists());
}

#[test]
fn test_legacy_field_path_accumulates_into_props() {
    let state = replay(vec![
        vocab_card(),
        json!({"type": "text_delta", "field_path": "definition", "delta": "Lasting for a "}),
        json!({"type": "text_delta", "field_path": "definition", "delta": "short time."}),
        json!({"type": "stream_end"}),
    ]);

    let spec = state.component_spec.expect("component spec");
    assert_eq!(spec.component, "VocabCard");
    assert_eq!(spec.props["definition"], json!("Lasting for a short time."));
    assert_eq!(spec.props["word"], json!("ephemeral"));
}

#[test]
fn test_message_lifecycle_concatenates_deltas() {
    let state = replay(vec![
        json!({"type": "text_message_start", "message_id": "m1", "role": "assistant"}),
        json!({"type": "text_delta", "message_id": "m1", "delta": "Hel"}),
        json!({"type": "text_delta", "message_id": "m1", "delta": "lo"}),
        json!({"type": "text_message_end", "message_id": "m1"}),
    ]);

    assert_eq!(state.messages.len(), 1);
    let message = &state.messages[0];
    assert_eq!(message.id, "m1");
    assert_eq!(message.content, "Hello");
    assert!(!message.is_streaming);
}

#[test]
fn test_final_content_wins_over_accumulated_text() {
    let state = replay(vec![
        json!({"type": "text_message_start", "message_id": "m1", "role": "assistant"}),
        json!({"type": "text_delta", "message_id": "m1", "delta": "Hel"}),
        json!({"type": "text_delta", "message_id": "m1", "delta": "l0 wrld"}),
        json!({"type": "text_message_end", "message_id": "m1", "final_content": "Hello world"}),
    ]);
    assert_eq!(state.messages[0].content, "Hello world");
}

#[test]
fn test_concurrent_messages_keep_insertion_order() {
    let state = replay(vec![
        json!({"type": "text_message_start", "message_id": "m1", "role": "assistant"}),
        json!({"type": "text_message_start", "message_id": "m2", "role": "tool", "metadata": {"source": "dictionary"}}),
        json!({"type": "text_delta", "message_id": "m2", "delta": "b"}),
        json!({"type": "text_delta", "message_id": "m1", "delta": "a"}),
        json!({"type": "text_message_end", "message_id": "m2"}),
    ]);

    let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
    assert_eq!(state.messages[0].content, "a");
    assert!(state.messages[0].is_streaming);
    assert_eq!(state.messages[1].content, "b");
    assert!(!state.messages[1].is_streaming);
    assert_eq!(state.messages[1].metadata["source"], json!("dictionary"));
}

#[test]
fn test_delta_without_id_or_path_appends_to_streaming_message() {
    let state = replay(vec![
        vocab_card(),
        json!({"type": "text_message_start", "message_id": "m1", "role": "assistant"}),
        json!({"type": "text_delta", "delta": "positional"}),
    ]);
    assert_eq!(state.messages[0].content, "positional");
    assert!(state.component_spec.expect("spec").props.get("text").is_none());
}

#[test]
fn test_delta_without_id_falls_back_to_default_field() {
    let state = replay(vec![
        vocab_card(),
        json!({"type": "text_delta", "delta": "A story begins"}),
    ]);
    let props = state.component_spec.expect("spec").props;
    assert_eq!(props[DEFAULT_FIELD_PATH], json!("A story begins"));
}

#[test]
fn test_unknown_message_id_routes_to_props_until_started() {
    let state = replay(vec![
        vocab_card(),
        json!({"type": "text_delta", "message_id": "m1", "field_path": "definition", "delta": "stray"}),
        json!({"type": "text_message_start", "message_id": "m1", "role": "assistant"}),
        json!({"type": "text_delta", "message_id": "m1", "field_path": "definition", "delta": "Hel"}),
        json!({"type": "text_delta", "message_id": "m1", "delta": "lo"}),
        json!({"type": "text_message_end", "message_id": "m1"}),
    ]);
    let message = state.message("m1").expect("started");
    assert_eq!(message.content, "Hello");
    assert!(!message.is_streaming);
    let props = &state.component_spec.as_ref().expect("spec").props;
    assert_eq!(props["definition"], json!("stray"));
}

#[test]
fn test_snapshot_message_receives_deltas_by_id() {
    let mut state = replay(vec![
        vocab_card(),
        json!({"type": "text_delta", "message_id": "ghost", "field_path": "definition", "delta": "one"}),
        json!({
            "type": "messages_snapshot",
            "messages": [{"id": "ghost", "role": "assistant", "content": "resynced", "isStreaming": true}]
        }),
    ]);
    state.apply_event(&event(json!({
        "type": "text_delta", "message_id": "ghost", "field_path": "definition", "delta": "!"
    })));

    assert_eq!(state.messages[0].content, "resynced!");
    assert!(state.messages[0].is_streaming);
    let props = &state.component_spec.as_ref().expect("spec").props;
    assert_eq!(props["definition"], json!("one"));
}

#[test]
fn test_messages_snapshot_replaces_list() {
    let state = replay(vec![
        json!({"type": "text_message_start", "message_id": "m1", "role": "assistant"}),
        json!({"type": "text_delta", "message_id": "m1", "delta": "draft"}),
        json!({"type": "messages_snapshot", "messages": [
            {"id": "h1", "role": "user", "content": "hi"},
            {"id": "h2", "role": "assistant", "content": "hello", "is_streaming": false}
        ]}),
    ]);
    let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["h1", "h2"]);
    assert!(state.message("m1").is_none());
}

#[test]
fn test_end_for_unknown_message_is_dropped() {
    let before = replay(vec![json!({"type": "text_message_start", "message_id": "m1", "role": "assistant"})]);
    let after = reduce(
        before.clone(),
        &event(json!({"type": "text_message_end", "message_id": "nope", "final_content": "x"})),
    );
    assert_eq!(before, after);
}

#[test]
fn test_activity_progress_reflects_only_patched_fields() {
    let state = replay(vec![
        json!({
            "type": "activity_snapshot",
            "activity_id": "a1",
            "name": "Generating story",
            "status": "running",
            "progress": 0.0,
            "current_step": "outline",
            "metadata": {"chapters": 3}
        }),
        json!({"type": "activity_delta", "activity_id": "a1", "delta": [
            {"op": "replace", "path": "/progress", "value": 0.5}
        ]}),
        json!({"type": "activity_delta", "activity_id": "a1", "delta": [
            {"op": "replace", "path": "/progress", "value": 1.0},
            {"op": "replace", "path": "/status", "value": "completed"}
        ]}),
    ]);

    let activity = state.activity("a1").expect("activity");
    assert_eq!(activity.progress, 1.0);
    assert_eq!(activity.status, ActivityStatus::Completed);
    assert_eq!(activity.name, "Generating story");
    assert_eq!(activity.current_step.as_deref(), Some("outline"));
    assert_eq!(activity.metadata["chapters"], json!(3));
}

#[test]
fn test_invalid_activity_patches_keep_prior_activity() {
    let base = replay(vec![json!({
        "type": "activity_snapshot",
        "activity_id": "a1",
        "name": "Indexing",
        "status": "running",
        "progress": 0.2,
        "current_step": null,
        "metadata": {}
    })]);

    for delta in [
        json!([{"op": "replace", "path": "/status", "value": "exploded"}]),
        json!([{"op": "replace", "path": "/progress", "value": 1.5}]),
        json!([{"op": "replace", "path": "/id", "value": "a2"}]),
        json!([{"op": "replace", "path": "/missing", "value": 1}]),
        json!([
            {"op": "replace", "path": "/progress", "value": 0.9},
            {"op": "test", "path": "/name", "value": "Other"}
        ]),
    ] {
        let next = reduce(
            base.clone(),
            &event(json!({"type": "activity_delta", "activity_id": "a1", "delta": delta})),
        );
        assert_eq!(next.activities, base.activities);
    }
}

#[test]
fn test_activity_delta_for_unknown_id_is_dropped() {
    let state = replay(vec![json!({"type": "activity_delta", "activity_id": "a9", "delta": [
        {"op": "replace", "path": "/progress", "value": 0.5}
    ]})]);
    assert!(state.activities.is_empty());
}

#[test]
fn test_state_delta_patches_component_and_failure_keeps_it() {
    let patched = replay(vec![
        vocab_card(),
        json!({"type": "state_delta", "delta": [
            {"op": "replace", "path": "/props/definition", "value": "brief"},
            {"op": "add", "path": "/props/examples", "value": ["an ephemeral trend"]}
        ]}),
    ]);
    let spec = patched.component_spec.clone().expect("spec");
    assert_eq!(spec.props["definition"], json!("brief"));
    assert_eq!(spec.props["examples"][0], json!("an ephemeral trend"));

    let rejected = reduce(
        patched.clone(),
        &event(json!({"type": "state_delta", "delta": [
            {"op": "replace", "path": "/props/definition", "value": "lost"},
            {"op": "remove", "path": "/props/nonexistent"}
        ]})),
    );
    assert_eq!(rejected.component_spec, patched.component_spec);
}

#[test]
fn test_state_snapshot_replaces_component() {
    let state = replay(vec![
        vocab_card(),
        json!({"type": "state_snapshot", "state": {
            "component": "StoryReader",
            "props": {"title": "The Fox"},
            "intention": "read",
            "target_level": "A2"
        }}),
    ]);
    let spec = state.component_spec.expect("spec");
    assert_eq!(spec.component, "StoryReader");
    assert!(spec.props.get("word").is_none());
    assert_eq!(spec.target_level, "A2");
}

#[test]
fn test_tool_calls_append_and_group() {
    let state = replay(vec![
        json!({"type": "tool_call_start", "tool_call_id": "t1", "tool_name": "lookup_word"}),
        json!({"type": "tool_call_args", "tool_call_id": "t1", "delta": "{\"word\":\"ephemeral\"}"}),
        json!({"type": "tool_call_end", "tool_call_id": "t1", "status": "success", "duration_ms": 12}),
        json!({"type": "tool_call_result", "tool_call_id": "t1", "result": {"definition": "brief"}}),
    ]);

    let phases: Vec<ToolCallPhase> = state.tool_calls.iter().map(|entry| entry.phase).collect();
    assert_eq!(
        phases,
        vec![
            ToolCallPhase::Start,
            ToolCallPhase::Args,
            ToolCallPhase::End,
            ToolCallPhase::Result
        ]
    );
    let groups = state.tool_timeline();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].parsed_args(), Some(json!({"word": "ephemeral"})));
    assert_eq!(groups[0].duration_ms, Some(12));
}

#[test]
fn test_run_state_is_last_write_wins() {
    let state = replay(vec![
        json!({"type": "run_started", "task_description": "write a story"}),
        json!({"type": "run_error", "error_message": "quota"}),
        json!({"type": "run_finished", "duration_ms": 1200}),
    ]);
    assert_eq!(
        state.run_state,
        Some(RunState::Finished {
            duration_ms: Some(1200)
        })
    );
}

#[test]
fn test_resolving_twice_claims_once() {
    let mut state = replay(vec![confirm_interrupt("i1")]);
    assert!(state.awaiting_decision());

    let first = state.begin_resolution("confirm");
    assert_eq!(
        first,
        ResolutionStart::Ready(Resolution {
            interrupt_id: "i1".to_string(),
            action: "confirm".to_string(),
            label: "Yes".to_string(),
        })
    );
    assert_eq!(state.begin_resolution("confirm"), ResolutionStart::AlreadySubmitted);
    assert_eq!(state.begin_resolution("cancel"), ResolutionStart::AlreadySubmitted);
    assert!(!state.awaiting_decision());
}

#[test]
fn test_resolution_rejects_unlisted_action_without_claiming() {
    let mut state = replay(vec![confirm_interrupt("i1")]);
    assert_eq!(state.begin_resolution("maybe"), ResolutionStart::UnknownAction);
    assert!(state.awaiting_decision());
    assert!(matches!(state.begin_resolution("cancel"), ResolutionStart::Ready(_)));
}

#[test]
fn test_free_form_resolution_uses_action_as_label() {
    let mut state = replay(vec![json!({
        "type": "interrupt",
        "interrupt_id": "i2",
        "reason": "need_title",
        "required_action": "input",
        "payload": {"hint": "name your story"}
    })]);
    assert_eq!(state.begin_resolution("  "), ResolutionStart::UnknownAction);
    match state.begin_resolution("The Fox") {
        ResolutionStart::Ready(resolution) => assert_eq!(resolution.label, "The Fox"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_no_pending_interrupt() {
    let mut state = SessionState::new();
    assert_eq!(
        state.begin_resolution("confirm"),
        ResolutionStart::NoPendingInterrupt
    );
}

#[test]
fn test_failed_delivery_reopens_gate() {
    let mut state = replay(vec![confirm_interrupt("i1")]);
    assert!(matches!(state.begin_resolution("confirm"), ResolutionStart::Ready(_)));
    assert!(!state.resolution_failed("other"));
    assert!(state.resolution_failed("i1"));
    assert!(state.awaiting_decision());
    assert!(!state.resolution_failed("i1"));
    assert!(matches!(state.begin_resolution("confirm"), ResolutionStart::Ready(_)));
}

#[test]
fn test_interrupt_install_rules() {
    let mut state = replay(vec![confirm_interrupt("i1"), confirm_interrupt("i2")]);
    assert_eq!(state.interrupt.as_ref().expect("gate").interrupt.id, "i2");

    assert!(matches!(state.begin_resolution("confirm"), ResolutionStart::Ready(_)));
    state.apply_event(&event(confirm_interrupt("i2")));
    assert!(state.interrupt.as_ref().expect("gate").submitted);

    state.apply_event(&event(confirm_interrupt("i3")));
    let gate = state.interrupt.as_ref().expect("gate");
    assert_eq!(gate.interrupt.id, "i3");
    assert!(!gate.submitted);
}

#[test]
fn test_stream_start_resets_everything() {
    let mut state = replay(vec![
        vocab_card(),
        json!({"type": "text_message_start", "message_id": "m1", "role": "assistant"}),
        json!({"type": "activity_snapshot", "activity_id": "a1", "name": "x", "status": "pending", "progress": 0.0}),
        json!({"type": "tool_call_start", "tool_call_id": "t1"}),
        json!({"type": "run_started"}),
        confirm_interrupt("i1"),
        json!({"type": "error", "message": "boom"}),
    ]);
    state.apply_event(&event(json!({"type": "stream_start"})));

    let mut expected = SessionState::new();
    expected.is_streaming = true;
    assert_eq!(state, expected);
}

#[test]
fn test_stream_end_only_clears_streaming_flag() {
    let streaming = replay(vec![json!({"type": "stream_start"}), vocab_card()]);
    assert!(streaming.is_streaming);

    let ended = reduce(streaming.clone(), &event(json!({"type": "stream_end"})));
    assert!(!ended.is_streaming);
    assert_eq!(ended.component_spec, streaming.component_spec);
}

#[test]
fn test_error_slot_halts_further_updates() {
    let state = replay(vec![
        json!({"type": "stream_start"}),
        vocab_card(),
        json!({"type": "error", "message": "model overloaded"}),
        json!({"type": "text_delta", "field_path": "definition", "delta": "late"}),
        json!({"type": "error", "message": "second"}),
    ]);

    assert_eq!(state.error.as_deref(), Some("model overloaded"));
    assert!(!state.is_streaming);
    let spec = state.component_spec.expect("spec survives");
    assert_eq!(spec.props["definition"], json!(""));
}

#[test]
fn test_snapshot_serializes_public_fields() {
    let state = replay(vec![
        vocab_card(),
        json!({"type": "text_delta", "message_id": "ghost", "delta": "x"}),
    ]);
    let value = serde_json::to_value(&state).expect("serialize");
    assert_eq!(value["component_spec"]["props"]["text"], json!("x"));
    assert_eq!(value["component_spec"]["target_level"], json!("B2"));
    assert_eq!(value["is_streaming"], json!(false));
}
