//! Wire shapes of the records a run hands back.

use agentflow::state::{SharedState, StateKey};
use agentflow::workflow::{LoopReport, Termination};
use agentflow::*;
use serde_json::json;

#[test]
fn test_message_roundtrip() {
    let msg = Message::Assistant {
        content: vec![
            Content::Text {
                text: "Checking the rate".into(),
            },
            Content::ToolCall {
                id: "tc-1".into(),
                name: "get_exchange_rate".into(),
                arguments: json!({"base_currency": "USD", "target_currency": "INR"}),
            },
        ],
        stop_reason: StopReason::ToolUse,
        model: "gemini-2.5-flash-lite".into(),
        provider: "google".into(),
        usage: Usage::default(),
        timestamp: 789,
        error_message: None,
    };
    let json = serde_json::to_string(&msg).unwrap();
    let back: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(back.text(), msg.text());
    assert_eq!(back.role(), "assistant");
}

#[test]
fn test_termination_is_tagged() {
    let approved = LoopReport {
        name: "StoryRefinementLoop".into(),
        iterations: 1,
        termination: Termination::ExitSignal {
            agent: "RefinerAgent".into(),
            iteration: 1,
        },
    };
    assert_eq!(
        serde_json::to_value(&approved).unwrap(),
        json!({
            "name": "StoryRefinementLoop",
            "iterations": 1,
            "termination": {"reason": "exit_signal", "agent": "RefinerAgent", "iteration": 1}
        })
    );

    let capped = Termination::MaxIterationsReached { iterations: 2 };
    assert_eq!(
        serde_json::to_value(&capped).unwrap(),
        json!({"reason": "max_iterations_reached", "iterations": 2})
    );
}

#[test]
fn test_state_serializes_with_authors() {
    let mut state = SharedState::new();
    state.insert(StateKey::from("blog_outline"), "1. Intro", "OutlineAgent");
    let value = serde_json::to_value(&state).unwrap();
    assert_eq!(value["entries"]["blog_outline"]["value"], "1. Intro");
    assert_eq!(value["entries"]["blog_outline"]["author"], "OutlineAgent");

    let back: SharedState = serde_json::from_value(value).unwrap();
    assert_eq!(back.get("blog_outline"), Some("1. Intro"));
    assert_eq!(back.revision(), 1);
}

#[test]
fn test_model_ref_roundtrip() {
    let model = ModelRef::default();
    let json = serde_json::to_value(&model).unwrap();
    assert_eq!(json["model_id"], "gemini-2.5-flash-lite");
    let back: ModelRef = serde_json::from_value(json).unwrap();
    assert_eq!(back, model);
}

#[test]
fn test_builtin_tool_names() {
    assert_eq!(
        serde_json::to_value(BuiltinTool::GoogleSearch).unwrap(),
        json!("google_search")
    );
    assert_eq!(BuiltinTool::CodeExecution.to_string(), "code_execution");
}
