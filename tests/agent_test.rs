//! Tests for LlmAgent: configuration and single runs against MockProvider.

use agentflow::provider::mock::*;
use agentflow::provider::{MockProvider, StreamProvider};
use agentflow::state::StateHandle;
use agentflow::tools::{exchange_rate_tool, fee_lookup_tool};
use agentflow::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn run_agent(
    agent: &LlmAgent,
    provider: Arc<dyn StreamProvider>,
    prompt: &str,
    state: &StateHandle,
) -> (Result<AgentLoopOutcome, RunError>, Vec<AgentEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = agent
        .run(
            &provider,
            "test",
            Message::user(prompt),
            state,
            tx,
            CancellationToken::new(),
        )
        .await;
    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e);
    }
    (result, events)
}

#[test]
fn test_agent_builder_pattern() {
    let agent = LlmAgent::new("GenSearch", ModelRef::default())
        .with_description("A simple agent that can answer general questions.")
        .with_instruction("You are a helpful assistant.")
        .with_tool(BuiltinTool::GoogleSearch)
        .with_output_key("answer")
        .with_max_turns(4)
        .with_max_tokens(1024)
        .with_temperature(0.2);

    assert_eq!(agent.name, "GenSearch");
    assert_eq!(agent.model.model_id, "gemini-2.5-flash-lite");
    assert_eq!(agent.instruction.source(), "You are a helpful assistant.");
    assert_eq!(agent.output_key, Some(StateKey::from("answer")));
    assert_eq!(agent.max_turns, 4);
    assert_eq!(agent.max_tokens, Some(1024));
    assert_eq!(agent.include_contents, IncludeContents::Default);
}

#[test]
fn test_default_turn_budget() {
    let agent = LlmAgent::new("A", ModelRef::default());
    assert_eq!(agent.max_turns, agentflow::agent::DEFAULT_MAX_TURNS);
    assert_eq!(agent.max_turns, 10);
}

#[tokio::test]
async fn test_agent_writes_output_key() {
    let provider = Arc::new(MockProvider::text("1. Intro\n2. Body"));
    let agent = LlmAgent::new("OutlineAgent", ModelRef::new("mock"))
        .with_instruction("Create a blog outline.")
        .with_output_key("blog_outline");
    let state = StateHandle::default();

    let (result, events) = run_agent(&agent, provider.clone(), "multi-agent systems", &state).await;
    let outcome = result.unwrap();

    assert_eq!(outcome.final_text().as_deref(), Some("1. Intro\n2. Body"));
    assert!(!events.is_empty());
    let entry = state.snapshot().entry("blog_outline").cloned().unwrap();
    assert_eq!(entry.value, "1. Intro\n2. Body");
    assert_eq!(entry.author, "OutlineAgent");

    let call = &provider.calls()[0];
    assert_eq!(call.system_prompt, "Create a blog outline.");
    assert_eq!(call.model, "mock");
    assert_eq!(call.api_key, "test");
}

#[tokio::test]
async fn test_instruction_rendered_from_state() {
    let provider = Arc::new(MockProvider::text("draft"));
    let agent = LlmAgent::new("WriterAgent", ModelRef::new("mock"))
        .with_instruction("Using this outline: {blog_outline}\nWrite a post.");
    let state = StateHandle::default();
    state.write(StateKey::from("blog_outline"), "1. Intro", "OutlineAgent");

    let (result, _) = run_agent(&agent, provider.clone(), "go", &state).await;
    result.unwrap();
    assert_eq!(
        provider.calls()[0].system_prompt,
        "Using this outline: 1. Intro\nWrite a post."
    );
}

#[tokio::test]
async fn test_missing_state_fails_before_calling_model() {
    let provider = Arc::new(MockProvider::text("unused"));
    let agent = LlmAgent::new("EditorAgent", ModelRef::new("mock"))
        .with_instruction("Polish: {blog_draft}");

    let (result, _) = run_agent(&agent, provider.clone(), "go", &StateHandle::default()).await;
    match result.unwrap_err() {
        RunError::MissingState { agent, key } => {
            assert_eq!(agent, "EditorAgent");
            assert_eq!(key.as_str(), "blog_draft");
        }
        other => panic!("expected missing state, got {other:?}"),
    }
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_currency_agent_uses_function_tools() {
    let provider = Arc::new(MockProvider::new(vec![
        MockResponse::ToolCalls(vec![
            MockToolCall {
                name: "get_fee_for_payment_method".into(),
                arguments: serde_json::json!({"method": "Bank Transfer"}),
            },
            MockToolCall {
                name: "get_exchange_rate".into(),
                arguments: serde_json::json!({"base_currency": "USD", "target_currency": "INR"}),
            },
        ]),
        MockResponse::text("1,250 USD is 103,430.25 INR after a 1% fee."),
    ]));
    let agent = LlmAgent::new("enhanced_currency_agent", ModelRef::new("mock"))
        .with_instruction("You are a smart currency conversion assistant.")
        .with_function_tool(fee_lookup_tool())
        .with_function_tool(exchange_rate_tool());

    let (result, events) = run_agent(
        &agent,
        provider.clone(),
        "Convert 1,250 USD to INR using a Bank Transfer.",
        &StateHandle::default(),
    )
    .await;
    let outcome = result.unwrap();

    let tool_results: Vec<String> = outcome
        .messages
        .iter()
        .filter(|m| m.role() == "toolResult")
        .filter_map(Message::text)
        .collect();
    assert_eq!(tool_results.len(), 2);
    let fee: serde_json::Value = serde_json::from_str(&tool_results[0]).unwrap();
    assert_eq!(fee, serde_json::json!({"status": "success", "fee_percentage": 0.01}));
    let rate: serde_json::Value = serde_json::from_str(&tool_results[1]).unwrap();
    assert_eq!(rate, serde_json::json!({"status": "success", "rate": 83.58}));

    let ends = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::ToolExecutionEnd { is_error: false, .. }))
        .count();
    assert_eq!(ends, 2);

    let declared: Vec<String> = provider.calls()[0]
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(
        declared,
        vec!["get_fee_for_payment_method", "get_exchange_rate"]
    );
}

#[tokio::test]
async fn test_builtin_tools_are_requested_not_executed() {
    let provider = Arc::new(MockProvider::text("print(1 + 1)"));
    let agent = LlmAgent::new("CalculationAgent", ModelRef::new("mock"))
        .with_tool(BuiltinTool::CodeExecution);

    let (result, _) = run_agent(&agent, provider.clone(), "1 + 1", &StateHandle::default()).await;
    result.unwrap();

    let call = &provider.calls()[0];
    assert!(call.tools.is_empty());
    assert_eq!(call.builtin_tools, vec![BuiltinTool::CodeExecution]);
}

#[tokio::test]
async fn test_model_failure_fails_the_agent() {
    let provider = Arc::new(MockProvider::new(vec![MockResponse::status(400)]));
    let agent = LlmAgent::new("OutlineAgent", ModelRef::new("mock")).with_output_key("blog_outline");
    let state = StateHandle::default();

    let (result, _) = run_agent(&agent, provider, "go", &state).await;
    assert!(matches!(result, Err(RunError::Agent { ref agent, .. }) if agent == "OutlineAgent"));
    assert!(state.get("blog_outline").is_none());
}

#[tokio::test]
async fn test_cancelled_run() {
    let provider: Arc<dyn StreamProvider> = Arc::new(MockProvider::text("unused"));
    let agent = LlmAgent::new("A", ModelRef::new("mock"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (tx, _rx) = mpsc::unbounded_channel();
    let result = agent
        .run(
            &provider,
            "test",
            Message::user("hi"),
            &StateHandle::default(),
            tx,
            cancel,
        )
        .await;
    assert!(matches!(result, Err(RunError::Cancelled)));
}
