//! Tests for the leaf agent loop using MockProvider.

use agentflow::agent_loop::{agent_loop, AgentLoopConfig};
use agentflow::provider::mock::*;
use agentflow::provider::MockProvider;
use agentflow::retry::RetryPolicy;
use agentflow::state::StateHandle;
use agentflow::*;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn make_config(provider: &MockProvider) -> AgentLoopConfig<'_> {
    AgentLoopConfig {
        provider,
        model: "mock".into(),
        api_key: "test".into(),
        max_tokens: None,
        temperature: None,
        builtin_tools: Vec::new(),
        tool_execution: ToolExecutionStrategy::default(),
        retry_policy: RetryPolicy::default(),
        max_turns: Some(10),
        state: StateHandle::default(),
    }
}

fn context(tools: Vec<Box<dyn AgentTool>>) -> AgentContext {
    AgentContext {
        system_prompt: "You are helpful.".into(),
        messages: Vec::new(),
        tools,
    }
}

fn collect_events(mut rx: mpsc::UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e);
    }
    events
}

struct EchoTool;

#[async_trait::async_trait]
impl AgentTool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn label(&self) -> &str {
        "Echo"
    }
    fn description(&self) -> &str {
        "Echo the input"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"text": {"type": "string"}}
        })
    }
    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let text = params["text"].as_str().unwrap_or("").to_string();
        Ok(ToolResult::text(text))
    }
}

struct FailingTool;

#[async_trait::async_trait]
impl AgentTool for FailingTool {
    fn name(&self) -> &str {
        "failing_tool"
    }
    fn label(&self) -> &str {
        "Failing Tool"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({})
    }
    async fn execute(
        &self,
        _params: serde_json::Value,
        _ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        Err(ToolError::Failed("Something went wrong".into()))
    }
}

#[tokio::test]
async fn test_simple_text_response() {
    let provider = MockProvider::text("Hello, world!");
    let config = make_config(&provider);
    let mut context = context(Vec::new());

    let (tx, rx) = mpsc::unbounded_channel();
    let outcome = agent_loop(
        vec![Message::user("Hi")],
        &mut context,
        &config,
        tx,
        CancellationToken::new(),
    )
    .await;

    let events = collect_events(rx);
    assert!(matches!(events.first(), Some(AgentEvent::AgentStart)));
    assert!(matches!(events.last(), Some(AgentEvent::AgentEnd { .. })));
    assert!(events.iter().any(|e| matches!(e, AgentEvent::TurnStart)));

    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.messages[0].role(), "user");
    assert_eq!(outcome.messages[1].role(), "assistant");
    assert_eq!(outcome.final_text().as_deref(), Some("Hello, world!"));
    assert!(outcome.error().is_none());
    assert_eq!(context.messages.len(), 2);
}

#[tokio::test]
async fn test_tool_call_and_response() {
    let provider = MockProvider::new(vec![
        MockResponse::tool_call("echo", serde_json::json!({"text": "hello"})),
        MockResponse::text("The tool said: hello"),
    ]);
    let config = make_config(&provider);
    let mut context = context(vec![Box::new(EchoTool)]);

    let (tx, rx) = mpsc::unbounded_channel();
    let outcome = agent_loop(
        vec![Message::user("Echo hello")],
        &mut context,
        &config,
        tx,
        CancellationToken::new(),
    )
    .await;

    let events = collect_events(rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::ToolExecutionStart { tool_name, .. } if tool_name == "echo")));
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::ToolExecutionEnd { is_error: false, .. })));

    let roles: Vec<&str> = outcome.messages.iter().map(Message::role).collect();
    assert_eq!(roles, vec!["user", "assistant", "toolResult", "assistant"]);

    // The second model call sees the tool result
    let calls = provider.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].messages.len(), 3);
    assert_eq!(calls[0].tools[0].name, "echo");
}

#[tokio::test]
async fn test_tool_error_is_reported_to_model() {
    let provider = MockProvider::new(vec![
        MockResponse::tool_call("failing_tool", serde_json::json!({})),
        MockResponse::text("Tool failed, sorry."),
    ]);
    let config = make_config(&provider);
    let mut context = context(vec![Box::new(FailingTool)]);

    let (tx, rx) = mpsc::unbounded_channel();
    let outcome = agent_loop(
        vec![Message::user("Use the tool")],
        &mut context,
        &config,
        tx,
        CancellationToken::new(),
    )
    .await;

    let events = collect_events(rx);
    let tool_errors = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::ToolExecutionEnd { is_error: true, .. }))
        .count();
    assert_eq!(tool_errors, 1);

    match &outcome.messages[2] {
        Message::ToolResult {
            is_error, content, ..
        } => {
            assert!(is_error);
            assert_eq!(content[0], Content::text("Something went wrong"));
        }
        other => panic!("expected tool result, got {:?}", other),
    }
    assert!(outcome.error().is_none());
    assert_eq!(outcome.final_text().as_deref(), Some("Tool failed, sorry."));
}

#[tokio::test]
async fn test_unknown_tool_reports_error() {
    let provider = MockProvider::new(vec![
        MockResponse::tool_call("nonexistent", serde_json::json!({})),
        MockResponse::text("I couldn't find that tool."),
    ]);
    let config = make_config(&provider);
    let mut context = context(Vec::new());

    let (tx, rx) = mpsc::unbounded_channel();
    let _ = agent_loop(
        vec![Message::user("Use nonexistent tool")],
        &mut context,
        &config,
        tx,
        CancellationToken::new(),
    )
    .await;

    let events = collect_events(rx);
    let tool_errors = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::ToolExecutionEnd { is_error: true, .. }))
        .count();
    assert_eq!(tool_errors, 1);
}

#[tokio::test]
async fn test_abort_cancels_loop() {
    let provider = MockProvider::text("Should not appear");
    let config = make_config(&provider);
    let mut context = context(Vec::new());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcome = agent_loop(vec![Message::user("Hi")], &mut context, &config, tx, cancel).await;

    assert_eq!(outcome.messages.len(), 1);
    assert!(provider.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retries_transient_status_then_succeeds() {
    let provider = MockProvider::new(vec![
        MockResponse::status(503),
        MockResponse::status(429),
        MockResponse::text("Recovered"),
    ]);
    let config = make_config(&provider);
    let mut context = context(Vec::new());

    let started = tokio::time::Instant::now();
    let (tx, _rx) = mpsc::unbounded_channel();
    let outcome = agent_loop(
        vec![Message::user("Hi")],
        &mut context,
        &config,
        tx,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.final_text().as_deref(), Some("Recovered"));
    assert_eq!(provider.calls().len(), 3);
    // Backoff of roughly 1s then 7s, each with up to 20% jitter
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(6400), "waited {:?}", waited);
    assert!(waited <= Duration::from_millis(9600), "waited {:?}", waited);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let provider = MockProvider::new(vec![
        MockResponse::status(500),
        MockResponse::status(500),
        MockResponse::status(500),
    ]);
    let mut config = make_config(&provider);
    config.retry_policy = RetryPolicy::default().with_max_attempts(3);
    let mut context = context(Vec::new());

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcome = agent_loop(
        vec![Message::user("Hi")],
        &mut context,
        &config,
        tx,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(provider.calls().len(), 3);
    assert!(outcome.error().unwrap().contains("500"));
}

#[tokio::test]
async fn test_non_retryable_status_fails_immediately() {
    let provider = MockProvider::new(vec![MockResponse::status(400), MockResponse::text("never")]);
    let config = make_config(&provider);
    let mut context = context(Vec::new());

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcome = agent_loop(
        vec![Message::user("Hi")],
        &mut context,
        &config,
        tx,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(provider.calls().len(), 1);
    assert!(outcome.error().is_some());
    assert!(outcome.final_text().is_none());
}

#[tokio::test]
async fn test_exit_signal_ends_loop_after_turn() {
    let provider = MockProvider::new(vec![
        MockResponse::tool_call("exit_loop", serde_json::json!({})),
        MockResponse::text("should not be requested"),
    ]);
    let config = make_config(&provider);
    let mut context = context(vec![Box::new(ExitLoopTool::new())]);

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcome = agent_loop(
        vec![Message::user("The critique is APPROVED")],
        &mut context,
        &config,
        tx,
        CancellationToken::new(),
    )
    .await;

    assert!(outcome.escalated);
    assert_eq!(provider.calls().len(), 1);
    assert_eq!(outcome.messages.last().unwrap().role(), "toolResult");
}

#[tokio::test]
async fn test_text_beside_tool_call_is_not_final() {
    let provider = MockProvider::new(vec![
        MockResponse::narrated_tool_call(
            "Let me echo that.",
            "echo",
            serde_json::json!({"text": "hi"}),
        ),
        MockResponse::text("Echoed."),
    ]);
    let config = make_config(&provider);
    let mut context = context(vec![Box::new(EchoTool)]);

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcome = agent_loop(
        vec![Message::user("echo hi")],
        &mut context,
        &config,
        tx,
        CancellationToken::new(),
    )
    .await;
    assert_eq!(outcome.final_text().as_deref(), Some("Echoed."));

    let provider = MockProvider::new(vec![MockResponse::narrated_tool_call(
        "APPROVED, exiting.",
        "exit_loop",
        serde_json::json!({}),
    )]);
    let config = make_config(&provider);
    let mut context = self::context(vec![Box::new(ExitLoopTool::new())]);

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcome = agent_loop(
        vec![Message::user("The critique is APPROVED")],
        &mut context,
        &config,
        tx,
        CancellationToken::new(),
    )
    .await;
    assert!(outcome.escalated);
    assert!(outcome.final_text().is_none());
}

#[tokio::test]
async fn test_max_turns_stops_runaway_tool_use() {
    let provider = MockProvider::new(vec![
        MockResponse::tool_call("echo", serde_json::json!({"text": "1"})),
        MockResponse::tool_call("echo", serde_json::json!({"text": "2"})),
        MockResponse::tool_call("echo", serde_json::json!({"text": "3"})),
    ]);
    let mut config = make_config(&provider);
    config.max_turns = Some(2);
    let mut context = context(vec![Box::new(EchoTool)]);

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcome = agent_loop(
        vec![Message::user("loop")],
        &mut context,
        &config,
        tx,
        CancellationToken::new(),
    )
    .await;

    assert!(outcome.turn_limit_reached);
    assert_eq!(provider.calls().len(), 2);
}

#[tokio::test]
async fn test_tool_sees_invocation_state() {
    struct StateReader;

    #[async_trait::async_trait]
    impl AgentTool for StateReader {
        fn name(&self) -> &str {
            "read_state"
        }
        fn label(&self) -> &str {
            "Read State"
        }
        fn description(&self) -> &str {
            "Reads the topic from state"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _params: serde_json::Value,
            ctx: ToolContext,
        ) -> Result<ToolResult, ToolError> {
            ctx.state
                .get("topic")
                .map(ToolResult::text)
                .ok_or_else(|| ToolError::Failed("no topic".into()))
        }
    }

    let provider = MockProvider::new(vec![
        MockResponse::tool_call("read_state", serde_json::json!({})),
        MockResponse::text("done"),
    ]);
    let config = make_config(&provider);
    config
        .state
        .write(StateKey::from("topic"), "lighthouses", "test");
    let mut context = context(vec![Box::new(StateReader)]);

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcome = agent_loop(
        vec![Message::user("go")],
        &mut context,
        &config,
        tx,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.messages[2].text().as_deref(), Some("lighthouses"));
}
