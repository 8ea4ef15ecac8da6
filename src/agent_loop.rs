//! The leaf agent loop: prompt → LLM stream → tool execution → repeat.
//!
//! One call drives a single agent until the model answers without tool
//! calls, a tool raises the exit signal, the turn budget runs out, or the
//! provider fails for good. Events stream out through `tx`.

use crate::provider::{StreamConfig, StreamEvent, StreamProvider, ToolDefinition};
use crate::retry::RetryPolicy;
use crate::state::StateHandle;
use crate::types::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for the agent loop
pub struct AgentLoopConfig<'a> {
    pub provider: &'a dyn StreamProvider,
    pub model: String,
    pub api_key: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Server-side tools forwarded to the provider.
    pub builtin_tools: Vec<BuiltinTool>,
    /// Tool execution strategy (sequential or parallel).
    pub tool_execution: ToolExecutionStrategy,
    /// Retry policy for transient provider errors.
    pub retry_policy: RetryPolicy,
    /// Maximum model calls; `None` means unbounded.
    pub max_turns: Option<usize>,
    /// State handed to tools through their `ToolContext`.
    pub state: StateHandle,
}

/// What one run of the loop produced.
#[derive(Debug, Clone, Default)]
pub struct AgentLoopOutcome {
    /// Prompts plus everything the loop appended.
    pub messages: Vec<Message>,
    /// A tool raised the exit signal.
    pub escalated: bool,
    /// Stopped because `max_turns` was used up.
    pub turn_limit_reached: bool,
}

impl AgentLoopOutcome {
    /// Text of the final response: the last assistant message, provided it
    /// calls no tools. Narration sent alongside a tool call does not count,
    /// so a run that ends on an exit signal or the turn limit has none.
    pub fn final_text(&self) -> Option<String> {
        match self
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m, Message::Assistant { .. }))?
        {
            Message::Assistant { content, .. }
                if content
                    .iter()
                    .any(|c| matches!(c, Content::ToolCall { .. })) =>
            {
                None
            }
            message => message.text(),
        }
    }

    /// The provider error that ended the run, if any.
    pub fn error(&self) -> Option<String> {
        match self.messages.last() {
            Some(Message::Assistant {
                stop_reason: StopReason::Error,
                error_message,
                ..
            }) => Some(
                error_message
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ),
            _ => None,
        }
    }
}

/// Start an agent loop with new prompt messages.
pub async fn agent_loop(
    prompts: Vec<Message>,
    context: &mut AgentContext,
    config: &AgentLoopConfig<'_>,
    tx: mpsc::UnboundedSender<AgentEvent>,
    cancel: CancellationToken,
) -> AgentLoopOutcome {
    let mut outcome = AgentLoopOutcome {
        messages: prompts.clone(),
        ..Default::default()
    };

    tx.send(AgentEvent::AgentStart).ok();

    for prompt in prompts {
        tx.send(AgentEvent::MessageStart {
            message: prompt.clone(),
        })
        .ok();
        tx.send(AgentEvent::MessageEnd {
            message: prompt.clone(),
        })
        .ok();
        context.messages.push(prompt);
    }

    run_loop(context, &mut outcome, config, &tx, &cancel).await;

    tx.send(AgentEvent::AgentEnd {
        messages: outcome.messages.clone(),
    })
    .ok();
    outcome
}

async fn run_loop(
    context: &mut AgentContext,
    outcome: &mut AgentLoopOutcome,
    config: &AgentLoopConfig<'_>,
    tx: &mpsc::UnboundedSender<AgentEvent>,
    cancel: &CancellationToken,
) {
    let mut turn_number: usize = 0;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        if let Some(max) = config.max_turns {
            if turn_number >= max {
                warn!("Execution limit reached: max turns ({}) reached", max);
                outcome.turn_limit_reached = true;
                return;
            }
        }
        turn_number += 1;

        tx.send(AgentEvent::TurnStart).ok();

        let message = stream_assistant_response(context, config, tx, cancel).await;
        context.messages.push(message.clone());
        outcome.messages.push(message.clone());

        let failed = matches!(
            message,
            Message::Assistant {
                stop_reason: StopReason::Error | StopReason::Aborted,
                ..
            }
        );
        if failed {
            tx.send(AgentEvent::TurnEnd {
                message,
                tool_results: vec![],
            })
            .ok();
            return;
        }

        let tool_calls: Vec<_> = match &message {
            Message::Assistant { content, .. } => content
                .iter()
                .filter_map(|c| match c {
                    Content::ToolCall {
                        id,
                        name,
                        arguments,
                    } => Some((id.clone(), name.clone(), arguments.clone())),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        };

        if tool_calls.is_empty() {
            tx.send(AgentEvent::TurnEnd {
                message,
                tool_results: vec![],
            })
            .ok();
            return;
        }

        let execution =
            execute_tool_calls(&context.tools, &tool_calls, config, tx, cancel).await;
        for result in &execution.tool_results {
            context.messages.push(result.clone());
            outcome.messages.push(result.clone());
        }

        tx.send(AgentEvent::TurnEnd {
            message,
            tool_results: execution.tool_results,
        })
        .ok();

        if execution.escalated {
            debug!("Exit signal raised; ending agent loop");
            outcome.escalated = true;
            return;
        }
    }
}

/// Stream an assistant response from the LLM, retrying transient failures.
async fn stream_assistant_response(
    context: &AgentContext,
    config: &AgentLoopConfig<'_>,
    tx: &mpsc::UnboundedSender<AgentEvent>,
    cancel: &CancellationToken,
) -> Message {
    let tool_defs: Vec<ToolDefinition> = context
        .tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        })
        .collect();

    let retry = &config.retry_policy;
    let mut attempt: u32 = 1;
    let (result, mut stream_rx) = loop {
        let stream_config = StreamConfig {
            model: config.model.clone(),
            system_prompt: context.system_prompt.clone(),
            messages: context.messages.clone(),
            tools: tool_defs.clone(),
            builtin_tools: config.builtin_tools.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        let (stream_tx, stream_rx) = mpsc::unbounded_channel();

        let result = config
            .provider
            .stream(stream_config, stream_tx, cancel.clone())
            .await;

        match &result {
            Err(e)
                if retry.should_retry(e)
                    && attempt < retry.max_attempts
                    && !cancel.is_cancelled() =>
            {
                let delay = retry.delay_for_retry(attempt);
                crate::retry::log_retry(attempt, retry.max_attempts, &delay, e);
                attempt += 1;
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }
            _ => break (result, stream_rx),
        }
    };

    // Forward whatever the provider streamed
    let mut partial_message: Option<Message> = None;
    while let Ok(event) = stream_rx.try_recv() {
        match &event {
            StreamEvent::Start => {
                // Placeholder so deltas have a message to attach to.
                let placeholder = Message::Assistant {
                    content: Vec::new(),
                    stop_reason: StopReason::Stop,
                    model: config.model.clone(),
                    provider: String::new(),
                    usage: Usage::default(),
                    timestamp: now_ms(),
                    error_message: None,
                };
                partial_message = Some(placeholder.clone());
                tx.send(AgentEvent::MessageStart {
                    message: placeholder,
                })
                .ok();
            }
            StreamEvent::TextDelta { delta, .. } => {
                if let Some(ref msg) = partial_message {
                    tx.send(AgentEvent::MessageUpdate {
                        message: msg.clone(),
                        delta: StreamDelta::Text {
                            delta: delta.clone(),
                        },
                    })
                    .ok();
                }
            }
            StreamEvent::ToolCallStart { name, .. } => {
                if let Some(ref msg) = partial_message {
                    tx.send(AgentEvent::MessageUpdate {
                        message: msg.clone(),
                        delta: StreamDelta::ToolCallDelta {
                            delta: name.clone(),
                        },
                    })
                    .ok();
                }
            }
            StreamEvent::Done { message } => {
                partial_message = Some(message.clone());
                tx.send(AgentEvent::MessageEnd {
                    message: message.clone(),
                })
                .ok();
            }
            StreamEvent::Error { message } => {
                if partial_message.is_none() {
                    tx.send(AgentEvent::MessageStart {
                        message: message.clone(),
                    })
                    .ok();
                }
                partial_message = Some(message.clone());
                tx.send(AgentEvent::MessageEnd {
                    message: message.clone(),
                })
                .ok();
            }
            StreamEvent::ToolCallEnd { .. } => {}
        }
    }

    match result {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Provider error after {} attempt(s): {}", attempt, e);
            let stop_reason = if matches!(e, crate::provider::ProviderError::Cancelled) {
                StopReason::Aborted
            } else {
                StopReason::Error
            };
            Message::Assistant {
                content: vec![Content::Text {
                    text: String::new(),
                }],
                stop_reason,
                model: config.model.clone(),
                provider: "unknown".into(),
                usage: Usage::default(),
                timestamp: now_ms(),
                error_message: Some(e.to_string()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tool execution
// ---------------------------------------------------------------------------

struct ToolExecutionResult {
    tool_results: Vec<Message>,
    escalated: bool,
}

async fn execute_tool_calls(
    tools: &[Box<dyn AgentTool>],
    tool_calls: &[(String, String, serde_json::Value)],
    config: &AgentLoopConfig<'_>,
    tx: &mpsc::UnboundedSender<AgentEvent>,
    cancel: &CancellationToken,
) -> ToolExecutionResult {
    let executed: Vec<(Message, bool)> = match config.tool_execution {
        ToolExecutionStrategy::Sequential => {
            let mut results = Vec::with_capacity(tool_calls.len());
            for (id, name, args) in tool_calls {
                results.push(
                    execute_single_tool(tools, id, name, args, &config.state, tx, cancel).await,
                );
            }
            results
        }
        ToolExecutionStrategy::Parallel => {
            let futures: Vec<_> = tool_calls
                .iter()
                .map(|(id, name, args)| {
                    execute_single_tool(tools, id, name, args, &config.state, tx, cancel)
                })
                .collect();
            futures::future::join_all(futures).await
        }
    };

    let escalated = executed.iter().any(|(_, escalate)| *escalate);
    ToolExecutionResult {
        tool_results: executed.into_iter().map(|(msg, _)| msg).collect(),
        escalated,
    }
}

/// Execute a single tool call and emit events. Returns the tool result
/// message and whether the tool raised the exit signal.
async fn execute_single_tool(
    tools: &[Box<dyn AgentTool>],
    id: &str,
    name: &str,
    args: &serde_json::Value,
    state: &StateHandle,
    tx: &mpsc::UnboundedSender<AgentEvent>,
    cancel: &CancellationToken,
) -> (Message, bool) {
    let tool = tools.iter().find(|t| t.name() == name);

    tx.send(AgentEvent::ToolExecutionStart {
        tool_call_id: id.to_string(),
        tool_name: name.to_string(),
        args: args.clone(),
    })
    .ok();

    let on_update: Option<ToolUpdateFn> = {
        let tx = tx.clone();
        let id = id.to_string();
        let name = name.to_string();
        Some(Arc::new(move |partial: ToolResult| {
            tx.send(AgentEvent::ToolExecutionUpdate {
                tool_call_id: id.clone(),
                tool_name: name.clone(),
                partial_result: partial,
            })
            .ok();
        }))
    };

    let (result, is_error) = match tool {
        Some(tool) => {
            let ctx = ToolContext {
                tool_call_id: id.to_string(),
                tool_name: name.to_string(),
                cancel: cancel.child_token(),
                on_update,
                state: state.clone(),
            };
            match tool.execute(args.clone(), ctx).await {
                Ok(r) => (r, false),
                Err(e) => {
                    debug!("Tool {} failed: {}", name, e);
                    (ToolResult::text(e.to_string()), true)
                }
            }
        }
        None => (
            ToolResult::text(ToolError::NotFound(name.to_string()).to_string()),
            true,
        ),
    };

    let escalate = result.escalate && !is_error;

    tx.send(AgentEvent::ToolExecutionEnd {
        tool_call_id: id.to_string(),
        tool_name: name.to_string(),
        result: result.clone(),
        is_error,
    })
    .ok();

    let tool_result_msg = Message::ToolResult {
        tool_call_id: id.to_string(),
        tool_name: name.to_string(),
        content: result.content,
        is_error,
        timestamp: now_ms(),
    };

    tx.send(AgentEvent::MessageStart {
        message: tool_result_msg.clone(),
    })
    .ok();
    tx.send(AgentEvent::MessageEnd {
        message: tool_result_msg.clone(),
    })
    .ok();

    (tool_result_msg, escalate)
}
