//! Agent-as-tool: lets one agent call another like a function.
//!
//! The wrapped agent starts a fresh conversation with the `request` string
//! as its only user message, but reads and writes the caller's live state,
//! so its output key is visible to the caller once the call returns.
//! Progress of the wrapped agent streams to the caller via `on_update`.

use crate::agent::LlmAgent;
use crate::provider::StreamProvider;
use crate::runner::RunError;
use crate::types::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// A tool that delegates work to another agent.
pub struct SubAgentTool {
    agent: Arc<LlmAgent>,
    tool_description: String,
    provider: Arc<dyn StreamProvider>,
    api_key: String,
}

impl SubAgentTool {
    pub fn new(
        agent: Arc<LlmAgent>,
        provider: Arc<dyn StreamProvider>,
        api_key: impl Into<String>,
    ) -> Self {
        let tool_description = if agent.description.is_empty() {
            format!("Delegate a task to the '{}' agent", agent.name)
        } else {
            agent.description.clone()
        };
        Self {
            agent,
            tool_description,
            provider,
            api_key: api_key.into(),
        }
    }
}

#[async_trait::async_trait]
impl AgentTool for SubAgentTool {
    fn name(&self) -> &str {
        &self.agent.name
    }

    fn label(&self) -> &str {
        &self.agent.name
    }

    fn description(&self) -> &str {
        &self.tool_description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "request": {
                    "type": "string",
                    "description": "What this agent should do"
                }
            },
            "required": ["request"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let request = params
            .get("request")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("Missing required 'request' parameter".into()))?
            .to_string();

        let (tx, mut rx) = mpsc::unbounded_channel();

        let forward_handle = if let Some(on_update) = ctx.on_update.clone() {
            let agent_name = self.agent.name.clone();
            Some(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    let update_text = match &event {
                        AgentEvent::MessageUpdate {
                            delta: StreamDelta::Text { delta },
                            ..
                        } => Some(delta.clone()),
                        AgentEvent::ToolExecutionStart { tool_name, .. } => {
                            Some(format!("[{} calling tool: {}]", agent_name, tool_name))
                        }
                        _ => None,
                    };

                    if let Some(text) = update_text {
                        on_update(ToolResult {
                            content: vec![Content::Text { text }],
                            details: serde_json::json!({ "agent": agent_name }),
                            escalate: false,
                        });
                    }
                }
            }))
        } else {
            drop(rx);
            None
        };

        let result = self
            .agent
            .run(
                &self.provider,
                &self.api_key,
                Message::user(request),
                &ctx.state,
                tx,
                ctx.cancel.clone(),
            )
            .await;

        if let Some(handle) = forward_handle {
            if let Err(e) = handle.await {
                warn!(
                    "Event forwarding for {} stopped abnormally: {}",
                    self.agent.name, e
                );
            }
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(RunError::Cancelled) => return Err(ToolError::Cancelled),
            Err(e) => return Err(ToolError::Failed(e.to_string())),
        };

        let text = outcome
            .final_text()
            .unwrap_or_else(|| format!("({} produced no text output)", self.agent.name));

        Ok(ToolResult {
            content: vec![Content::Text { text }],
            details: serde_json::json!({
                "agent": self.agent.name,
                "messages": outcome.messages.len(),
            }),
            escalate: false,
        })
    }
}
