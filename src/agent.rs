//! Leaf agents: a model, an instruction template, tools and an output key.
//!
//! An `LlmAgent` is pure configuration. Running it renders the instruction
//! against the invocation state, drives [`agent_loop`] with the agent's
//! tools, and publishes the final text under the output key.

use crate::agent_loop::{agent_loop, AgentLoopConfig, AgentLoopOutcome};
use crate::model::ModelRef;
use crate::provider::StreamProvider;
use crate::runner::RunError;
use crate::state::{StateHandle, StateKey, TranscriptEntry};
use crate::template::{Instruction, MissingKey};
use crate::tools::SubAgentTool;
use crate::types::*;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default max model calls per agent run (prevents runaway tool loops).
pub const DEFAULT_MAX_TURNS: usize = 10;

/// Whether an agent sees what earlier agents said.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncludeContents {
    /// The prompt followed by earlier agents' outputs.
    #[default]
    Default,
    /// The prompt only.
    None,
}

/// Something an agent can call.
#[derive(Clone)]
pub enum ToolRef {
    /// A local, deterministic tool.
    LocalFunction(Arc<dyn AgentTool>),
    /// Another agent, exposed as a function taking a `request` string.
    WrappedAgent(Arc<LlmAgent>),
    /// A tool executed by the model API itself.
    Builtin(BuiltinTool),
}

impl ToolRef {
    pub fn function(tool: impl AgentTool + 'static) -> Self {
        Self::LocalFunction(Arc::new(tool))
    }

    pub fn agent(agent: LlmAgent) -> Self {
        Self::WrappedAgent(Arc::new(agent))
    }

    /// Name the model sees.
    pub fn name(&self) -> String {
        match self {
            Self::LocalFunction(t) => t.name().to_string(),
            Self::WrappedAgent(a) => a.name.clone(),
            Self::Builtin(b) => b.to_string(),
        }
    }
}

impl fmt::Debug for ToolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalFunction(t) => f.debug_tuple("LocalFunction").field(&t.name()).finish(),
            Self::WrappedAgent(a) => f.debug_tuple("WrappedAgent").field(&a.name).finish(),
            Self::Builtin(b) => f.debug_tuple("Builtin").field(b).finish(),
        }
    }
}

impl From<BuiltinTool> for ToolRef {
    fn from(b: BuiltinTool) -> Self {
        Self::Builtin(b)
    }
}

impl From<LlmAgent> for ToolRef {
    fn from(a: LlmAgent) -> Self {
        Self::agent(a)
    }
}

/// A single model-backed agent.
#[derive(Debug, Clone)]
pub struct LlmAgent {
    pub name: String,
    pub description: String,
    pub model: ModelRef,
    pub instruction: Instruction,
    pub tools: Vec<ToolRef>,
    pub output_key: Option<StateKey>,
    pub include_contents: IncludeContents,
    pub max_turns: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub tool_execution: ToolExecutionStrategy,
}

impl LlmAgent {
    pub fn new(name: impl Into<String>, model: ModelRef) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            model,
            instruction: Instruction::default(),
            tools: Vec::new(),
            output_key: None,
            include_contents: IncludeContents::Default,
            max_turns: DEFAULT_MAX_TURNS,
            max_tokens: None,
            temperature: None,
            tool_execution: ToolExecutionStrategy::default(),
        }
    }

    // -- Builder-style setters --

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<Instruction>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_tool(mut self, tool: impl Into<ToolRef>) -> Self {
        self.tools.push(tool.into());
        self
    }

    pub fn with_function_tool(self, tool: impl AgentTool + 'static) -> Self {
        self.with_tool(ToolRef::function(tool))
    }

    pub fn with_tools(mut self, tools: Vec<ToolRef>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_output_key(mut self, key: impl Into<StateKey>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn with_include_contents(mut self, include: IncludeContents) -> Self {
        self.include_contents = include;
        self
    }

    pub fn with_max_turns(mut self, max: usize) -> Self {
        self.max_turns = max;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_tool_execution(mut self, strategy: ToolExecutionStrategy) -> Self {
        self.tool_execution = strategy;
        self
    }

    /// Whether any of this agent's tools raises the loop exit signal.
    pub fn can_signal_exit(&self) -> bool {
        self.tools.iter().any(|t| match t {
            ToolRef::LocalFunction(tool) => tool.signals_exit(),
            _ => false,
        })
    }

    /// The user message this agent receives for `prompt`, given what was
    /// said before it in the invocation.
    pub fn compose_prompt(&self, prompt: &str, transcript: &[TranscriptEntry]) -> Message {
        if self.include_contents == IncludeContents::None || transcript.is_empty() {
            return Message::user(prompt);
        }
        let mut text = String::from(prompt);
        text.push_str("\n\nFor context:");
        for entry in transcript {
            text.push_str(&format!("\n[{}] said: {}", entry.author, entry.text));
        }
        Message::user(text)
    }

    /// Run this agent once against `state`.
    ///
    /// Fails when the instruction references an unset key, when the model
    /// keeps failing after retries, or when `cancel` fires. Tool failures
    /// are reported to the model instead.
    pub async fn run(
        &self,
        provider: &Arc<dyn StreamProvider>,
        api_key: &str,
        prompt: Message,
        state: &StateHandle,
        tx: mpsc::UnboundedSender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Result<AgentLoopOutcome, RunError> {
        let system_prompt = state
            .with(|s| self.instruction.render(s))
            .map_err(|MissingKey(key)| RunError::MissingState {
                agent: self.name.clone(),
                key,
            })?;

        let mut tools: Vec<Box<dyn AgentTool>> = Vec::new();
        let mut builtin_tools: Vec<BuiltinTool> = Vec::new();
        for tool in &self.tools {
            match tool {
                ToolRef::LocalFunction(t) => tools.push(Box::new(ArcToolWrapper(Arc::clone(t)))),
                ToolRef::WrappedAgent(a) => tools.push(Box::new(SubAgentTool::new(
                    Arc::clone(a),
                    Arc::clone(provider),
                    api_key,
                ))),
                ToolRef::Builtin(b) => builtin_tools.push(*b),
            }
        }

        let mut context = AgentContext {
            system_prompt,
            messages: Vec::new(),
            tools,
        };

        let config = AgentLoopConfig {
            provider: provider.as_ref(),
            model: self.model.model_id.clone(),
            api_key: api_key.to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            builtin_tools,
            tool_execution: self.tool_execution.clone(),
            retry_policy: self.model.retry_policy.clone(),
            max_turns: Some(self.max_turns),
            state: state.clone(),
        };

        debug!("Running agent {} on {}", self.name, config.model);
        let outcome = agent_loop(vec![prompt], &mut context, &config, tx, cancel.clone()).await;

        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        if let Some(message) = outcome.error() {
            return Err(RunError::Agent {
                agent: self.name.clone(),
                message,
            });
        }

        if let (Some(key), Some(text)) = (&self.output_key, outcome.final_text()) {
            state.write(key.clone(), text, self.name.clone());
        }

        Ok(outcome)
    }
}

/// Thin adapter: wraps `Arc<dyn AgentTool>` so it can be placed in a
/// `Vec<Box<dyn AgentTool>>` (required by `AgentContext`).
struct ArcToolWrapper(Arc<dyn AgentTool>);

#[async_trait::async_trait]
impl AgentTool for ArcToolWrapper {
    fn name(&self) -> &str {
        self.0.name()
    }
    fn label(&self) -> &str {
        self.0.label()
    }
    fn description(&self) -> &str {
        self.0.description()
    }
    fn parameters_schema(&self) -> serde_json::Value {
        self.0.parameters_schema()
    }
    fn signals_exit(&self) -> bool {
        self.0.signals_exit()
    }
    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        self.0.execute(params, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_prompt_includes_earlier_outputs() {
        let agent = LlmAgent::new("WriterAgent", ModelRef::default());
        let transcript = vec![TranscriptEntry {
            author: "OutlineAgent".into(),
            text: "1. Intro".into(),
        }];
        let msg = agent.compose_prompt("Write a blog post", &transcript);
        let text = msg.text().unwrap();
        assert!(text.starts_with("Write a blog post"));
        assert!(text.contains("[OutlineAgent] said: 1. Intro"));
    }

    #[test]
    fn test_compose_prompt_without_contents() {
        let agent = LlmAgent::new("EditorAgent", ModelRef::default())
            .with_include_contents(IncludeContents::None);
        let transcript = vec![TranscriptEntry {
            author: "WriterAgent".into(),
            text: "draft".into(),
        }];
        let msg = agent.compose_prompt("Polish", &transcript);
        assert_eq!(msg.text().unwrap(), "Polish");
    }

    #[test]
    fn test_tool_ref_names() {
        let helper = LlmAgent::new("CalculationAgent", ModelRef::default());
        let agent = LlmAgent::new("enhanced_currency_agent", ModelRef::default())
            .with_tool(helper)
            .with_tool(BuiltinTool::GoogleSearch);
        let names: Vec<String> = agent.tools.iter().map(ToolRef::name).collect();
        assert_eq!(names, vec!["CalculationAgent", "google_search"]);
        assert!(!agent.can_signal_exit());
    }
}
