pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod model;
pub mod pipelines;
pub mod provider;
pub mod retry;
pub mod runner;
pub mod state;
pub mod template;
pub mod tools;
pub mod types;
pub mod workflow;

pub use agent::{IncludeContents, LlmAgent, ToolRef};
pub use agent_loop::{agent_loop, AgentLoopConfig, AgentLoopOutcome};
pub use config::{ConfigError, Settings};
pub use model::ModelRef;
pub use retry::RetryPolicy;
pub use runner::{RunError, RunResponse, Runner, WorkflowEvent};
pub use state::{SharedState, StateKey};
pub use template::Instruction;
pub use tools::{ExitLoopTool, FunctionTool, SubAgentTool};
pub use types::*;
pub use workflow::{
    CompositionError, LoopAgent, Node, ParallelAgent, SequentialAgent, Termination, Workflow,
};
