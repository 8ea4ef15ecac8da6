//! Runner: drives a validated [`Workflow`] for one prompt.
//!
//! Each invocation gets fresh state and a fresh transcript. The response
//! carries the last text any agent produced, the final state and how every
//! loop terminated.

use crate::config::Settings;
use crate::provider::StreamProvider;
use crate::state::{Scope, SharedState, StateConflict, StateKey, TranscriptEntry};
use crate::types::AgentEvent;
use crate::workflow::{self, LoopReport, Workflow};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum RunError {
    #[error("agent '{agent}' failed: {message}")]
    Agent { agent: String, message: String },
    #[error("agent '{agent}' needs state key '{key}', which is not set")]
    MissingState { agent: String, key: StateKey },
    #[error("parallel branches conflict: {0}")]
    StateConflict(#[from] StateConflict),
    #[error("run cancelled")]
    Cancelled,
}

/// Progress of a run, streamed by [`Runner::run_with_events`].
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    RunStart {
        invocation_id: String,
        workflow: String,
    },
    RunEnd {
        invocation_id: String,
    },
    NodeStart {
        node: String,
        kind: &'static str,
    },
    NodeEnd {
        node: String,
    },
    /// Something happened inside a leaf agent.
    Agent {
        agent: String,
        event: AgentEvent,
    },
    StateWritten {
        key: StateKey,
        author: String,
    },
    LoopIteration {
        name: String,
        iteration: u32,
    },
    LoopEnd {
        report: LoopReport,
    },
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub invocation_id: String,
    /// Last text produced by any agent; empty when none spoke.
    pub final_response: String,
    pub state: SharedState,
    pub transcript: Vec<TranscriptEntry>,
    /// One report per loop execution, in completion order.
    pub loops: Vec<LoopReport>,
}

impl RunResponse {
    /// Latest report for the loop called `name`.
    pub fn loop_report(&self, name: &str) -> Option<&LoopReport> {
        self.loops.iter().rev().find(|r| r.name == name)
    }
}

/// Per-invocation context shared by every node of the tree.
pub(crate) struct RunContext {
    pub provider: Arc<dyn StreamProvider>,
    pub api_key: String,
    pub prompt: String,
    pub events: Option<mpsc::UnboundedSender<WorkflowEvent>>,
    pub cancel: CancellationToken,
    loops: Mutex<Vec<LoopReport>>,
}

impl RunContext {
    pub fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.events {
            tx.send(event).ok();
        }
    }

    pub fn record_loop(&self, report: LoopReport) {
        self.loops
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report);
    }

    fn take_loops(&self) -> Vec<LoopReport> {
        std::mem::take(&mut *self.loops.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Runs workflows against one provider and API key.
#[derive(Clone)]
pub struct Runner {
    provider: Arc<dyn StreamProvider>,
    api_key: String,
}

impl Runner {
    pub fn new(provider: impl StreamProvider + 'static, settings: &Settings) -> Self {
        Self::from_arc(Arc::new(provider), settings)
    }

    pub fn from_arc(provider: Arc<dyn StreamProvider>, settings: &Settings) -> Self {
        Self {
            provider,
            api_key: settings.api_key.clone(),
        }
    }

    /// Run `workflow` on `prompt` to completion.
    pub async fn run(&self, workflow: &Workflow, prompt: &str) -> Result<RunResponse, RunError> {
        self.execute(workflow, prompt, None, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), streaming progress through `tx`. Firing
    /// `cancel` stops in-flight model calls and fails with
    /// [`RunError::Cancelled`].
    pub async fn run_with_events(
        &self,
        workflow: &Workflow,
        prompt: &str,
        tx: mpsc::UnboundedSender<WorkflowEvent>,
        cancel: CancellationToken,
    ) -> Result<RunResponse, RunError> {
        self.execute(workflow, prompt, Some(tx), cancel).await
    }

    async fn execute(
        &self,
        workflow: &Workflow,
        prompt: &str,
        events: Option<mpsc::UnboundedSender<WorkflowEvent>>,
        cancel: CancellationToken,
    ) -> Result<RunResponse, RunError> {
        let invocation_id = uuid::Uuid::new_v4().to_string();
        let cx = RunContext {
            provider: Arc::clone(&self.provider),
            api_key: self.api_key.clone(),
            prompt: prompt.to_string(),
            events,
            cancel,
            loops: Mutex::new(Vec::new()),
        };

        info!("Run {} started: {}", invocation_id, workflow.name());
        cx.emit(WorkflowEvent::RunStart {
            invocation_id: invocation_id.clone(),
            workflow: workflow.name().to_string(),
        });

        let mut scope = Scope::default();
        let result = workflow::execute(workflow.root(), &cx, &mut scope).await;

        cx.emit(WorkflowEvent::RunEnd {
            invocation_id: invocation_id.clone(),
        });

        if let Err(e) = result {
            warn!("Run {} failed: {}", invocation_id, e);
            return Err(e);
        }

        let final_response = scope
            .transcript
            .last()
            .map(|entry| entry.text.clone())
            .unwrap_or_default();
        info!("Run {} finished", invocation_id);

        Ok(RunResponse {
            invocation_id,
            final_response,
            state: scope.state.snapshot(),
            transcript: scope.transcript,
            loops: cx.take_loops(),
        })
    }
}
