//! Iterative refinement: run a body until an exit signal or the cap.

use super::{execute, Flow, Node};
use crate::runner::{RunContext, RunError, WorkflowEvent};
use crate::state::Scope;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone)]
pub struct LoopAgent {
    pub name: String,
    pub description: String,
    pub body: Vec<Node>,
    pub max_iterations: u32,
}

impl LoopAgent {
    pub fn new(name: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            body: Vec::new(),
            max_iterations,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Append a member to the body.
    pub fn then(mut self, member: impl Into<Node>) -> Self {
        self.body.push(member.into());
        self
    }

    pub fn with_body(mut self, body: Vec<Node>) -> Self {
        self.body = body;
        self
    }

    /// The exit signal is consumed here; it never escapes the loop.
    pub(crate) async fn execute(
        &self,
        cx: &RunContext,
        scope: &mut Scope,
    ) -> Result<Flow, RunError> {
        let mut state = LoopState::default();

        while let LoopState::Running(completed) = state {
            let iteration = completed + 1;
            cx.emit(WorkflowEvent::LoopIteration {
                name: self.name.clone(),
                iteration,
            });

            let mut exit = None;
            for member in &self.body {
                if let Flow::Exit { agent } = execute(member, cx, scope).await? {
                    exit = Some(agent);
                    break;
                }
            }
            state = state.advance(self.max_iterations, exit);
        }

        let report = LoopReport::from_state(&self.name, &state);
        info!(
            "Loop {} finished after {} iteration(s): {:?}",
            self.name, report.iterations, report.termination
        );
        cx.emit(WorkflowEvent::LoopEnd {
            report: report.clone(),
        });
        cx.record_loop(report);
        Ok(Flow::Continue)
    }
}

/// Who stopped a loop, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopExit {
    pub agent: String,
    pub iteration: u32,
}

/// Progress of one loop execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    /// Iterations completed so far.
    Running(u32),
    Exited(LoopExit),
    MaxReached(u32),
}

impl Default for LoopState {
    fn default() -> Self {
        LoopState::Running(0)
    }
}

impl LoopState {
    /// State after one more iteration. Terminal states stay put.
    pub fn advance(self, max_iterations: u32, exit: Option<String>) -> LoopState {
        match self {
            LoopState::Running(completed) => {
                let iteration = completed + 1;
                match exit {
                    Some(agent) => LoopState::Exited(LoopExit { agent, iteration }),
                    None if iteration >= max_iterations => LoopState::MaxReached(iteration),
                    None => LoopState::Running(iteration),
                }
            }
            terminal => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoopState::Running(_))
    }

    pub fn termination(&self) -> Option<Termination> {
        match self {
            LoopState::Running(_) => None,
            LoopState::Exited(exit) => Some(Termination::ExitSignal {
                agent: exit.agent.clone(),
                iteration: exit.iteration,
            }),
            LoopState::MaxReached(n) => Some(Termination::MaxIterationsReached { iterations: *n }),
        }
    }
}

/// Why a loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    ExitSignal { agent: String, iteration: u32 },
    MaxIterationsReached { iterations: u32 },
}

/// One finished loop, as reported in the run response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopReport {
    pub name: String,
    pub iterations: u32,
    pub termination: Termination,
}

impl LoopReport {
    fn from_state(name: &str, state: &LoopState) -> Self {
        let (iterations, termination) = match state {
            LoopState::Exited(exit) => (
                exit.iteration,
                Termination::ExitSignal {
                    agent: exit.agent.clone(),
                    iteration: exit.iteration,
                },
            ),
            LoopState::MaxReached(n) => {
                (*n, Termination::MaxIterationsReached { iterations: *n })
            }
            LoopState::Running(n) => (*n, Termination::MaxIterationsReached { iterations: *n }),
        };
        Self {
            name: name.to_string(),
            iterations,
            termination,
        }
    }

    pub fn approved(&self) -> bool {
        matches!(self.termination, Termination::ExitSignal { .. })
    }
}
