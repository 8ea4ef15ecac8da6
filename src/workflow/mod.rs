//! Composite agents and the validated workflow tree.
//!
//! A [`Node`] is either a leaf [`LlmAgent`] or a composite that orders its
//! members: one after another, all at once, or repeatedly. A [`Workflow`]
//! is a node tree that passed [`validate`](validate::validate).

pub mod loop_agent;
pub mod parallel;
pub mod sequential;
pub mod validate;

pub use loop_agent::{LoopAgent, LoopExit, LoopReport, LoopState, Termination};
pub use parallel::ParallelAgent;
pub use sequential::SequentialAgent;
pub use validate::CompositionError;

use crate::agent::{LlmAgent, ToolRef};
use crate::runner::{RunContext, RunError, WorkflowEvent};
use crate::state::{Scope, StateKey};
use futures::future::{BoxFuture, FutureExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One node of a workflow tree.
#[derive(Debug, Clone)]
pub enum Node {
    Agent(Arc<LlmAgent>),
    Sequential(SequentialAgent),
    Parallel(ParallelAgent),
    Loop(LoopAgent),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Agent(a) => &a.name,
            Node::Sequential(s) => &s.name,
            Node::Parallel(p) => &p.name,
            Node::Loop(l) => &l.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Agent(_) => "agent",
            Node::Sequential(_) => "sequential",
            Node::Parallel(_) => "parallel",
            Node::Loop(_) => "loop",
        }
    }

    /// Direct members of a composite; empty for a leaf.
    pub fn members(&self) -> &[Node] {
        match self {
            Node::Agent(_) => &[],
            Node::Sequential(s) => &s.members,
            Node::Parallel(p) => &p.members,
            Node::Loop(l) => &l.body,
        }
    }

    /// Every state key this subtree may write, wrapped agents included.
    pub fn written_keys(&self) -> BTreeSet<StateKey> {
        let mut keys = BTreeSet::new();
        self.for_each_agent(&mut |agent| {
            if let Some(key) = &agent.output_key {
                keys.insert(key.clone());
            }
        });
        keys
    }

    /// Every state key some instruction in this subtree requires.
    pub fn referenced_keys(&self) -> BTreeSet<StateKey> {
        let mut keys = BTreeSet::new();
        self.for_each_agent(&mut |agent| {
            keys.extend(agent.instruction.required_keys().into_iter().cloned());
        });
        keys
    }

    fn for_each_agent(&self, f: &mut dyn FnMut(&LlmAgent)) {
        match self {
            Node::Agent(a) => visit_agent(a, f),
            _ => {
                for member in self.members() {
                    member.for_each_agent(f);
                }
            }
        }
    }
}

fn visit_agent(agent: &LlmAgent, f: &mut dyn FnMut(&LlmAgent)) {
    f(agent);
    for tool in &agent.tools {
        if let ToolRef::WrappedAgent(wrapped) = tool {
            visit_agent(wrapped, f);
        }
    }
}

impl From<LlmAgent> for Node {
    fn from(a: LlmAgent) -> Self {
        Node::Agent(Arc::new(a))
    }
}

impl From<Arc<LlmAgent>> for Node {
    fn from(a: Arc<LlmAgent>) -> Self {
        Node::Agent(a)
    }
}

impl From<SequentialAgent> for Node {
    fn from(s: SequentialAgent) -> Self {
        Node::Sequential(s)
    }
}

impl From<ParallelAgent> for Node {
    fn from(p: ParallelAgent) -> Self {
        Node::Parallel(p)
    }
}

impl From<LoopAgent> for Node {
    fn from(l: LoopAgent) -> Self {
        Node::Loop(l)
    }
}

/// A node tree that passed validation. The only thing a runner accepts.
#[derive(Debug, Clone)]
pub struct Workflow {
    root: Node,
}

impl Workflow {
    pub fn build(root: impl Into<Node>) -> Result<Self, CompositionError> {
        let root = root.into();
        validate::validate(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn name(&self) -> &str {
        self.root.name()
    }
}

/// How a node finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    /// An agent raised the exit signal; unwinds to the innermost loop.
    Exit { agent: String },
}

pub(crate) fn execute<'a>(
    node: &'a Node,
    cx: &'a RunContext,
    scope: &'a mut Scope,
) -> BoxFuture<'a, Result<Flow, RunError>> {
    async move {
        if cx.cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        info!("Starting {} {}", node.kind(), node.name());
        cx.emit(WorkflowEvent::NodeStart {
            node: node.name().to_string(),
            kind: node.kind(),
        });

        let flow = match node {
            Node::Agent(agent) => run_leaf(agent, cx, scope).await?,
            Node::Sequential(s) => s.execute(cx, scope).await?,
            Node::Parallel(p) => p.execute(cx, scope).await?,
            Node::Loop(l) => l.execute(cx, scope).await?,
        };

        cx.emit(WorkflowEvent::NodeEnd {
            node: node.name().to_string(),
        });
        Ok(flow)
    }
    .boxed()
}

async fn run_leaf(agent: &LlmAgent, cx: &RunContext, scope: &mut Scope) -> Result<Flow, RunError> {
    let prompt = agent.compose_prompt(&cx.prompt, &scope.transcript);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let forward_handle = cx.events.clone().map(|events| {
        let name = agent.name.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                events
                    .send(WorkflowEvent::Agent {
                        agent: name.clone(),
                        event,
                    })
                    .ok();
            }
        })
    });

    let result = agent
        .run(
            &cx.provider,
            &cx.api_key,
            prompt,
            &scope.state,
            tx,
            cx.cancel.clone(),
        )
        .await;

    if let Some(handle) = forward_handle {
        if let Err(e) = handle.await {
            warn!("Event forwarding for {} stopped abnormally: {}", agent.name, e);
        }
    }
    let outcome = result?;

    if let Some(text) = outcome.final_text() {
        if let Some(key) = &agent.output_key {
            cx.emit(WorkflowEvent::StateWritten {
                key: key.clone(),
                author: agent.name.clone(),
            });
        }
        scope.record(agent.name.clone(), text);
    }

    if outcome.escalated {
        Ok(Flow::Exit {
            agent: agent.name.clone(),
        })
    } else {
        Ok(Flow::Continue)
    }
}
