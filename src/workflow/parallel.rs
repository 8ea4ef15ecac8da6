use super::{execute, Flow, Node};
use crate::runner::{RunContext, RunError};
use crate::state::Scope;
use tracing::debug;

/// Runs members concurrently, each on its own fork of the state, and
/// completes once all of them have.
#[derive(Debug, Clone)]
pub struct ParallelAgent {
    pub name: String,
    pub description: String,
    pub members: Vec<Node>,
}

impl ParallelAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            members: Vec::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Add a branch.
    pub fn with_member(mut self, member: impl Into<Node>) -> Self {
        self.members.push(member.into());
        self
    }

    pub fn with_members(mut self, members: Vec<Node>) -> Self {
        self.members = members;
        self
    }

    /// Branch writes are merged in declaration order once every branch has
    /// finished. The first failure in declaration order wins.
    pub(crate) async fn execute(
        &self,
        cx: &RunContext,
        scope: &mut Scope,
    ) -> Result<Flow, RunError> {
        let mut forks: Vec<Scope> = self.members.iter().map(|_| scope.fork()).collect();

        let results = futures::future::join_all(
            self.members
                .iter()
                .zip(forks.iter_mut())
                .map(|(member, fork)| execute(member, cx, fork)),
        )
        .await;
        debug!("{}: {} branches finished", self.name, results.len());

        let mut flow = Flow::Continue;
        for result in results {
            if let Flow::Exit { agent } = result? {
                if flow == Flow::Continue {
                    flow = Flow::Exit { agent };
                }
            }
        }

        scope.join(forks)?;
        Ok(flow)
    }
}
