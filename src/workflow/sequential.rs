use super::{execute, Flow, Node};
use crate::runner::{RunContext, RunError};
use crate::state::Scope;

/// Runs members strictly in order; each sees every earlier write.
#[derive(Debug, Clone)]
pub struct SequentialAgent {
    pub name: String,
    pub description: String,
    pub members: Vec<Node>,
}

impl SequentialAgent {
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

    /// Append a member.
    pub fn then(mut self, member: impl Into<Node>) -> Self {
        self.members.push(member.into());
        self
    }

    pub fn with_members(mut self, members: Vec<Node>) -> Self {
        self.members = members;
        self
    }

    /// A failing member halts the rest. An exit signal stops the remaining
    /// members and is passed up to the enclosing loop.
    pub(crate) async fn execute(
        &self,
        cx: &RunContext,
        scope: &mut Scope,
    ) -> Result<Flow, RunError> {
        for member in &self.members {
            if let Flow::Exit { agent } = execute(member, cx, scope).await? {
                return Ok(Flow::Exit { agent });
            }
        }
        Ok(Flow::Continue)
    }
}
