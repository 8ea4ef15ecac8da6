//! Construction-time checks on a workflow tree.
//!
//! Walks the tree in execution order, tracking which state keys are
//! guaranteed to be written before each agent runs. Keys written by wrapped
//! agents only exist if the caller's model chose to call them, so later
//! stages may read those through `{key?}` only.

use super::Node;
use crate::agent::{LlmAgent, ToolRef};
use crate::state::StateKey;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositionError {
    #[error("{kind} node has an empty name")]
    EmptyName { kind: &'static str },
    #[error("{kind} '{name}' has no members")]
    EmptyComposite { kind: &'static str, name: String },
    #[error("node name '{name}' is used more than once")]
    DuplicateName { name: String },
    #[error("agent '{agent}' uses invalid state key '{key}'")]
    InvalidStateKey { agent: String, key: String },
    #[error("agent '{agent}' reads '{key}', which no earlier agent writes")]
    MissingDependency { agent: String, key: StateKey },
    #[error("agent '{agent}' in parallel group '{group}' reads '{key}', written by sibling '{sibling}'")]
    ParallelDependency {
        group: String,
        agent: String,
        key: StateKey,
        sibling: String,
    },
    #[error("parallel group '{group}': '{first}' and '{second}' both write '{key}'")]
    ConflictingOutputKey {
        group: String,
        key: StateKey,
        first: String,
        second: String,
    },
    #[error("loop '{name}' must allow at least one iteration")]
    ZeroIterations { name: String },
    #[error("agent '{agent}' has exit tool '{tool}' but is not inside a loop")]
    ExitOutsideLoop { agent: String, tool: String },
    #[error("agent '{agent}' has more than one tool named '{tool}'")]
    DuplicateToolName { agent: String, tool: String },
}

/// Check a whole tree. The first problem found is returned.
pub fn validate(root: &Node) -> Result<(), CompositionError> {
    let mut walker = Walker::default();
    let mut available = BTreeSet::new();
    walker.node(root, &mut available, false)
}

#[derive(Default)]
struct Walker {
    names: BTreeSet<String>,
}

impl Walker {
    fn node(
        &mut self,
        node: &Node,
        available: &mut BTreeSet<StateKey>,
        in_loop: bool,
    ) -> Result<(), CompositionError> {
        let name = node.name();
        if name.trim().is_empty() {
            return Err(CompositionError::EmptyName { kind: node.kind() });
        }
        if !self.names.insert(name.to_string()) {
            return Err(CompositionError::DuplicateName {
                name: name.to_string(),
            });
        }
        if !matches!(node, Node::Agent(_)) && node.members().is_empty() {
            return Err(CompositionError::EmptyComposite {
                kind: node.kind(),
                name: name.to_string(),
            });
        }

        match node {
            Node::Agent(agent) => {
                self.check_agent(agent, available, &BTreeSet::new(), in_loop)?;
                if let Some(key) = &agent.output_key {
                    available.insert(key.clone());
                }
                Ok(())
            }
            Node::Sequential(s) => {
                for member in &s.members {
                    self.node(member, available, in_loop)?;
                }
                Ok(())
            }
            Node::Loop(l) => {
                if l.max_iterations == 0 {
                    return Err(CompositionError::ZeroIterations {
                        name: l.name.clone(),
                    });
                }
                for member in &l.body {
                    self.node(member, available, true)?;
                }
                Ok(())
            }
            Node::Parallel(p) => {
                let writes: Vec<BTreeSet<StateKey>> =
                    p.members.iter().map(Node::written_keys).collect();

                for (i, member) in p.members.iter().enumerate() {
                    for (j, other) in p.members.iter().enumerate().skip(i + 1) {
                        if let Some(key) = writes[i].intersection(&writes[j]).next() {
                            return Err(CompositionError::ConflictingOutputKey {
                                group: p.name.clone(),
                                key: key.clone(),
                                first: member.name().to_string(),
                                second: other.name().to_string(),
                            });
                        }
                    }
                }

                for (i, member) in p.members.iter().enumerate() {
                    let reads = member.referenced_keys();
                    for (j, sibling) in p.members.iter().enumerate() {
                        if i == j {
                            continue;
                        }
                        if let Some(key) = reads.intersection(&writes[j]).next() {
                            return Err(CompositionError::ParallelDependency {
                                group: p.name.clone(),
                                agent: member.name().to_string(),
                                key: key.clone(),
                                sibling: sibling.name().to_string(),
                            });
                        }
                    }
                }

                let base = available.clone();
                for member in &p.members {
                    let mut branch = base.clone();
                    self.node(member, &mut branch, in_loop)?;
                    available.extend(branch);
                }
                Ok(())
            }
        }
    }

    /// `extra` holds keys that may be written during this agent's own run by
    /// sibling wrapped agents of the same caller.
    fn check_agent(
        &mut self,
        agent: &LlmAgent,
        available: &BTreeSet<StateKey>,
        extra: &BTreeSet<StateKey>,
        in_loop: bool,
    ) -> Result<(), CompositionError> {
        if agent.name.trim().is_empty() {
            return Err(CompositionError::EmptyName { kind: "agent" });
        }

        if let Some(key) = &agent.output_key {
            if !key.is_valid() {
                return Err(CompositionError::InvalidStateKey {
                    agent: agent.name.clone(),
                    key: key.to_string(),
                });
            }
        }

        let mut tool_names = BTreeSet::new();
        for tool in &agent.tools {
            let tool_name = tool.name();
            if !tool_names.insert(tool_name.clone()) {
                return Err(CompositionError::DuplicateToolName {
                    agent: agent.name.clone(),
                    tool: tool_name,
                });
            }
            if let ToolRef::LocalFunction(t) = tool {
                if t.signals_exit() && !in_loop {
                    return Err(CompositionError::ExitOutsideLoop {
                        agent: agent.name.clone(),
                        tool: tool_name,
                    });
                }
            }
        }

        for key in agent.instruction.required_keys() {
            if !available.contains(key) && !extra.contains(key) {
                return Err(CompositionError::MissingDependency {
                    agent: agent.name.clone(),
                    key: key.clone(),
                });
            }
        }

        let wrapped: Vec<&LlmAgent> = agent
            .tools
            .iter()
            .filter_map(|t| match t {
                ToolRef::WrappedAgent(a) => Some(a.as_ref()),
                _ => None,
            })
            .collect();
        for (i, inner) in wrapped.iter().enumerate() {
            let mut siblings = extra.clone();
            for (j, other) in wrapped.iter().enumerate() {
                if i != j {
                    siblings.extend(produced_by(other));
                }
            }
            // A wrapped agent's exit signal never reaches a loop.
            self.check_agent(inner, available, &siblings, false)?;
            if !self.names.insert(inner.name.clone()) {
                return Err(CompositionError::DuplicateName {
                    name: inner.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Keys an agent run may leave behind: its own output key plus those of the
/// agents it wraps.
fn produced_by(agent: &LlmAgent) -> BTreeSet<StateKey> {
    let mut keys = BTreeSet::new();
    if let Some(key) = &agent.output_key {
        keys.insert(key.clone());
    }
    for tool in &agent.tools {
        if let ToolRef::WrappedAgent(inner) = tool {
            keys.extend(produced_by(inner));
        }
    }
    keys
}
