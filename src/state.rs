//! Per-invocation shared state.
//!
//! Agents publish their final text under an output key; later agents read it
//! through `{key}` placeholders in their instructions. State lives for one
//! runner invocation and is returned to the caller at the end.
//!
//! Parallel branches work on forks and are merged back once every branch has
//! finished, so no branch ever observes a sibling's writes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Name of a slot in [`SharedState`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `[A-Za-z_][A-Za-z0-9_]*`
    pub fn is_valid(&self) -> bool {
        is_identifier(&self.0)
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StateKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for StateKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A value plus who wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub value: String,
    pub author: String,
    /// Monotonic write counter, used to find the writes made on a fork.
    pub revision: u64,
}

/// Two parallel branches wrote the same key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("state key '{key}' written by both '{first}' and '{second}'")]
pub struct StateConflict {
    pub key: StateKey,
    pub first: String,
    pub second: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedState {
    entries: BTreeMap<StateKey, StateEntry>,
    revision: u64,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.value.as_str())
    }

    pub fn entry(&self, key: &str) -> Option<&StateEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &StateKey> {
        self.entries.keys()
    }

    /// Last write wins.
    pub fn insert(&mut self, key: StateKey, value: impl Into<String>, author: impl Into<String>) {
        self.revision += 1;
        self.entries.insert(
            key,
            StateEntry {
                value: value.into(),
                author: author.into(),
                revision: self.revision,
            },
        );
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Entries written after `revision`.
    pub fn written_since(&self, revision: u64) -> impl Iterator<Item = (&StateKey, &StateEntry)> {
        self.entries.iter().filter(move |(_, e)| e.revision > revision)
    }

    /// Apply the writes made on each fork since `base_revision`, in order.
    /// Fails when two forks wrote the same key.
    pub fn merge_forks(
        &mut self,
        base_revision: u64,
        forks: &[SharedState],
    ) -> Result<(), StateConflict> {
        let mut seen: BTreeMap<&StateKey, &str> = BTreeMap::new();
        for fork in forks {
            for (key, entry) in fork.written_since(base_revision) {
                if let Some(first) = seen.insert(key, entry.author.as_str()) {
                    return Err(StateConflict {
                        key: key.clone(),
                        first: first.to_string(),
                        second: entry.author.clone(),
                    });
                }
            }
        }
        for fork in forks {
            let writes: Vec<(StateKey, StateEntry)> = fork
                .written_since(base_revision)
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect();
            for (key, entry) in writes {
                self.insert(key, entry.value, entry.author);
            }
        }
        Ok(())
    }
}

/// Shared, lockable handle on the state of one branch of an invocation.
///
/// The lock is only ever held for short, synchronous reads and writes.
#[derive(Debug, Clone, Default)]
pub struct StateHandle(Arc<Mutex<SharedState>>);

impl StateHandle {
    pub fn new(state: SharedState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        // A panicking writer cannot leave a half-written entry behind.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SharedState {
        self.lock().clone()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(str::to_string)
    }

    pub fn write(&self, key: StateKey, value: impl Into<String>, author: impl Into<String>) {
        self.lock().insert(key, value, author);
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut SharedState) -> R) -> R {
        f(&mut self.lock())
    }
}

/// One agent's contribution to the conversation of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub author: String,
    pub text: String,
}

/// The state and transcript visible to one branch of a running workflow.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub state: StateHandle,
    pub transcript: Vec<TranscriptEntry>,
}

impl Scope {
    /// An independent copy for a parallel branch.
    pub fn fork(&self) -> Scope {
        Scope {
            state: StateHandle::new(self.state.snapshot()),
            transcript: self.transcript.clone(),
        }
    }

    /// Fold finished branches back in declaration order.
    pub fn join(&mut self, forks: Vec<Scope>) -> Result<(), StateConflict> {
        let base_revision = self.state.with(|s| s.revision());
        let base_len = self.transcript.len();
        let states: Vec<SharedState> = forks.iter().map(|f| f.state.snapshot()).collect();
        self.state
            .with(|s| s.merge_forks(base_revision, &states))?;
        for fork in forks {
            self.transcript
                .extend(fork.transcript.into_iter().skip(base_len));
        }
        Ok(())
    }

    pub fn record(&mut self, author: impl Into<String>, text: impl Into<String>) {
        self.transcript.push(TranscriptEntry {
            author: author.into(),
            text: text.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_key_validity() {
        assert!(StateKey::from("blog_outline").is_valid());
        assert!(StateKey::from("_x1").is_valid());
        assert!(!StateKey::from("1abc").is_valid());
        assert!(!StateKey::from("has space").is_valid());
        assert!(!StateKey::from("").is_valid());
    }

    #[test]
    fn test_insert_overwrites_and_tracks_author() {
        let mut state = SharedState::new();
        state.insert("current_story".into(), "draft 1", "InitialWriterAgent");
        state.insert("current_story".into(), "draft 2", "RefinerAgent");
        assert_eq!(state.get("current_story"), Some("draft 2"));
        assert_eq!(state.entry("current_story").unwrap().author, "RefinerAgent");
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_join_merges_disjoint_forks() {
        let mut scope = Scope::default();
        scope.state.write("topic".into(), "briefing", "user");

        let a = scope.fork();
        let b = scope.fork();
        a.state.write("tech_research".into(), "ai", "TechResearcher");
        b.state.write("health_research".into(), "med", "HealthResearcher");
        let mut a = a;
        a.record("TechResearcher", "ai");

        scope.join(vec![a, b]).unwrap();
        let snap = scope.state.snapshot();
        assert_eq!(snap.get("tech_research"), Some("ai"));
        assert_eq!(snap.get("health_research"), Some("med"));
        assert_eq!(snap.get("topic"), Some("briefing"));
        assert_eq!(scope.transcript.len(), 1);
    }

    #[test]
    fn test_join_rejects_conflicting_forks() {
        let mut scope = Scope::default();
        let a = scope.fork();
        let b = scope.fork();
        a.state.write("summary".into(), "one", "A");
        b.state.write("summary".into(), "two", "B");

        let err = scope.join(vec![a, b]).unwrap_err();
        assert_eq!(err.key.as_str(), "summary");
        assert_eq!(err.first, "A");
        assert_eq!(err.second, "B");
    }

    #[test]
    fn test_fork_does_not_see_sibling_writes() {
        let scope = Scope::default();
        let a = scope.fork();
        let b = scope.fork();
        a.state.write("k".into(), "v", "A");
        assert!(b.state.get("k").is_none());
        assert!(scope.state.get("k").is_none());
    }
}
