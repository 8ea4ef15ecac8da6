//! Model references: which model an agent talks to, and how hard to retry.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// A model identifier plus the retry policy applied to every call made
/// with it. Cheap to clone; agents each hold their own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRef {
    pub model_id: String,
    pub retry_policy: RetryPolicy,
}

impl ModelRef {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

impl Default for ModelRef {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}
